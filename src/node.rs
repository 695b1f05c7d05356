//! Node event handling.
//!
//! Nodes are observed only: each event logs the node name. The pipeline is
//! wired exactly like the job pipeline so node-driven actions can be added
//! without touching the consumer.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::info;

use crate::nomad::{EventKind, Node};
use crate::stream::EntityHandler;

/// Logs every node it is handed.
#[derive(Debug, Default)]
pub struct NodeObserver {
    observed: AtomicU64,
}

impl NodeObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of node events seen so far.
    pub fn observed(&self) -> u64 {
        self.observed.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl EntityHandler<Node> for NodeObserver {
    async fn on_entity(&self, kind: &EventKind, node: Node) {
        self.observed.fetch_add(1, Ordering::Relaxed);
        info!(
            event = %kind,
            node_id = %node.id,
            datacenter = %node.datacenter,
            "{}",
            node.name
        );
    }
}
