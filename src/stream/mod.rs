//! Event stream consumption.
//!
//! This module contains:
//! - `EventSource` trait: where batches come from (Nomad, or a mock)
//! - `BatchHandler` trait: what receives non-heartbeat batches
//! - `EventConsumer`: the cancellable read loop
//! - `Dispatcher`: typed entity extraction feeding an `EntityHandler`

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::nomad::{Events, NomadError, Topic};

pub mod consumer;
pub mod dispatch;

pub use consumer::{EventConsumer, StopHandle};
pub use dispatch::{BatchFailurePolicy, Dispatcher, Entity, EntityHandler};

/// Stream of decoded batches. `Err` items are per-message failures; the
/// stream ending means the server closed the connection.
pub type EventBatchStream = BoxStream<'static, Result<Events, NomadError>>;

/// Errors that end a consumer.
#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error("Failed to open {topic} event stream at index {index}: {source}")]
    Subscribe {
        topic: Topic,
        index: u64,
        #[source]
        source: NomadError,
    },

    #[error("{topic} event stream closed by the server")]
    StreamClosed { topic: Topic },
}

/// Provider of an event log with a resumable subscription.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Current end-of-log position for `topic`, taken from a full listing.
    async fn last_index(&self, topic: Topic) -> Result<u64, NomadError>;

    /// Subscribe to every key on `topic`, starting after `index`.
    async fn subscribe(&self, topic: Topic, index: u64) -> Result<EventBatchStream, NomadError>;
}

/// Receiver of non-heartbeat batches, in the order they were read.
#[async_trait]
pub trait BatchHandler: Send + Sync {
    async fn handle_batch(&self, batch: Events);
}
