//! Pipeline assembly.
//!
//! ```text
//! Nomad event stream (Job:*)  --> EventConsumer --> Dispatcher<Job>  --> BackupReconciler --> register/deregister
//! Nomad event stream (Node:*) --> EventConsumer --> Dispatcher<Node> --> NodeObserver     --> log
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::backup::{
    BackupJobRenderer, BackupReconciler, JobActions, JobSpecParser, JobTemplate, TemplateError,
};
use crate::config::Config;
use crate::nomad::{Job, Node, Topic};
use crate::node::NodeObserver;
use crate::stream::{BatchFailurePolicy, Dispatcher, EventConsumer, EventSource};
use crate::supervisor::Supervisor;

/// Consumer name of the job pipeline.
pub const JOB_PIPELINE: &str = "jobs";
/// Consumer name of the node pipeline.
pub const NODE_PIPELINE: &str = "nodes";

/// Errors assembling the pipelines.
#[derive(Debug, thiserror::Error)]
pub enum OperatorError {
    #[error("Failed to load backup job template: {0}")]
    Template(#[from] TemplateError),
}

/// Orchestrator capabilities the pipelines need.
#[derive(Clone)]
pub struct Backends {
    pub source: Arc<dyn EventSource>,
    pub parser: Arc<dyn JobSpecParser>,
    pub actions: Arc<dyn JobActions>,
}

impl Backends {
    /// All three capabilities from one client.
    pub fn from_client<N>(client: Arc<N>) -> Self
    where
        N: EventSource + JobSpecParser + JobActions + 'static,
    {
        Self {
            source: client.clone(),
            parser: client.clone(),
            actions: client,
        }
    }
}

/// Job topic consumer driving backup reconciliation.
pub fn job_pipeline(
    backends: &Backends,
    template: JobTemplate,
    policy: BatchFailurePolicy,
) -> EventConsumer<Dispatcher<Job, BackupReconciler>> {
    let renderer = BackupJobRenderer::new(template, backends.parser.clone());
    let reconciler = BackupReconciler::new(renderer, backends.actions.clone());
    EventConsumer::new(
        backends.source.clone(),
        Topic::Job,
        Dispatcher::with_policy(reconciler, policy),
    )
}

/// Node topic consumer. Observation only.
pub fn node_pipeline(
    backends: &Backends,
    policy: BatchFailurePolicy,
) -> EventConsumer<Dispatcher<Node, NodeObserver>> {
    EventConsumer::new(
        backends.source.clone(),
        Topic::Node,
        Dispatcher::with_policy(NodeObserver::new(), policy),
    )
}

/// Build and spawn every enabled pipeline.
///
/// The template is compiled here, so a bad template fails startup before
/// any stream is opened.
pub fn start(config: &Config, backends: &Backends) -> Result<Supervisor, OperatorError> {
    let drain_timeout = Duration::from_secs(config.streams.drain_timeout_secs);
    let mut supervisor = Supervisor::new().with_drain_timeout(drain_timeout);
    let policy = config.streams.batch_failure;

    if config.streams.jobs {
        let template = JobTemplate::load(config.backup.template_path.as_deref())?;
        supervisor.spawn(JOB_PIPELINE, job_pipeline(backends, template, policy));
    }
    if config.streams.nodes {
        supervisor.spawn(NODE_PIPELINE, node_pipeline(backends, policy));
    }

    info!(
        consumers = supervisor.len(),
        batch_failure = ?policy,
        drain_timeout_secs = drain_timeout.as_secs(),
        "Event pipelines started"
    );
    Ok(supervisor)
}
