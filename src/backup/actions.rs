//! Side effects against the orchestrator.

use async_trait::async_trait;

use crate::nomad::{Job, JobRegisterResponse, NomadError};

/// Result of a deregistration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeregisterOutcome {
    /// The job existed and was stopped.
    Removed { eval_id: String },
    /// There was no such job. Not an error.
    NotFound,
}

/// Idempotent job operations.
#[async_trait]
pub trait JobActions: Send + Sync {
    /// Upsert `job` under its ID. Does not wait for scheduling.
    async fn register(&self, job: &Job) -> Result<JobRegisterResponse, NomadError>;

    /// Remove the job with `job_id`. A missing job yields `NotFound`.
    async fn deregister(&self, job_id: &str, purge: bool) -> Result<DeregisterOutcome, NomadError>;
}
