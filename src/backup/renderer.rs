//! Rendering desired state into a registrable job.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{DesiredBackupState, JobTemplate};
use crate::nomad::{Job, NomadError};

/// Converts job spec text into the orchestrator's structured job form.
#[async_trait]
pub trait JobSpecParser: Send + Sync {
    async fn parse(&self, spec: &str) -> Result<Job, NomadError>;
}

/// Errors rendering a backup job. No job is registered when one occurs.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Rendered spec for '{backup_job_id}' failed to parse: {source}")]
    Parse {
        backup_job_id: String,
        #[source]
        source: NomadError,
    },

    #[error("Rendered spec names job '{actual}', expected '{expected}'")]
    NameMismatch { expected: String, actual: String },
}

/// Template plus parser: turns a [`DesiredBackupState`] into a [`Job`].
pub struct BackupJobRenderer {
    template: JobTemplate,
    parser: Arc<dyn JobSpecParser>,
}

impl BackupJobRenderer {
    pub fn new(template: JobTemplate, parser: Arc<dyn JobSpecParser>) -> Self {
        Self { template, parser }
    }

    /// Render and parse the backup job for `state`.
    ///
    /// The parsed job must carry the derived backup job ID; a template that
    /// names the job anything else is rejected.
    pub async fn render(&self, state: &DesiredBackupState) -> Result<Job, RenderError> {
        let spec = self.template.render(state);
        debug!(backup_job_id = %state.backup_job_id, bytes = spec.len(), "Rendered backup job spec");

        let job = self
            .parser
            .parse(&spec)
            .await
            .map_err(|source| RenderError::Parse {
                backup_job_id: state.backup_job_id.clone(),
                source,
            })?;

        if job.id() != state.backup_job_id {
            return Err(RenderError::NameMismatch {
                expected: state.backup_job_id.clone(),
                actual: job.id().to_string(),
            });
        }

        Ok(job)
    }
}
