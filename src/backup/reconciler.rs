//! Per-event backup reconciliation.
//!
//! Every job event is reconciled on its own: the desired state is recomputed
//! from the event's metadata and the backup job is either registered
//! (upserted) or deregistered. Nothing is compared against earlier events.
//!
//! | Condition                          | Action                |
//! |------------------------------------|-----------------------|
//! | ID starts with `backup-`           | skip                  |
//! | ID contains `periodic`             | skip                  |
//! | event is a deregistration          | deregister backup job |
//! | `auto-backup` missing/false/bad    | deregister backup job |
//! | `auto-backup` true                 | render + register     |

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info};

use super::policy::{decide, is_backup_job, is_periodic_instance};
use super::{BackupJobRenderer, DeregisterOutcome, JobActions, RenderError};
use crate::nomad::{EventKind, Job, NomadError};
use crate::stream::EntityHandler;

/// Why an event was skipped before policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    BackupJob,
    PeriodicInstance,
}

/// Errors from a single reconciliation.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("Failed to register backup job: {0}")]
    Register(#[source] NomadError),

    #[error("Failed to deregister backup job: {0}")]
    Deregister(#[source] NomadError),
}

/// What a reconciliation did.
#[derive(Debug)]
pub enum ReconcileOutcome {
    Skipped(SkipReason),
    Removed {
        backup_job_id: String,
        existed: bool,
    },
    Registered {
        backup_job_id: String,
        eval_id: String,
    },
    Failed {
        backup_job_id: String,
        error: ReconcileError,
    },
}

/// Drives backup jobs from job lifecycle events.
pub struct BackupReconciler {
    renderer: BackupJobRenderer,
    actions: Arc<dyn JobActions>,
}

impl BackupReconciler {
    pub fn new(renderer: BackupJobRenderer, actions: Arc<dyn JobActions>) -> Self {
        Self { renderer, actions }
    }

    /// Reconcile the backup job for one job event.
    pub async fn reconcile(&self, kind: &EventKind, job: &Job) -> ReconcileOutcome {
        let job_id = job.id();

        if is_backup_job(job_id) {
            debug!(job_id, "Backup job - skipping");
            return ReconcileOutcome::Skipped(SkipReason::BackupJob);
        }
        if is_periodic_instance(job_id) {
            debug!(job_id, "Periodic job - skipping");
            return ReconcileOutcome::Skipped(SkipReason::PeriodicInstance);
        }

        let state = decide(job_id, &job.meta);

        if *kind == EventKind::Deregistered {
            info!(
                job_id,
                backup_job_id = %state.backup_job_id,
                "Job is deregistered: removing backup job"
            );
            return self.remove(state.backup_job_id).await;
        }

        if !state.enabled {
            info!(
                job_id,
                backup_job_id = %state.backup_job_id,
                "Backup is not enabled: removing backup job"
            );
            return self.remove(state.backup_job_id).await;
        }

        info!(
            job_id,
            backup_job_id = %state.backup_job_id,
            schedule = state.schedule.as_deref().unwrap_or_default(),
            target_db = state.target_database.as_deref().unwrap_or_default(),
            "Registering backup job"
        );

        let backup = match self.renderer.render(&state).await {
            Ok(backup) => backup,
            Err(e) => return self.failed(state.backup_job_id, e.into()),
        };

        match self.actions.register(&backup).await {
            Ok(response) => {
                info!(
                    backup_job_id = %state.backup_job_id,
                    eval_id = %response.eval_id,
                    "Backup job registered"
                );
                ReconcileOutcome::Registered {
                    backup_job_id: state.backup_job_id,
                    eval_id: response.eval_id,
                }
            }
            Err(e) => self.failed(state.backup_job_id, ReconcileError::Register(e)),
        }
    }

    async fn remove(&self, backup_job_id: String) -> ReconcileOutcome {
        match self.actions.deregister(&backup_job_id, false).await {
            Ok(DeregisterOutcome::Removed { eval_id }) => {
                info!(backup_job_id = %backup_job_id, eval_id = %eval_id, "Backup job removed");
                ReconcileOutcome::Removed {
                    backup_job_id,
                    existed: true,
                }
            }
            Ok(DeregisterOutcome::NotFound) => {
                debug!(backup_job_id = %backup_job_id, "No backup job to remove");
                ReconcileOutcome::Removed {
                    backup_job_id,
                    existed: false,
                }
            }
            Err(e) => self.failed(backup_job_id, ReconcileError::Deregister(e)),
        }
    }

    fn failed(&self, backup_job_id: String, error: ReconcileError) -> ReconcileOutcome {
        error!(backup_job_id = %backup_job_id, error = %error, "Backup reconciliation failed");
        ReconcileOutcome::Failed {
            backup_job_id,
            error,
        }
    }
}

#[async_trait]
impl EntityHandler<Job> for BackupReconciler {
    async fn on_entity(&self, kind: &EventKind, job: Job) {
        self.reconcile(kind, &job).await;
    }
}
