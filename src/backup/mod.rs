//! Backup job management.
//!
//! This module contains:
//! - `policy`: metadata → desired backup state
//! - `template` / `renderer`: desired state → registrable job
//! - `JobActions` trait: register/deregister against the orchestrator
//! - `BackupReconciler`: the job-event handler tying these together

pub mod actions;
pub mod policy;
pub mod reconciler;
pub mod renderer;
pub mod template;

pub use actions::{DeregisterOutcome, JobActions};
pub use policy::{
    backup_job_id, decide, DesiredBackupState, BACKUP_FLAG, BACKUP_JOB_PREFIX, BACKUP_SCHEDULE,
    BACKUP_TARGET_DB, PERIODIC_MARKER,
};
pub use reconciler::{BackupReconciler, ReconcileError, ReconcileOutcome, SkipReason};
pub use renderer::{BackupJobRenderer, JobSpecParser, RenderError};
pub use template::{JobTemplate, TemplateError};
