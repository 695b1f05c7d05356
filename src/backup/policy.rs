//! Metadata-driven backup policy.
//!
//! Pure functions: no I/O, no state carried between calls.

use std::collections::HashMap;

/// Prefix of every managed backup job's ID.
pub const BACKUP_JOB_PREFIX: &str = "backup-";
/// Substring Nomad puts in the IDs of periodic job instances.
pub const PERIODIC_MARKER: &str = "periodic";

/// Metadata flag enabling backups for a job.
pub const BACKUP_FLAG: &str = "auto-backup";
/// Metadata key holding the backup schedule.
pub const BACKUP_SCHEDULE: &str = "backup-schedule";
/// Metadata key holding the backup target database.
pub const BACKUP_TARGET_DB: &str = "backup-target-db";

/// Target state of the backup job belonging to one source job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredBackupState {
    /// Derived name of the backup job, always `backup-<source_job_id>`.
    pub backup_job_id: String,
    pub source_job_id: String,
    pub schedule: Option<String>,
    pub target_database: Option<String>,
    pub enabled: bool,
}

/// Derive the backup job ID for a source job.
pub fn backup_job_id(source_job_id: &str) -> String {
    format!("{BACKUP_JOB_PREFIX}{source_job_id}")
}

/// True for jobs this operator created.
pub fn is_backup_job(job_id: &str) -> bool {
    job_id.starts_with(BACKUP_JOB_PREFIX)
}

/// True for instances spawned by a periodic job.
pub fn is_periodic_instance(job_id: &str) -> bool {
    job_id.contains(PERIODIC_MARKER)
}

/// Compute the desired backup state for a job from its metadata.
///
/// Callers must filter out backup jobs and periodic instances first.
/// Schedule and target are only copied when the flag is on.
pub fn decide(job_id: &str, meta: &HashMap<String, String>) -> DesiredBackupState {
    let mut state = DesiredBackupState {
        backup_job_id: backup_job_id(job_id),
        source_job_id: job_id.to_string(),
        ..Default::default()
    };

    let enabled = meta
        .get(BACKUP_FLAG)
        .and_then(|flag| parse_bool(flag))
        .unwrap_or(false);
    if !enabled {
        return state;
    }

    state.enabled = true;
    state.schedule = meta.get(BACKUP_SCHEDULE).cloned();
    state.target_database = meta.get(BACKUP_TARGET_DB).cloned();
    state
}

/// Boolean literals accepted in job metadata.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}
