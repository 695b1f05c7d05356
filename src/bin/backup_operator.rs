//! backup-operator: Nomad backup job controller
//!
//! Subscribes to the Nomad event stream and keeps a `backup-<job>` periodic
//! job registered for every job whose metadata sets `auto-backup = true`.
//!
//! ## Architecture
//! ```text
//! [Nomad /v1/event/stream] --(Job:*)--> [backup-operator] --(register/deregister)--> [Nomad /v1/jobs]
//! ```
//!
//! ## Configuration
//! - `--config <path>` / BACKUP_OPERATOR_CONFIG: YAML config file
//! - BACKUP_OPERATOR__<SECTION>__<KEY>: individual settings
//! - NOMAD_ADDR, NOMAD_TOKEN, NOMAD_NAMESPACE, NOMAD_REGION: Nomad client
//! - VAULT_ADDR, VAULT_TOKEN: Vault client
//! - BACKUP_OPERATOR_LOG: log filter (default: info)

use std::sync::Arc;

use tracing::info;

use nomad_backup_operator::config::Config;
use nomad_backup_operator::nomad::NomadClient;
use nomad_backup_operator::operator::{self, Backends};
use nomad_backup_operator::secrets::SecretsClient;
use nomad_backup_operator::supervisor::ConsumerExit;
use nomad_backup_operator::utils::bootstrap::{
    config_path_from_args, init_tracing, shutdown_signal,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config_path_from_args(std::env::args().skip(1));
    let config = Config::load(config_path.as_deref())?;
    init_tracing(&config.log);

    info!("Starting Nomad backup operator");

    let vault = SecretsClient::new(&config.vault)?;
    info!(address = %vault.address(), token = vault.has_token(), "Vault client initialized");

    let nomad = Arc::new(NomadClient::new(&config.nomad)?);
    info!(address = %nomad.address(), namespace = %nomad.namespace(), "Nomad client initialized");

    let peers = nomad.peers().await?;
    info!("There are {} peers", peers.len());
    for (i, peer) in peers.iter().enumerate() {
        info!("Peer: {} is {}", i, peer);
    }

    let supervisor = operator::start(&config, &Backends::from_client(nomad))?;
    let report = supervisor.run(shutdown_signal()).await;

    if report.is_clean() {
        info!("Backup operator stopped");
        return Ok(());
    }

    match report.first_error() {
        Some(ConsumerExit {
            name,
            result: Err(e),
        }) => Err(format!("Consumer {name} failed: {e}").into()),
        _ => Err(format!("{} consumer task(s) crashed", report.crashed).into()),
    }
}
