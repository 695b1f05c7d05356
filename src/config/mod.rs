//! Operator configuration.
//!
//! Loaded from YAML files and environment variables. The standard Nomad and
//! Vault client variables (`NOMAD_ADDR`, `NOMAD_TOKEN`, `VAULT_ADDR`, ...)
//! take precedence over everything else so the operator behaves like the
//! `nomad` CLI in the same environment.

use std::path::PathBuf;

use serde::Deserialize;

use crate::stream::BatchFailurePolicy;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "BACKUP_OPERATOR_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "BACKUP_OPERATOR";
/// Environment variable for the log filter.
pub const LOG_ENV_VAR: &str = "BACKUP_OPERATOR_LOG";

/// Nomad HTTP API address.
pub const NOMAD_ADDR_ENV_VAR: &str = "NOMAD_ADDR";
/// Nomad ACL token.
pub const NOMAD_TOKEN_ENV_VAR: &str = "NOMAD_TOKEN";
/// Nomad namespace.
pub const NOMAD_NAMESPACE_ENV_VAR: &str = "NOMAD_NAMESPACE";
/// Nomad region.
pub const NOMAD_REGION_ENV_VAR: &str = "NOMAD_REGION";
/// Vault address.
pub const VAULT_ADDR_ENV_VAR: &str = "VAULT_ADDR";
/// Vault token.
pub const VAULT_TOKEN_ENV_VAR: &str = "VAULT_TOKEN";

/// Standard client variables and the config keys they override.
const CLIENT_ENV_OVERRIDES: &[(&str, &str)] = &[
    (NOMAD_ADDR_ENV_VAR, "nomad.address"),
    (NOMAD_TOKEN_ENV_VAR, "nomad.token"),
    (NOMAD_NAMESPACE_ENV_VAR, "nomad.namespace"),
    (NOMAD_REGION_ENV_VAR, "nomad.region"),
    (VAULT_ADDR_ENV_VAR, "vault.address"),
    (VAULT_TOKEN_ENV_VAR, "vault.token"),
];

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main operator configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub nomad: NomadConfig,
    pub vault: VaultConfig,
    pub streams: StreamsConfig,
    pub backup: BackupConfig,
    pub log: LogConfig,
}

/// Nomad API client settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NomadConfig {
    /// Base URL of the Nomad HTTP API.
    pub address: String,
    /// Namespace for subscriptions and job operations.
    pub namespace: String,
    pub region: Option<String>,
    /// ACL token sent as `X-Nomad-Token`.
    pub token: Option<String>,
    /// TCP connect timeout. Requests themselves have no deadline, since the
    /// event stream is held open indefinitely.
    pub connect_timeout_secs: u64,
}

impl Default for NomadConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:4646".to_string(),
            namespace: "default".to_string(),
            region: None,
            token: None,
            connect_timeout_secs: 10,
        }
    }
}

/// Vault client settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub address: String,
    pub token: Option<String>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:8200".to_string(),
            token: None,
        }
    }
}

/// Which event topics to consume and how batches treat failures.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamsConfig {
    /// Consume the `Job` topic and reconcile backup jobs.
    pub jobs: bool,
    /// Consume the `Node` topic. Node events are only logged.
    pub nodes: bool,
    pub batch_failure: BatchFailurePolicy,
    /// How long shutdown waits for in-flight events before aborting consumers.
    pub drain_timeout_secs: u64,
}

impl Default for StreamsConfig {
    fn default() -> Self {
        Self {
            jobs: true,
            nodes: false,
            batch_failure: BatchFailurePolicy::default(),
            drain_timeout_secs: 30,
        }
    }
}

/// Backup job settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Template file replacing the embedded backup job template.
    pub template_path: Option<PathBuf>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging settings. The filter itself comes from [`LOG_ENV_VAR`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    /// 5. Standard Nomad/Vault client variables
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new("config", FileFormat::Yaml).required(false))
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(CONFIG_ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        for (var, key) in CLIENT_ENV_OVERRIDES {
            let value = std::env::var(var).ok().filter(|v| !v.is_empty());
            builder = builder.set_override_option(*key, value)?;
        }

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.nomad.address.trim().is_empty() {
            return Err(ConfigError::Invalid("nomad.address must be set".to_string()));
        }
        if self.nomad.connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "nomad.connect_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.streams.drain_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "streams.drain_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if !self.streams.jobs && !self.streams.nodes {
            return Err(ConfigError::Invalid(
                "at least one of streams.jobs or streams.nodes must be enabled".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn clear_env() {
        std::env::remove_var(CONFIG_ENV_VAR);
        for (var, _) in CLIENT_ENV_OVERRIDES {
            std::env::remove_var(var);
        }
        for key in ["NOMAD__ADDRESS", "STREAMS__NODES", "STREAMS__BATCH_FAILURE"] {
            std::env::remove_var(format!("{CONFIG_ENV_PREFIX}__{key}"));
        }
    }

    fn yaml_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.nomad.address, "http://127.0.0.1:4646");
        assert_eq!(config.nomad.namespace, "default");
        assert!(config.nomad.token.is_none());
        assert!(config.streams.jobs);
        assert!(!config.streams.nodes);
        assert_eq!(config.streams.batch_failure, BatchFailurePolicy::SkipEvent);
        assert_eq!(config.streams.drain_timeout_secs, 30);
        assert_eq!(config.log.format, LogFormat::Text);
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        clear_env();
        let file = yaml_file(
            r#"
nomad:
  address: "http://nomad.service:4646"
  namespace: "prod"
  region: "eu"
streams:
  nodes: true
  batch_failure: abort_batch
  drain_timeout_secs: 5
backup:
  template_path: "/etc/backup/job.hcl"
log:
  format: json
"#,
        );

        let config = Config::load(Some(file.path().to_str().unwrap())).unwrap();

        assert_eq!(config.nomad.address, "http://nomad.service:4646");
        assert_eq!(config.nomad.namespace, "prod");
        assert_eq!(config.nomad.region.as_deref(), Some("eu"));
        assert!(config.streams.jobs);
        assert!(config.streams.nodes);
        assert_eq!(config.streams.batch_failure, BatchFailurePolicy::AbortBatch);
        assert_eq!(config.streams.drain_timeout_secs, 5);
        assert_eq!(
            config.backup.template_path,
            Some(PathBuf::from("/etc/backup/job.hcl"))
        );
        assert_eq!(config.log.format, LogFormat::Json);
    }

    #[test]
    #[serial]
    fn test_prefixed_env_overrides_file() {
        clear_env();
        let file = yaml_file("nomad:\n  address: \"http://from-file:4646\"\n");
        std::env::set_var("BACKUP_OPERATOR__NOMAD__ADDRESS", "http://from-prefix:4646");
        std::env::set_var("BACKUP_OPERATOR__STREAMS__NODES", "true");

        let config = Config::load(Some(file.path().to_str().unwrap()));
        clear_env();
        let config = config.unwrap();

        assert_eq!(config.nomad.address, "http://from-prefix:4646");
        assert!(config.streams.nodes);
    }

    #[test]
    #[serial]
    fn test_client_env_vars_take_precedence() {
        clear_env();
        std::env::set_var("BACKUP_OPERATOR__NOMAD__ADDRESS", "http://from-prefix:4646");
        std::env::set_var(NOMAD_ADDR_ENV_VAR, "https://nomad.example:4646");
        std::env::set_var(NOMAD_TOKEN_ENV_VAR, "secret-id");
        std::env::set_var(NOMAD_NAMESPACE_ENV_VAR, "");
        std::env::set_var(VAULT_TOKEN_ENV_VAR, "vault-token");

        let config = Config::load(None);
        clear_env();
        let config = config.unwrap();

        assert_eq!(config.nomad.address, "https://nomad.example:4646");
        assert_eq!(config.nomad.token.as_deref(), Some("secret-id"));
        assert_eq!(config.nomad.namespace, "default");
        assert_eq!(config.vault.token.as_deref(), Some("vault-token"));
    }

    #[test]
    #[serial]
    fn test_missing_explicit_file_fails() {
        clear_env();
        let result = Config::load(Some("/nonexistent/backup-operator.yaml"));
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }

    #[test]
    #[serial]
    fn test_all_streams_disabled_is_invalid() {
        clear_env();
        let file = yaml_file("streams:\n  jobs: false\n  nodes: false\n");

        let result = Config::load(Some(file.path().to_str().unwrap()));

        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    #[serial]
    fn test_zero_drain_timeout_is_invalid() {
        clear_env();
        let file = yaml_file("streams:\n  drain_timeout_secs: 0\n");

        let result = Config::load(Some(file.path().to_str().unwrap()));

        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
