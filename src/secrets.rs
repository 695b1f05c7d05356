//! Secrets backend (Vault) client.
//!
//! Constructed at startup and handed to nothing yet: backup jobs currently
//! take their credentials from the job template. Construction still fails
//! fast on a bad address or token so misconfiguration surfaces before any
//! stream is opened.

use reqwest::header::HeaderValue;
use reqwest::Url;
use tracing::debug;

use crate::config::VaultConfig;

/// Header carrying the Vault token.
pub const VAULT_TOKEN_HEADER: &str = "X-Vault-Token";

/// Secrets client errors.
#[derive(Debug, thiserror::Error)]
pub enum SecretsError {
    #[error("Invalid Vault address '{address}': {message}")]
    InvalidAddress { address: String, message: String },

    #[error("Vault token contains characters not allowed in a header")]
    InvalidToken,
}

/// Validated Vault endpoint and token.
#[derive(Debug, Clone)]
pub struct SecretsClient {
    address: Url,
    token: Option<HeaderValue>,
}

impl SecretsClient {
    pub fn new(config: &VaultConfig) -> Result<Self, SecretsError> {
        let address =
            Url::parse(&config.address).map_err(|e| SecretsError::InvalidAddress {
                address: config.address.clone(),
                message: e.to_string(),
            })?;
        if !matches!(address.scheme(), "http" | "https") {
            return Err(SecretsError::InvalidAddress {
                address: config.address.clone(),
                message: format!("unsupported scheme '{}'", address.scheme()),
            });
        }

        let token = config
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(|t| {
                let mut value = HeaderValue::from_str(t).map_err(|_| SecretsError::InvalidToken)?;
                value.set_sensitive(true);
                Ok::<_, SecretsError>(value)
            })
            .transpose()?;

        debug!(address = %address, token = token.is_some(), header = VAULT_TOKEN_HEADER, "Vault client initialized");

        Ok(Self { address, token })
    }

    pub fn address(&self) -> &Url {
        &self.address
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }
}
