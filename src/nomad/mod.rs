//! Nomad HTTP API bindings.
//!
//! This module contains:
//! - `NomadClient`: async HTTP client for the endpoints the operator needs
//! - Wire types for jobs, nodes and the event stream
//! - `NomadError`: errors from any Nomad call

mod client;
mod ndjson;
mod types;

pub use client::NomadClient;
pub use ndjson::decode_event_batches;
pub use types::{
    Event, EventKind, Events, Job, JobListStub, JobRegisterResponse, Node, NodeListStub, QueryMeta,
    Topic,
};

/// Header carrying the Raft index a response was served at.
pub const INDEX_HEADER: &str = "X-Nomad-Index";
/// Header carrying the ACL token.
pub const TOKEN_HEADER: &str = "X-Nomad-Token";

/// Result type for Nomad operations.
pub type Result<T> = std::result::Result<T, NomadError>;

/// Errors that can occur talking to Nomad.
#[derive(Debug, thiserror::Error)]
pub enum NomadError {
    #[error("Invalid Nomad address '{address}': {message}")]
    InvalidAddress { address: String, message: String },

    #[error("Invalid ACL token: value is not a legal header")]
    InvalidToken,

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Nomad API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Failed to decode Nomad payload: {0}")]
    Decode(#[from] serde_json::Error),
}

impl NomadError {
    /// True when the API answered 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, NomadError::Api { status: 404, .. })
    }
}
