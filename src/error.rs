//! Crate-level error type.
//!
//! Absence is never an error: lookups return `Ok(None)` and removals
//! return `Ok(false)`. Errors are reserved for misuse (bad configuration,
//! malformed requests, invalid patterns) and for collaborator failures.

use thiserror::Error;

use crate::remote::transport::TransportError;
use crate::storage::traits::StorageError;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid key pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Malformed {request_type} request: {reason}")]
    MalformedRequest {
        request_type: String,
        reason: String,
    },

    #[error("Region '{0}' has been disposed")]
    Disposed(String),

    #[error("Element belongs to region '{actual}', expected '{expected}'")]
    RegionMismatch { expected: String, actual: String },

    #[error("Remote cache reported failure: {0}")]
    Remote(String),

    #[error("Auxiliary store error: {0}")]
    Storage(#[from] StorageError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("No tokio runtime available to host background workers")]
    RuntimeUnavailable,

    #[error("Internal invariant violated: {0}")]
    Invariant(String),
}

impl CacheError {
    /// Short stable label, used for metrics and event logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::InvalidPattern { .. } => "invalid_pattern",
            Self::MalformedRequest { .. } => "malformed_request",
            Self::Disposed(_) => "disposed",
            Self::RegionMismatch { .. } => "region_mismatch",
            Self::Remote(_) => "remote",
            Self::Storage(_) => "storage",
            Self::Transport(_) => "transport",
            Self::RuntimeUnavailable => "runtime_unavailable",
            Self::Invariant(_) => "invariant",
        }
    }
}
