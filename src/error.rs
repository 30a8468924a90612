//! Error types for the replica
//!
//! Errors raised inside the replica are `ReplicaError`. Remote
//! collaborators report `RemoteError`, which services translate into the
//! matching `ReplicaError` variant for the failed step.

use thiserror::Error;

/// Replica-wide error type
///
/// None of these is fatal: each one is either recovered locally (logged,
/// offending record dropped) or returned to the invoking collaborator.
#[derive(Debug, Error)]
pub enum ReplicaError {
    /// Paginated fetch or poll failed; no cache mutation happened
    #[error("Remote fetch failed: {0}")]
    RemoteFetch(String),

    /// Entity violates a data model invariant
    #[error("Validation error: {0}")]
    Validation(String),

    /// Media or metadata upload failed; no placeholder was created
    #[error("Upload failed: {0}")]
    Upload(String),

    /// Relayer rejected the post/comment submission
    #[error("Relayer error: {0}")]
    Relayer(String),

    /// Canonical record never showed up while polling
    #[error("Publication {id} still indexing after {attempts} attempts")]
    ReconciliationTimeout { id: String, attempts: u32 },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ReplicaError {
    /// Metric label for this error
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RemoteFetch(_) => "remote_fetch",
            Self::Validation(_) => "validation",
            Self::Upload(_) => "upload",
            Self::Relayer(_) => "relayer",
            Self::ReconciliationTimeout { .. } => "reconciliation_timeout",
            Self::Config(_) => "config",
            Self::Internal(_) => "internal",
        }
    }

    /// Count this error in `errors_total` and hand it back
    pub(crate) fn recorded(self) -> Self {
        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL.with_label_values(&[self.kind()]).inc();
        self
    }
}

impl From<config::ConfigError> for ReplicaError {
    fn from(err: config::ConfigError) -> Self {
        ReplicaError::Config(err.to_string())
    }
}

/// Failure reported by a remote collaborator
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Network-level failure
    #[error("transport error: {0}")]
    Transport(String),

    /// The API answered with an error
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The API answered with something we could not decode
    #[error("malformed response: {0}")]
    Decode(String),
}

/// Result type alias using ReplicaError
pub type Result<T> = std::result::Result<T, ReplicaError>;
