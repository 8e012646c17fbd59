//! Error types for the artifact layer

use crate::hash::HashError;

/// Errors raised while building or checking artifacts
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// Timestamp missing an offset or otherwise not RFC3339
    #[error("invalid timestamp '{value}': {reason}")]
    InvalidTimestamp { value: String, reason: String },

    /// Run identifier was blank
    #[error("run_id must not be empty")]
    EmptyRunId,

    /// Unknown run mode name
    #[error("unknown run mode: '{0}'")]
    InvalidRunMode(String),

    /// Hashing failed
    #[error("hash error: {0}")]
    Hash(#[from] HashError),

    /// Payload was not a JSON object
    #[error("payload must be a JSON object, got {0}")]
    PayloadNotObject(&'static str),
}

impl ArtifactError {
    /// Create invalid timestamp error
    pub fn invalid_timestamp(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTimestamp {
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for artifact operations
pub type ArtifactResult<T> = Result<T, ArtifactError>;
