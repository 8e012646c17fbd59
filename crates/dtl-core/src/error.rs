//! Error types for the DTL core
//!
//! Stage failures and run-level failures are kept apart: a [`StageError`]
//! names what went wrong inside one stage, a [`CoreError`] is anything that
//! stops the orchestrator or the binary from starting a run at all.

use dtl_artifact::{ArtifactError, CapabilityDeniedError, ManifestError};
use dtl_constitutional::ConstitutionalError;
use dtl_kernel::KernelError;
use dtl_store::StoreError;
use std::path::PathBuf;

/// Failure inside a single stage
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// Stage manifest missing or invalid
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Claimed a capability the stage may not use
    #[error(transparent)]
    CapabilityDenied(#[from] CapabilityDeniedError),

    /// Envelope or bundle construction failed
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    /// Evidence persistence failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Output did not pass the firewall
    #[error("firewall rejected {schema}: {}", errors.join("; "))]
    FirewallRejected {
        /// Schema the output was checked against
        schema: String,
        /// Schema and injection errors
        errors: Vec<String>,
    },

    /// Input did not have the expected shape
    #[error("invalid stage input: {0}")]
    InvalidInput(String),

    /// JSON encoding failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StageError {
    /// Whether the firewall produced this error
    #[inline]
    #[must_use]
    pub const fn is_firewall(&self) -> bool {
        matches!(self, Self::FirewallRejected { .. })
    }
}

/// Result type for stage operations
pub type StageResult<T> = Result<T, StageError>;

/// Failure setting up or finishing a run
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// `dtl.toml` unreadable or malformed
    #[error("configuration error in {}: {reason}", path.display())]
    Config {
        /// Offending file
        path: PathBuf,
        /// Parser or I/O message
        reason: String,
    },

    /// A stage failed
    #[error("stage failed: {0}")]
    Stage(#[from] StageError),

    /// Manifest missing or invalid
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Bad run id or timestamp
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    /// Store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Schema or policy document failure
    #[error(transparent)]
    Constitutional(#[from] ConstitutionalError),

    /// Commit gate or degraded-mode failure
    #[error(transparent)]
    Kernel(#[from] KernelError),

    /// JSON encoding failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    /// Create a configuration error
    pub fn config(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Config {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;
