//! Kernel error types
//!
//! Gate outcomes are values ([`crate::CommitResult`], [`crate::PromoteResult`]);
//! these errors cover the surrounding I/O and policy loading.

use crate::degraded::SystemState;
use dtl_store::StoreError;
use std::path::PathBuf;

/// Kernel error
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// Store layer failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Bundle could not be hashed or serialized
    #[error("bundle encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Run id cannot be used to name a token file
    #[error("invalid run id for token file: '{0}'")]
    InvalidRunId(String),

    /// Policy document unreadable
    #[error("io error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Policy document malformed
    #[error("invalid policy {}: {reason}", path.display())]
    InvalidPolicy { path: PathBuf, reason: String },

    /// State change not permitted by the state machine
    #[error("illegal state transition {from} -> {to}")]
    IllegalTransition { from: SystemState, to: SystemState },
}

impl KernelError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the failure came from the filesystem
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Store(StoreError::Io { .. }))
    }
}

/// Result type alias for kernel operations
pub type KernelResult<T> = Result<T, KernelError>;
