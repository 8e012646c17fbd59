//! Error types for the store layer

use std::path::PathBuf;

/// Errors raised by stores and write primitives
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Target of a write-once operation already exists
    #[error("file exists: {}", path.display())]
    FileExists { path: PathBuf },

    /// Validation hook rejected the data; nothing was written
    #[error("validation failed for {}: {reason}", path.display())]
    Validation { path: PathBuf, reason: String },

    /// Requested record does not exist
    #[error("not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// Key cannot be used as a file name
    #[error("invalid store key: '{0}'")]
    InvalidKey(String),

    /// IO error on a store path
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Record could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Create IO error for path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create validation error for path
    pub fn validation(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Validation {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error is the write-once collision
    #[inline]
    #[must_use]
    pub const fn is_file_exists(&self) -> bool {
        matches!(self, Self::FileExists { .. })
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
