//! Error types for the Constitutional Layer
//!
//! Covers loading of schemas and kill-switch policies. Validation outcomes
//! themselves are values ([`crate::FirewallVerdict`],
//! [`crate::EnforcementResult`]), not errors.

use std::path::PathBuf;

/// Combined constitutional layer error
#[derive(Debug, thiserror::Error)]
pub enum ConstitutionalError {
    /// IO error while reading configuration
    #[error("io error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Policy or schema document is not valid JSON of the expected shape
    #[error("invalid document {}: {reason}", path.display())]
    InvalidDocument { path: PathBuf, reason: String },

    /// Schema failed to compile
    #[error("schema '{name}' does not compile: {reason}")]
    SchemaCompile { name: String, reason: String },

    /// Schema requested by name is not registered
    #[error("Unknown schema: {0}")]
    UnknownSchema(String),
}

impl ConstitutionalError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create invalid document error for path
    pub fn invalid_document(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::InvalidDocument {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for constitutional operations
pub type ConstitutionalResult<T> = Result<T, ConstitutionalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_schema_display() {
        let err = ConstitutionalError::UnknownSchema("nope".to_string());
        assert_eq!(err.to_string(), "Unknown schema: nope");
    }

    #[test]
    fn invalid_document_display() {
        let err = ConstitutionalError::invalid_document("k.json", "expected value at line 1");
        assert!(err.to_string().contains("k.json"));
    }
}
