//! Centralized error types for mailupload.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by a conversion.
///
/// A conversion reports exactly one of these and never a partial result.
#[derive(Error, Debug)]
pub enum UploadError {
    /// The input message could not be read or parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A temp object could not be created, written or read.
    #[error("Storage error on '{path}': {source}")]
    Storage {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An internal invariant of the pipeline was violated.
    #[error("Composition error: {0}")]
    Composition(String),

    /// The upload request failed before a response was received.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A form field given on the command line or in the config is malformed.
    #[error("Invalid form field: {0}")]
    InvalidField(String),

    /// The input file does not exist.
    #[error("Message file not found: {0}")]
    FileNotFound(PathBuf),
}

/// Convenience alias for `Result<T, UploadError>`.
pub type Result<T> = std::result::Result<T, UploadError>;

impl UploadError {
    /// Create a `Storage` variant from a path and an `io::Error`.
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Short machine-readable name of the error kind, used in logs and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse(_) => "parse",
            Self::Storage { .. } => "storage",
            Self::Composition(_) => "composition",
            Self::Transport(_) => "transport",
            Self::InvalidField(_) => "invalid_field",
            Self::FileNotFound(_) => "file_not_found",
        }
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(source: reqwest::Error) -> Self {
        Self::Transport(source.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_display_includes_path() {
        let err = UploadError::storage(
            "/tmp/abc",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/tmp/abc"));
        assert!(msg.contains("denied"));
        assert_eq!(err.kind(), "storage");
    }
}
