//! Error types for profile storage.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading or saving state files.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Reading a file failed.
    #[error("failed to read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing a file failed.
    #[error("failed to write {path}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Creating the state directory failed.
    #[error("failed to create directory {path}: {source}")]
    DirectoryError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file did not hold valid JSON for the expected type.
    #[error("invalid JSON: {0}")]
    SerializeError(#[from] serde_json::Error),
}

/// Result type alias for persistence operations.
pub type Result<T> = std::result::Result<T, PersistenceError>;
