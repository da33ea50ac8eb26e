//! Error types for output matching.

use thiserror::Error;
use tunneler_process::ProcessError;

/// Errors raised while waiting for process output.
#[derive(Error, Debug)]
pub enum ExpectError {
    /// Reading from or writing to the process failed.
    #[error("process error: {0}")]
    Process(#[from] ProcessError),

    /// A regular expression in a pattern table did not compile.
    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Result type alias for matching operations.
pub type Result<T> = std::result::Result<T, ExpectError>;
