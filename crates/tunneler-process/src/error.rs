//! Error types for subprocess operations.

use thiserror::Error;

/// Errors that can occur while driving a subprocess.
#[derive(Error, Debug)]
pub enum ProcessError {
    /// Executable not found in PATH.
    #[error("'{0}' not found in PATH")]
    NotFound(String),

    /// The executable was found but could not be started.
    #[error("failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The pseudo-terminal could not be set up.
    #[error("pty error: {0}")]
    Pty(String),

    /// The process no longer accepts input.
    #[error("process input is closed")]
    InputClosed,

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for subprocess operations.
pub type Result<T> = std::result::Result<T, ProcessError>;
