//! Error types for the runtime crate.

use thiserror::Error;

/// Errors returned by [`Supervisor`](crate::Supervisor) calls.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The tunnel spec cannot be launched.
    #[error("invalid tunnel: {0}")]
    InvalidSpec(String),

    /// The worker task is gone.
    #[error("supervisor is not running")]
    Stopped,

    /// Shutdown error.
    #[error("shutdown error: {0}")]
    Shutdown(String),
}

/// Result type for supervisor operations.
pub type Result<T> = std::result::Result<T, SupervisorError>;
