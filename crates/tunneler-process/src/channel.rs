//! Traits implemented by process backends.

use async_trait::async_trait;
use tokio::time::Instant;

use crate::command::CommandLine;
use crate::error::Result;

/// Result of one bounded read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Newly available output (stdout and stderr combined).
    Data(Vec<u8>),
    /// The deadline passed without output.
    TimedOut,
    /// Every output stream reached end of file.
    Closed,
}

/// A running process seen as a duplex byte stream.
///
/// Implementations must be cancel-safe in [`SubprocessChannel::read_chunk`]:
/// dropping a pending read must not lose output.
#[async_trait]
pub trait SubprocessChannel: Send {
    /// Waits for output until `deadline`.
    async fn read_chunk(&mut self, deadline: Instant) -> Result<ReadOutcome>;

    /// Writes `text` followed by a newline to the process input.
    async fn write_line(&mut self, text: &str) -> Result<()>;

    /// Requests forceful termination.
    ///
    /// Returns true once the process is known to be gone.
    async fn terminate(&mut self) -> bool;

    /// OS process id, if any.
    fn id(&self) -> Option<u32>;
}

/// Starts processes.
#[async_trait]
pub trait Spawner: Send + Sync {
    /// Spawns `command` and returns its channel.
    async fn spawn(&self, command: &CommandLine) -> Result<Box<dyn SubprocessChannel>>;
}
