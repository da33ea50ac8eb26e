//! Subprocess channel for Tunneler.
//!
//! This crate abstracts the one capability the supervisor needs from the OS:
//! start a process with a command line and environment, read its combined
//! output incrementally, write lines to it, and force-terminate it.
//!
//! - [`Spawner`] starts processes and hands back a [`SubprocessChannel`]
//! - [`PtySpawner`] runs the process on a pseudo-terminal, so prompts written
//!   to `/dev/tty` show up in the output
//! - `FakeSpawner` (feature `test-support`) replays scripted output
//!
//! # Example
//!
//! ```no_run
//! use tokio::time::{Duration, Instant};
//! use tunneler_process::{CommandLine, PtySpawner, ReadOutcome, Spawner, SubprocessChannel};
//!
//! # async fn example() -> tunneler_process::Result<()> {
//! let command = CommandLine::new("sh").arg("-c").arg("echo hello");
//! let mut channel = PtySpawner::new().spawn(&command).await?;
//!
//! let deadline = Instant::now() + Duration::from_secs(5);
//! if let ReadOutcome::Data(bytes) = channel.read_chunk(deadline).await? {
//!     println!("{}", String::from_utf8_lossy(&bytes));
//! }
//! channel.terminate().await;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod command;
pub mod error;
#[cfg(any(test, feature = "test-support"))]
pub mod fake;
pub mod pty;

pub use channel::{ReadOutcome, Spawner, SubprocessChannel};
pub use command::CommandLine;
pub use error::{ProcessError, Result};
pub use pty::{PtyChannel, PtySpawner};
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeSpawner, Script, SpawnRecord};
