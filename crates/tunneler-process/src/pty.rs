//! Pseudo-terminal backed subprocess channel.
//!
//! ssh talks to `/dev/tty` for password and host-key prompts, so the wrapper
//! runs in its own session with a pty as its controlling terminal. Output is
//! read on a dedicated thread and queued, which keeps `read_chunk` cancel-safe.

use std::io::{Read, Write};
use std::process::Stdio;
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tracing::{debug, trace, warn};

use crate::channel::{ReadOutcome, Spawner, SubprocessChannel};
use crate::command::CommandLine;
use crate::error::{ProcessError, Result};

/// Size of a single read from the pty master.
const READ_BUF_SIZE: usize = 4096;

/// How long to wait for the process to exit after a signal.
const EXIT_GRACE: Duration = Duration::from_millis(500);

/// Interval between exit checks while waiting.
const EXIT_POLL: Duration = Duration::from_millis(20);

/// Terminal size handed to the child. Wide enough that prompts never wrap.
const PTY_SIZE: PtySize = PtySize {
    rows: 24,
    cols: 200,
    pixel_width: 0,
    pixel_height: 0,
};

/// Spawns processes attached to a fresh pseudo-terminal.
#[derive(Debug, Default, Clone)]
pub struct PtySpawner;

impl PtySpawner {
    /// Creates a new spawner.
    pub fn new() -> Self {
        Self
    }

    /// Check if a program can be found in PATH.
    pub fn is_available(program: &str) -> bool {
        which::which(program).is_ok()
    }
}

fn pty_error(error: impl std::fmt::Display) -> ProcessError {
    ProcessError::Pty(error.to_string())
}

#[async_trait]
impl Spawner for PtySpawner {
    async fn spawn(&self, command: &CommandLine) -> Result<Box<dyn SubprocessChannel>> {
        let program = which::which(&command.program)
            .map_err(|_| ProcessError::NotFound(command.program.clone()))?;

        debug!(program = %program.display(), args = ?command.args, "spawning process on pty");

        let mut builder = CommandBuilder::new(&program);
        builder.args(&command.args);
        for (key, value) in std::env::vars_os() {
            builder.env(key, value);
        }
        for (key, value) in &command.env {
            builder.env(key, value);
        }

        let pair = native_pty_system().openpty(PTY_SIZE).map_err(pty_error)?;
        let child = pair
            .slave
            .spawn_command(builder)
            .map_err(|e| ProcessError::Launch {
                program: command.program.clone(),
                source: std::io::Error::other(e.to_string()),
            })?;
        // Only the child keeps the slave open, so the master sees EOF when it exits.
        drop(pair.slave);

        let reader = pair.master.try_clone_reader().map_err(pty_error)?;
        let writer = pair.master.take_writer().map_err(pty_error)?;

        let (tx, rx) = mpsc::unbounded_channel();
        thread::Builder::new()
            .name("tunneler-pty-reader".to_string())
            .spawn(move || pump(reader, tx))?;

        debug!(pid = ?child.process_id(), "process started");

        Ok(Box::new(PtyChannel {
            child,
            _master: pair.master,
            writer: Some(writer),
            output: rx,
            closed: false,
        }))
    }
}

/// Forwards everything read from the pty master into `tx` until EOF.
///
/// Linux reports a hung-up pty as `EIO`, which ends the stream like EOF.
fn pump(mut reader: Box<dyn Read + Send>, tx: mpsc::UnboundedSender<Vec<u8>>) {
    let mut buf = vec![0u8; READ_BUF_SIZE];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                trace!(bytes = n, "read output");
                if tx.send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => {
                trace!(error = %e, "pty closed");
                break;
            }
        }
    }
}

/// A process started by [`PtySpawner`].
pub struct PtyChannel {
    child: Box<dyn Child + Send + Sync>,
    // Keeps the terminal allocated while the channel lives.
    _master: Box<dyn MasterPty + Send>,
    writer: Option<Box<dyn Write + Send>>,
    output: mpsc::UnboundedReceiver<Vec<u8>>,
    closed: bool,
}

impl std::fmt::Debug for PtyChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtyChannel")
            .field("pid", &self.child.process_id())
            .field("closed", &self.closed)
            .finish()
    }
}

impl PtyChannel {
    fn has_exited(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }

    async fn wait_exit(&mut self, grace: Duration) -> bool {
        let deadline = Instant::now() + grace;
        loop {
            if self.has_exited() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(EXIT_POLL).await;
        }
    }

    /// Asks the process to exit with SIGTERM so wrappers can reap their children.
    #[cfg(unix)]
    async fn request_exit(&mut self) -> bool {
        let Some(pid) = self.child.process_id() else {
            return true;
        };

        let sent = Command::new("kill")
            .args(["-TERM", &pid.to_string()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false);

        sent && self.wait_exit(EXIT_GRACE).await
    }

    #[cfg(not(unix))]
    async fn request_exit(&mut self) -> bool {
        false
    }
}

#[async_trait]
impl SubprocessChannel for PtyChannel {
    async fn read_chunk(&mut self, deadline: Instant) -> Result<ReadOutcome> {
        if self.closed {
            return Ok(ReadOutcome::Closed);
        }

        match tokio::time::timeout_at(deadline, self.output.recv()).await {
            Ok(Some(chunk)) => Ok(ReadOutcome::Data(chunk)),
            Ok(None) => {
                self.closed = true;
                Ok(ReadOutcome::Closed)
            }
            Err(_) => Ok(ReadOutcome::TimedOut),
        }
    }

    async fn write_line(&mut self, text: &str) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(ProcessError::InputClosed)?;

        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');

        writer.write_all(line.as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    async fn terminate(&mut self) -> bool {
        self.writer = None;

        if self.has_exited() {
            return true;
        }

        if self.request_exit().await {
            debug!("process exited after SIGTERM");
            return true;
        }

        if let Err(e) = self.child.kill() {
            if self.has_exited() {
                return true;
            }
            warn!(error = %e, "failed to kill process");
            return false;
        }

        let exited = self.wait_exit(EXIT_GRACE).await;
        debug!(exited, "process killed");
        exited
    }

    fn id(&self) -> Option<u32> {
        self.child.process_id()
    }
}

impl Drop for PtyChannel {
    fn drop(&mut self) {
        if !self.has_exited() {
            let _ = self.child.kill();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    async fn read_until(channel: &mut dyn SubprocessChannel, needle: &str) -> String {
        let mut seen = String::new();
        while !seen.contains(needle) {
            match channel.read_chunk(deadline()).await.unwrap() {
                ReadOutcome::Data(bytes) => seen.push_str(&String::from_utf8_lossy(&bytes)),
                other => panic!("unexpected outcome {:?}, seen {:?}", other, seen),
            }
        }
        seen
    }

    async fn read_to_close(channel: &mut dyn SubprocessChannel) -> String {
        let mut seen = String::new();
        loop {
            match channel.read_chunk(deadline()).await.unwrap() {
                ReadOutcome::Data(bytes) => seen.push_str(&String::from_utf8_lossy(&bytes)),
                ReadOutcome::Closed => return seen,
                ReadOutcome::TimedOut => panic!("process did not finish, seen {:?}", seen),
            }
        }
    }

    #[tokio::test]
    async fn test_spawn_missing_binary() {
        let command = CommandLine::new("definitely-not-a-real-binary-tunneler");
        let result = PtySpawner::new().spawn(&command).await;
        assert!(matches!(result, Err(ProcessError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_child_has_a_terminal() {
        // Skip if sh not available
        if !PtySpawner::is_available("sh") {
            return;
        }

        let command = CommandLine::new("sh")
            .arg("-c")
            .arg("if [ -t 0 ] && [ -t 1 ]; then echo tty; else echo no-tty; fi");
        let mut channel = PtySpawner::new().spawn(&command).await.unwrap();

        let seen = read_to_close(channel.as_mut()).await;
        assert!(seen.contains("tty"), "seen {:?}", seen);
        assert!(!seen.contains("no-tty"), "seen {:?}", seen);
        assert_eq!(
            channel.read_chunk(deadline()).await.unwrap(),
            ReadOutcome::Closed
        );
    }

    #[tokio::test]
    async fn test_dev_tty_prompt_is_answered() {
        // Skip if sh not available
        if !PtySpawner::is_available("sh") {
            return;
        }

        let command = CommandLine::new("sh").arg("-c").arg(
            "printf \"alice@h's password: \" > /dev/tty; read answer < /dev/tty; echo got-$answer",
        );
        let mut channel = PtySpawner::new().spawn(&command).await.unwrap();

        read_until(channel.as_mut(), "'s password: ").await;
        channel.write_line("secret").await.unwrap();
        read_until(channel.as_mut(), "got-secret").await;
        assert!(channel.terminate().await);
    }

    #[tokio::test]
    async fn test_env_is_passed() {
        // Skip if sh not available
        if !PtySpawner::is_available("sh") {
            return;
        }

        let command = CommandLine::new("sh")
            .arg("-c")
            .arg("echo out-$TUNNELER_TEST")
            .env("TUNNELER_TEST", "1");
        let mut channel = PtySpawner::new().spawn(&command).await.unwrap();

        let seen = read_to_close(channel.as_mut()).await;
        assert!(seen.contains("out-1"), "seen {:?}", seen);
    }

    #[tokio::test]
    async fn test_write_line_and_terminate() {
        // Skip if cat not available
        if !PtySpawner::is_available("cat") {
            return;
        }

        let mut channel = PtySpawner::new()
            .spawn(&CommandLine::new("cat"))
            .await
            .unwrap();
        assert!(channel.id().is_some());

        channel.write_line("ping").await.unwrap();
        let seen = read_until(channel.as_mut(), "ping").await;
        assert!(seen.starts_with("ping"));

        assert!(channel.terminate().await);
        assert!(channel.terminate().await, "terminate is idempotent");
        assert!(matches!(
            channel.write_line("late").await,
            Err(ProcessError::InputClosed)
        ));
    }

    #[tokio::test]
    async fn test_read_times_out() {
        // Skip if sleep not available
        if !PtySpawner::is_available("sleep") {
            return;
        }

        let mut channel = PtySpawner::new()
            .spawn(&CommandLine::new("sleep").arg("5"))
            .await
            .unwrap();

        let outcome = channel
            .read_chunk(Instant::now() + Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(outcome, ReadOutcome::TimedOut);
        assert!(channel.terminate().await);
    }
}
