//! Scripted process backend for tests.
//!
//! Each spawn consumes the next queued [`Script`]; once the queue is empty,
//! spawned processes stay silent until terminated.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::time::Instant;

use crate::channel::{ReadOutcome, Spawner, SubprocessChannel};
use crate::command::CommandLine;
use crate::error::{ProcessError, Result};

#[derive(Debug, Clone)]
enum Step {
    Output(String),
    AwaitLine,
    Close,
}

/// Output a fake process replays, in order.
#[derive(Debug, Clone, Default)]
pub struct Script {
    steps: VecDeque<Step>,
}

impl Script {
    /// Creates an empty script (a process that never prints).
    pub fn new() -> Self {
        Self::default()
    }

    /// Emits `text` as one chunk.
    pub fn output(mut self, text: impl Into<String>) -> Self {
        self.steps.push_back(Step::Output(text.into()));
        self
    }

    /// Holds further output until the supervisor writes a line.
    pub fn await_line(mut self) -> Self {
        self.steps.push_back(Step::AwaitLine);
        self
    }

    /// Closes the output stream, as if the process exited.
    pub fn close(mut self) -> Self {
        self.steps.push_back(Step::Close);
        self
    }
}

/// One recorded spawn.
#[derive(Debug, Clone)]
pub struct SpawnRecord {
    /// The command that was spawned.
    pub command: CommandLine,
    /// When it was spawned.
    pub at: Instant,
}

#[derive(Debug, Default)]
struct Shared {
    scripts: VecDeque<Script>,
    spawns: Vec<SpawnRecord>,
    written: Vec<String>,
    terminations: usize,
    missing: bool,
}

/// Spawner that replays scripts instead of starting processes.
#[derive(Debug, Clone, Default)]
pub struct FakeSpawner {
    shared: Arc<Mutex<Shared>>,
}

impl FakeSpawner {
    /// Creates a spawner with no scripts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a spawner whose binary is never found.
    pub fn missing_binary() -> Self {
        let spawner = Self::default();
        spawner.lock().missing = true;
        spawner
    }

    /// Queues the script for the next spawn.
    pub fn push_script(&self, script: Script) -> &Self {
        self.lock().scripts.push_back(script);
        self
    }

    /// Returns every spawn so far.
    pub fn spawns(&self) -> Vec<SpawnRecord> {
        self.lock().spawns.clone()
    }

    /// Returns every line written to any fake process.
    pub fn written_lines(&self) -> Vec<String> {
        self.lock().written.clone()
    }

    /// Returns how many terminations were requested.
    pub fn termination_count(&self) -> usize {
        self.lock().terminations
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Spawner for FakeSpawner {
    async fn spawn(&self, command: &CommandLine) -> Result<Box<dyn SubprocessChannel>> {
        let mut shared = self.lock();
        if shared.missing {
            return Err(ProcessError::NotFound(command.program.clone()));
        }

        shared.spawns.push(SpawnRecord {
            command: command.clone(),
            at: Instant::now(),
        });
        let script = shared.scripts.pop_front().unwrap_or_default();
        let pid = shared.spawns.len() as u32;

        Ok(Box::new(FakeChannel {
            shared: Arc::clone(&self.shared),
            steps: script.steps,
            unread_lines: 0,
            terminated: false,
            pid,
        }))
    }
}

struct FakeChannel {
    shared: Arc<Mutex<Shared>>,
    steps: VecDeque<Step>,
    unread_lines: usize,
    terminated: bool,
    pid: u32,
}

#[async_trait]
impl SubprocessChannel for FakeChannel {
    async fn read_chunk(&mut self, deadline: Instant) -> Result<ReadOutcome> {
        loop {
            if self.terminated {
                return Ok(ReadOutcome::Closed);
            }
            match self.steps.front() {
                Some(Step::Output(_)) => {
                    if let Some(Step::Output(text)) = self.steps.pop_front() {
                        return Ok(ReadOutcome::Data(text.into_bytes()));
                    }
                }
                Some(Step::AwaitLine) if self.unread_lines > 0 => {
                    self.unread_lines -= 1;
                    self.steps.pop_front();
                }
                Some(Step::Close) => return Ok(ReadOutcome::Closed),
                Some(Step::AwaitLine) | None => {
                    tokio::time::sleep_until(deadline).await;
                    return Ok(ReadOutcome::TimedOut);
                }
            }
        }
    }

    async fn write_line(&mut self, text: &str) -> Result<()> {
        if self.terminated {
            return Err(ProcessError::InputClosed);
        }
        self.shared
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .written
            .push(text.to_string());
        self.unread_lines += 1;
        Ok(())
    }

    async fn terminate(&mut self) -> bool {
        if !self.terminated {
            self.terminated = true;
            self.shared
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .terminations += 1;
        }
        true
    }

    fn id(&self) -> Option<u32> {
        Some(self.pid)
    }
}
