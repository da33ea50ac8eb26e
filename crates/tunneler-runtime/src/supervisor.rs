//! The supervisor worker and its handle.
//!
//! One tokio task owns the process, the state machine and the retry state.
//! [`Supervisor`] talks to it over a command channel; every command is
//! acknowledged through a one-shot reply. Events flow back over an unbounded
//! channel so none are lost, and a watch channel mirrors the current status
//! for synchronous queries.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, warn};
use tunneler_expect::{Expectation, Expecter, ExpectError, Phase, Signal};
use tunneler_models::{ConnectionState, TunnelSpec};
use tunneler_process::Spawner;

use crate::config::SupervisorConfig;
use crate::error::{Result, SupervisorError};
use crate::event::TunnelEvent;
use crate::launch::launch_command;
use crate::machine::{Action, AttemptInfo, ConnectionStateMachine, Step};
use crate::port::PortAllocator;

/// Capacity of the command queue.
const COMMAND_BUFFER: usize = 16;

/// Reply to [`Supervisor::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A tunnel attempt was started.
    Started,
    /// A tunnel was already active, so it was stopped instead.
    Stopped,
}

/// Snapshot of the supervisor's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SupervisorStatus {
    /// Current connection state.
    pub state: ConnectionState,
    /// Consecutive recoverable failures.
    pub consecutive_failures: u32,
    /// Monitor port of the current or last spawn.
    pub monitor_port: Option<u16>,
}

enum Command {
    Connect {
        spec: TunnelSpec,
        reply: oneshot::Sender<Result<ConnectOutcome>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Shutdown,
}

/// Handle to a supervisor worker.
pub struct Supervisor {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<SupervisorStatus>,
    handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("status", &*self.status.borrow())
            .field("running", &self.handle.is_some())
            .finish()
    }
}

impl Supervisor {
    /// Spawns the worker task and returns its handle and event feed.
    ///
    /// Must be called within a tokio runtime.
    pub fn start(
        config: SupervisorConfig,
        spawner: Arc<dyn Spawner>,
    ) -> (Self, mpsc::UnboundedReceiver<TunnelEvent>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SupervisorStatus::default());

        let worker = Worker::new(config, spawner, command_rx, event_tx, status_tx);
        let handle = tokio::spawn(worker.run());
        info!("supervisor started");

        let supervisor = Self {
            commands: command_tx,
            status: status_rx,
            handle: Some(handle),
        };
        (supervisor, event_rx)
    }

    /// Starts a tunnel, or stops the active one.
    ///
    /// Like a connect/disconnect toggle, calling this while a tunnel is
    /// connecting or connected only disconnects it.
    pub async fn connect(&self, spec: TunnelSpec) -> Result<ConnectOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Connect { spec, reply }).await?;
        rx.await.map_err(|_| SupervisorError::Stopped)?
    }

    /// Stops the active tunnel. Does nothing when idle.
    pub async fn disconnect(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Disconnect { reply }).await?;
        rx.await.map_err(|_| SupervisorError::Stopped)
    }

    /// Returns true while a tunnel is connecting or connected.
    pub fn is_running(&self) -> bool {
        self.state().is_active()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    /// Current status snapshot.
    pub fn status(&self) -> SupervisorStatus {
        *self.status.borrow()
    }

    /// Returns a receiver that observes every status update.
    pub fn watch_status(&self) -> watch::Receiver<SupervisorStatus> {
        self.status.clone()
    }

    /// Disconnects and waits for the worker to exit.
    pub async fn shutdown(mut self) -> Result<()> {
        info!("shutting down supervisor");
        // The worker may already be gone; joining below reports that.
        let _ = self.commands.send(Command::Shutdown).await;

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .map_err(|e| SupervisorError::Shutdown(format!("worker task panicked: {}", e)))?;
        }
        info!("supervisor stopped");
        Ok(())
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SupervisorError::Stopped)
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        // Ask the worker to clean up if shutdown() was not called
        if self.handle.is_some() {
            let _ = self.commands.try_send(Command::Shutdown);
        }
    }
}

/// A running spawn.
struct Attempt {
    spec: TunnelSpec,
    expecter: Expecter,
    deadline: Instant,
}

impl Attempt {
    async fn next_signal(&mut self, phase: Phase) -> std::result::Result<Signal, ExpectError> {
        let outcome = self.expecter.expect_until(phase.table(), self.deadline).await?;
        Ok(match outcome {
            Expectation::Matched(m) => m.kind,
            Expectation::TimedOut | Expectation::Unknown(_) => Signal::Timeout,
            Expectation::StreamClosed => Signal::ProcessExited,
        })
    }
}

enum Activity {
    Idle,
    Running(Attempt),
    Backoff { spec: TunnelSpec, until: Instant },
}

enum Wake {
    Command(Command),
    Signal(std::result::Result<Signal, ExpectError>),
    BackoffElapsed,
    Closed,
}

struct Worker {
    config: SupervisorConfig,
    spawner: Arc<dyn Spawner>,
    commands: mpsc::Receiver<Command>,
    events: mpsc::UnboundedSender<TunnelEvent>,
    status: watch::Sender<SupervisorStatus>,
    machine: ConnectionStateMachine,
    ports: PortAllocator,
    activity: Activity,
    monitor_port: Option<u16>,
}

impl Worker {
    fn new(
        config: SupervisorConfig,
        spawner: Arc<dyn Spawner>,
        commands: mpsc::Receiver<Command>,
        events: mpsc::UnboundedSender<TunnelEvent>,
        status: watch::Sender<SupervisorStatus>,
    ) -> Self {
        let machine = ConnectionStateMachine::new(config.retry.clone(), config.host_key_limit);
        let ports = match config.port_seed {
            Some(seed) => PortAllocator::seeded(config.monitor_ports.clone(), seed),
            None => PortAllocator::new(config.monitor_ports.clone()),
        };

        Self {
            config,
            spawner,
            commands,
            events,
            status,
            machine,
            ports,
            activity: Activity::Idle,
            monitor_port: None,
        }
    }

    async fn run(mut self) {
        debug!("supervisor worker running");

        loop {
            let phase = self.machine.phase();
            let wake = match &mut self.activity {
                Activity::Idle => match self.commands.recv().await {
                    Some(command) => Wake::Command(command),
                    None => Wake::Closed,
                },
                Activity::Running(attempt) => tokio::select! {
                    biased;
                    command = self.commands.recv() => command.map_or(Wake::Closed, Wake::Command),
                    signal = attempt.next_signal(phase) => Wake::Signal(signal),
                },
                Activity::Backoff { until, .. } => {
                    let until = *until;
                    tokio::select! {
                        biased;
                        command = self.commands.recv() => command.map_or(Wake::Closed, Wake::Command),
                        _ = sleep_until(until) => Wake::BackoffElapsed,
                    }
                }
            };

            match wake {
                Wake::Command(Command::Connect { spec, reply }) => {
                    let outcome = self.on_connect(spec).await;
                    let _ = reply.send(outcome);
                }
                Wake::Command(Command::Disconnect { reply }) => {
                    self.stop().await;
                    let _ = reply.send(());
                }
                Wake::Command(Command::Shutdown) | Wake::Closed => {
                    self.stop().await;
                    break;
                }
                Wake::Signal(Ok(signal)) => self.on_signal(signal).await,
                Wake::Signal(Err(e)) => {
                    warn!(error = %e, "lost contact with tunnel process");
                    let step = self.machine.fail(format!("Lost contact with the tunnel process: {}", e));
                    self.finish(step).await;
                }
                Wake::BackoffElapsed => {
                    if let Activity::Backoff { spec, .. } =
                        std::mem::replace(&mut self.activity, Activity::Idle)
                    {
                        self.launch(spec).await;
                    }
                }
            }
        }

        debug!("supervisor worker stopped");
    }

    async fn on_connect(&mut self, spec: TunnelSpec) -> Result<ConnectOutcome> {
        if !matches!(self.activity, Activity::Idle) {
            debug!("connect while active, disconnecting");
            self.stop().await;
            return Ok(ConnectOutcome::Stopped);
        }

        spec.validate().map_err(SupervisorError::InvalidSpec)?;
        info!(destination = %spec.destination(), "connecting");
        self.launch(spec).await;
        Ok(ConnectOutcome::Started)
    }

    /// Spawns the wrapper for `spec`, choosing a monitor port if it has none.
    async fn launch(&mut self, spec: TunnelSpec) {
        let spec = match spec.monitor_port() {
            Some(_) => spec,
            None => {
                let port = self.ports.next_port(None);
                self.change_monitor_port(port);
                spec.with_monitor_port(port)
            }
        };
        let monitor_port = spec.monitor_port().unwrap_or_default();
        self.monitor_port = Some(monitor_port);

        let events = self.machine.begin_attempt(AttemptInfo {
            monitor_port,
            socks_port: spec.socks_port(),
            has_password: spec.password().is_some(),
        });
        self.publish(events);

        let command = launch_command(&self.config, &spec, monitor_port);
        self.publish(vec![TunnelEvent::Log(command.to_string())]);

        match self.spawner.spawn(&command).await {
            Ok(channel) => {
                debug!(pid = ?channel.id(), monitor_port, "tunnel process spawned");
                self.activity = Activity::Running(Attempt {
                    spec,
                    expecter: Expecter::new(channel),
                    deadline: Instant::now() + self.config.negotiate_timeout,
                });
            }
            Err(e) => {
                warn!(error = %e, "failed to spawn tunnel process");
                let step = self.machine.fail(format!("Cannot start {}: {}", self.config.program, e));
                self.publish(step.events);
                self.activity = Activity::Idle;
            }
        }
    }

    async fn on_signal(&mut self, signal: Signal) {
        let step = self.machine.handle(signal);
        if step.action.ends_attempt() {
            self.finish(step).await;
            return;
        }

        self.publish(step.events);
        let Activity::Running(attempt) = &mut self.activity else {
            return;
        };

        let written = match step.action {
            Action::Reply(line) => attempt.expecter.write_line(line).await,
            Action::SendPassword => {
                let password = attempt.spec.password().unwrap_or_default().to_string();
                attempt.expecter.write_line(&password).await
            }
            _ => Ok(()),
        };

        if let Err(e) = written {
            warn!(error = %e, "failed to answer prompt");
            let step = self.machine.fail(format!("Cannot answer the prompt: {}", e));
            self.finish(step).await;
            return;
        }

        let timeout = if self.machine.is_established() {
            self.config.poll_timeout
        } else {
            self.config.negotiate_timeout
        };
        attempt.deadline = Instant::now() + timeout;
    }

    /// Publishes the step's events, ends the current spawn and carries out
    /// the follow-up action.
    async fn finish(&mut self, step: Step) {
        self.publish(step.events);

        let spec = match std::mem::replace(&mut self.activity, Activity::Idle) {
            Activity::Running(mut attempt) => {
                self.terminate(&mut attempt.expecter).await;
                Some(attempt.spec)
            }
            Activity::Backoff { spec, .. } => Some(spec),
            Activity::Idle => None,
        };
        let Some(spec) = spec else {
            return;
        };

        match step.action {
            Action::Retry { delay } => {
                debug!(delay_secs = delay.as_secs(), "backing off");
                self.activity = Activity::Backoff {
                    spec,
                    until: Instant::now() + delay,
                };
            }
            Action::Respawn => {
                let port = self.ports.next_port(spec.monitor_port());
                self.change_monitor_port(port);
                self.launch(spec.with_monitor_port(port)).await;
            }
            _ => {}
        }
    }

    /// Ends supervision at the user's request.
    async fn stop(&mut self) {
        if let Activity::Running(mut attempt) = std::mem::replace(&mut self.activity, Activity::Idle) {
            self.terminate(&mut attempt.expecter).await;
        }
        let events = self.machine.disconnect();
        self.publish(events);
    }

    /// Force-terminates the process, retrying a bounded number of times.
    async fn terminate(&mut self, expecter: &mut Expecter) -> bool {
        for attempt in 1..=self.config.terminate_attempts {
            if expecter.terminate().await {
                debug!(attempt, "tunnel process terminated");
                return true;
            }
            sleep(self.config.terminate_interval).await;
        }
        warn!(
            attempts = self.config.terminate_attempts,
            pid = ?expecter.id(),
            "gave up terminating tunnel process"
        );
        false
    }

    fn change_monitor_port(&mut self, port: u16) {
        info!(port, "monitor port chosen");
        self.monitor_port = Some(port);
        self.publish(vec![TunnelEvent::MonitorPortChanged(port)]);
    }

    fn publish(&mut self, events: Vec<TunnelEvent>) {
        for event in events {
            // A dropped receiver only means nobody is listening.
            let _ = self.events.send(event);
        }
        self.status.send_replace(SupervisorStatus {
            state: self.machine.state(),
            consecutive_failures: self.machine.failures(),
            monitor_port: self.monitor_port,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tunneler_process::{CommandLine, FakeSpawner, ReadOutcome, Script, SubprocessChannel};

    fn spec() -> TunnelSpec {
        TunnelSpec::new("example.org", "alice").with_monitor_port(20000)
    }

    fn start(spawner: &FakeSpawner) -> (Supervisor, mpsc::UnboundedReceiver<TunnelEvent>) {
        let config = SupervisorConfig::new()
            .with_port_seed(1)
            .with_terminate_attempts(3, Duration::from_millis(10));
        Supervisor::start(config, Arc::new(spawner.clone()))
    }

    fn drain(events: &mut mpsc::UnboundedReceiver<TunnelEvent>) -> Vec<TunnelEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_is_a_toggle() {
        let spawner = FakeSpawner::new();
        let (supervisor, mut events) = start(&spawner);

        assert_eq!(
            supervisor.connect(spec()).await.unwrap(),
            ConnectOutcome::Started
        );
        assert!(supervisor.is_running());
        assert_eq!(supervisor.state(), ConnectionState::Connecting);

        assert_eq!(
            supervisor.connect(spec()).await.unwrap(),
            ConnectOutcome::Stopped
        );
        assert!(!supervisor.is_running());
        assert_eq!(spawner.spawns().len(), 1);
        assert_eq!(spawner.termination_count(), 1);

        let states: Vec<_> = drain(&mut events)
            .iter()
            .filter_map(TunnelEvent::as_state)
            .collect();
        assert_eq!(
            states,
            vec![ConnectionState::Connecting, ConnectionState::NotConnected]
        );
        supervisor.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_spec_is_rejected() {
        let spawner = FakeSpawner::new();
        let (supervisor, mut events) = start(&spawner);

        let result = supervisor.connect(TunnelSpec::new("", "alice")).await;
        assert!(matches!(result, Err(SupervisorError::InvalidSpec(_))));
        assert!(spawner.spawns().is_empty());
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_failure_is_fatal() {
        let spawner = FakeSpawner::missing_binary();
        let (supervisor, mut events) = start(&spawner);

        supervisor.connect(spec()).await.unwrap();
        assert_eq!(supervisor.state(), ConnectionState::NotConnected);

        let events = drain(&mut events);
        assert_eq!(
            events.last(),
            Some(&TunnelEvent::StateChanged(ConnectionState::NotConnected))
        );
        assert!(events
            .iter()
            .filter_map(TunnelEvent::as_log)
            .any(|l| l.starts_with("Cannot start autossh")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_port_allocated_when_missing() {
        let spawner = FakeSpawner::new();
        let (supervisor, mut events) = start(&spawner);

        supervisor
            .connect(TunnelSpec::new("example.org", "alice"))
            .await
            .unwrap();

        let port = supervisor.status().monitor_port.unwrap();
        assert!((10000..=32767).contains(&port));
        assert_eq!(drain(&mut events)[0], TunnelEvent::MonitorPortChanged(port));

        let spawned = &spawner.spawns()[0].command;
        assert_eq!(spawned.args[1], port.to_string());
    }

    #[tokio::test(start_paused = true)]
    async fn test_logs_command_line() {
        let spawner = FakeSpawner::new();
        let (supervisor, mut events) = start(&spawner);

        supervisor.connect(spec().with_password("hunter2")).await.unwrap();
        let logs: Vec<String> = drain(&mut events)
            .iter()
            .filter_map(|e| e.as_log().map(str::to_string))
            .collect();
        assert_eq!(
            logs,
            vec!["autossh -M 20000 -TnN -D 7070 alice@example.org".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_terminates_process() {
        let spawner = FakeSpawner::new();
        spawner.push_script(Script::new().output("execing\n"));
        let (supervisor, _events) = start(&spawner);

        supervisor.connect(spec()).await.unwrap();
        drop(supervisor);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(spawner.termination_count(), 1);
    }

    /// Wraps a [`FakeSpawner`] and records how far away each read deadline was.
    #[derive(Clone)]
    struct DeadlineSpawner {
        inner: FakeSpawner,
        reads: Arc<std::sync::Mutex<Vec<Duration>>>,
    }

    impl DeadlineSpawner {
        fn new(inner: FakeSpawner) -> Self {
            Self {
                inner,
                reads: Arc::default(),
            }
        }

        fn reads(&self) -> Vec<Duration> {
            self.reads.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl Spawner for DeadlineSpawner {
        async fn spawn(
            &self,
            command: &CommandLine,
        ) -> tunneler_process::Result<Box<dyn SubprocessChannel>> {
            let inner = self.inner.spawn(command).await?;
            Ok(Box::new(DeadlineChannel {
                inner,
                reads: self.reads.clone(),
            }))
        }
    }

    struct DeadlineChannel {
        inner: Box<dyn SubprocessChannel>,
        reads: Arc<std::sync::Mutex<Vec<Duration>>>,
    }

    #[async_trait::async_trait]
    impl SubprocessChannel for DeadlineChannel {
        async fn read_chunk(&mut self, deadline: Instant) -> tunneler_process::Result<ReadOutcome> {
            self.reads
                .lock()
                .unwrap()
                .push(deadline.saturating_duration_since(Instant::now()));
            self.inner.read_chunk(deadline).await
        }

        async fn write_line(&mut self, text: &str) -> tunneler_process::Result<()> {
            self.inner.write_line(text).await
        }

        async fn terminate(&mut self) -> bool {
            self.inner.terminate().await
        }

        fn id(&self) -> Option<u32> {
            self.inner.id()
        }
    }

    fn start_recording(spawner: &DeadlineSpawner) -> (Supervisor, mpsc::UnboundedReceiver<TunnelEvent>) {
        let config = SupervisorConfig::new()
            .with_port_seed(1)
            .with_terminate_attempts(3, Duration::from_millis(10));
        Supervisor::start(config, Arc::new(spawner.clone()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_shortens_once_established() {
        let fake = FakeSpawner::new();
        fake.push_script(Script::new().output("execing\n").output("connection ok\n"));
        let spawner = DeadlineSpawner::new(fake);
        let (supervisor, _events) = start_recording(&spawner);

        supervisor.connect(spec()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(20)).await;

        // Launch and "execing" wait 30s; "connection ok" and each quiet
        // poll afterwards wait 15s.
        let secs = |s| Duration::from_secs(s);
        assert_eq!(spawner.reads(), vec![secs(30), secs(30), secs(15), secs(15)]);
        assert_eq!(supervisor.state(), ConnectionState::Connected);
        assert!(supervisor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_restarts_after_each_signal() {
        let fake = FakeSpawner::new();
        fake.push_script(Script::new().output("execing\n"));
        let spawner = DeadlineSpawner::new(fake);
        let (supervisor, _events) = start_recording(&spawner);

        supervisor.connect(spec()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(35)).await;

        // The quiet period at t=30s is a signal too, so a full 30s wait follows it.
        let secs = |s| Duration::from_secs(s);
        assert_eq!(spawner.reads(), vec![secs(30), secs(30), secs(30)]);
        assert_eq!(supervisor.state(), ConnectionState::Connecting);
        assert_eq!(spawner.inner.spawns().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_calls_after_shutdown_fail() {
        let spawner = FakeSpawner::new();
        let (supervisor, _events) = start(&spawner);
        let status = supervisor.watch_status();

        supervisor.shutdown().await.unwrap();
        assert!(status.has_changed().is_err());
    }
}
