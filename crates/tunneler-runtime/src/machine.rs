//! Connection state machine.
//!
//! [`ConnectionStateMachine`] is a pure reducer: it turns [`Signal`]s into a
//! [`Step`] holding the events to publish (logs first, then the state change)
//! and the [`Action`] the supervisor must carry out. It never touches the
//! process itself, which keeps every transition testable without one.

use std::time::Duration;

use tracing::debug;
use tunneler_expect::{AuthFailure, Phase, Signal};
use tunneler_models::ConnectionState;

use crate::event::TunnelEvent;
use crate::retry::{RetryPolicy, RetryState};

/// What the supervisor must do after a signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Keep waiting for output.
    Continue,
    /// Write a line to the process, then keep waiting.
    Reply(&'static str),
    /// Write the stored password, then keep waiting.
    SendPassword,
    /// Terminate the process and spawn again after `delay`.
    Retry { delay: Duration },
    /// Terminate the process and spawn again now with a new monitor port.
    Respawn,
    /// Terminate the process and stop supervising.
    Stop,
}

impl Action {
    /// Returns true if the process must be terminated.
    pub fn ends_attempt(&self) -> bool {
        matches!(self, Action::Retry { .. } | Action::Respawn | Action::Stop)
    }
}

/// Outcome of feeding one signal to the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Events to publish, in order.
    pub events: Vec<TunnelEvent>,
    /// What to do next.
    pub action: Action,
}

/// Facts about the spawn being supervised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptInfo {
    /// Monitor port passed to the wrapper.
    pub monitor_port: u16,
    /// Local SOCKS port.
    pub socks_port: u16,
    /// Whether a password is available for prompts.
    pub has_password: bool,
}

#[derive(Debug, Clone)]
struct Attempt {
    info: AttemptInfo,
    phase: Phase,
    established: bool,
    password_sent: bool,
    host_key_prompts: u32,
}

impl Attempt {
    fn new(info: AttemptInfo) -> Self {
        Self {
            info,
            phase: Phase::Primary,
            established: false,
            password_sent: false,
            host_key_prompts: 0,
        }
    }
}

/// Tracks connection state and decides how to react to signals.
#[derive(Debug, Clone)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
    retry: RetryState,
    policy: RetryPolicy,
    host_key_limit: u32,
    attempt: Option<Attempt>,
}

impl ConnectionStateMachine {
    /// Creates an idle machine.
    pub fn new(policy: RetryPolicy, host_key_limit: u32) -> Self {
        Self {
            state: ConnectionState::NotConnected,
            retry: RetryState::new(),
            policy,
            host_key_limit,
            attempt: None,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive recoverable failures since the last healthy link.
    pub fn failures(&self) -> u32 {
        self.retry.failures()
    }

    /// Table phase for the next wait.
    pub fn phase(&self) -> Phase {
        self.attempt.as_ref().map_or(Phase::Primary, |a| a.phase)
    }

    /// Whether the current spawn has reported a healthy link.
    pub fn is_established(&self) -> bool {
        self.attempt.as_ref().is_some_and(|a| a.established)
    }

    /// Starts supervising a fresh spawn.
    pub fn begin_attempt(&mut self, info: AttemptInfo) -> Vec<TunnelEvent> {
        self.attempt = Some(Attempt::new(info));
        vec![self.transition(ConnectionState::Connecting)]
    }

    /// Reacts to one signal.
    pub fn handle(&mut self, signal: Signal) -> Step {
        let Some(attempt) = self.attempt.as_mut() else {
            debug!(%signal, "signal without an attempt");
            return Step {
                events: Vec::new(),
                action: Action::Continue,
            };
        };

        // The secondary table covers a single wait after the password.
        let phase = std::mem::take(&mut attempt.phase);
        if !matches!(signal, Signal::HostKeyUnknown | Signal::Timeout) {
            attempt.host_key_prompts = 0;
        }
        debug!(%signal, ?phase, "handling signal");

        match signal {
            Signal::Timeout => self.keep_waiting(Vec::new()),
            Signal::Launching => self.keep_waiting(vec![TunnelEvent::log("Connecting...")]),
            Signal::ConnectionOk => {
                self.retry.reset();
                let mut events = Vec::new();
                if !attempt.established {
                    attempt.established = true;
                    events.push(TunnelEvent::log("Connection is established"));
                }
                events.push(self.transition(ConnectionState::Connected));
                Step {
                    events,
                    action: Action::Continue,
                }
            }
            Signal::HostKeyUnknown => {
                attempt.host_key_prompts += 1;
                if attempt.host_key_prompts > self.host_key_limit {
                    let limit = self.host_key_limit;
                    return self.stop(vec![format!(
                        "Host key prompt repeated more than {} times; giving up",
                        limit
                    )]);
                }
                self.reply(
                    vec![TunnelEvent::log("Please check server's fingerprint")],
                    "yes",
                )
            }
            Signal::PasswordPrompt => {
                if !attempt.info.has_password {
                    return self.stop(vec!["Password is required but none was given".into()]);
                }
                if attempt.password_sent {
                    return self.stop(vec![auth_message(AuthFailure::Password).into()]);
                }
                attempt.password_sent = true;
                attempt.phase = Phase::Secondary;
                Step {
                    events: vec![TunnelEvent::log("Password is sent")],
                    action: Action::SendPassword,
                }
            }
            Signal::ProcessExited => self.stop(vec!["Process terminated".into()]),
            Signal::AuthDenied(reason) => self.stop(vec![auth_message(reason).into()]),
            Signal::ListenPortBusy => {
                let socks_port = attempt.info.socks_port;
                let mut step = self.stop(vec![format!("Cannot listen SOCKS5 port at {}", socks_port)]);
                let at = step.events.len() - 1;
                step.events.insert(at, TunnelEvent::PortConflict { socks_port });
                step
            }
            Signal::AddressInUse if phase == Phase::Primary => {
                let port = attempt.info.monitor_port;
                Step {
                    events: vec![TunnelEvent::log(format!(
                        "Bad luck: monitor port {} is already in use",
                        port
                    ))],
                    action: Action::Respawn,
                }
            }
            Signal::HostUnreachable => self.retry_later("Cannot reach the server"),
            Signal::Restarting | Signal::AddressInUse => {
                self.retry_later("Connection is down. Please wait for reconnecting")
            }
        }
    }

    /// Ends the attempt after a failure outside the signal stream.
    pub fn fail(&mut self, message: impl Into<String>) -> Step {
        self.stop(vec![message.into()])
    }

    /// Ends supervision at the user's request.
    ///
    /// Returns no events if nothing was being supervised.
    pub fn disconnect(&mut self) -> Vec<TunnelEvent> {
        self.attempt = None;
        if self.state == ConnectionState::NotConnected {
            return Vec::new();
        }
        vec![self.transition(ConnectionState::NotConnected)]
    }

    fn keep_waiting(&self, events: Vec<TunnelEvent>) -> Step {
        Step {
            events,
            action: Action::Continue,
        }
    }

    fn reply(&self, events: Vec<TunnelEvent>, line: &'static str) -> Step {
        Step {
            events,
            action: Action::Reply(line),
        }
    }

    fn retry_later(&mut self, reason: &str) -> Step {
        let delay = self.retry.record_failure(&self.policy);
        self.attempt = None;
        Step {
            events: vec![
                TunnelEvent::log(reason),
                TunnelEvent::log(format!("Retrying in {} seconds", delay.as_secs())),
                self.transition(ConnectionState::Connecting),
            ],
            action: Action::Retry { delay },
        }
    }

    fn stop(&mut self, messages: Vec<String>) -> Step {
        self.attempt = None;
        let mut events: Vec<TunnelEvent> = messages.into_iter().map(TunnelEvent::Log).collect();
        if self.state != ConnectionState::NotConnected {
            events.push(self.transition(ConnectionState::NotConnected));
        }
        Step {
            events,
            action: Action::Stop,
        }
    }

    fn transition(&mut self, state: ConnectionState) -> TunnelEvent {
        if self.state != state {
            debug!(from = %self.state, to = %state, "state transition");
        }
        self.state = state;
        TunnelEvent::StateChanged(state)
    }
}

fn auth_message(reason: AuthFailure) -> &'static str {
    match reason {
        AuthFailure::PublicKey => "Permission denied; Is your private key correct?",
        AuthFailure::Password => "Permission denied; Is your password correct?",
    }
}
