//! Signals recognized in the tunnel wrapper's output.

use std::fmt;
use std::sync::OnceLock;

use crate::pattern::PatternTable;

/// Which credential the server rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthFailure {
    PublicKey,
    Password,
}

/// A typed event derived from process output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// Nothing matched before the deadline.
    Timeout,
    /// ssh could not reach the server.
    HostUnreachable,
    /// The server rejected our credentials.
    AuthDenied(AuthFailure),
    /// ssh asks whether to trust an unknown host key.
    HostKeyUnknown,
    /// ssh asks for a password.
    PasswordPrompt,
    /// The output stream closed.
    ProcessExited,
    /// The wrapper is starting ssh.
    Launching,
    /// The wrapper's monitor loop saw the tunnel working.
    ConnectionOk,
    /// The wrapper is restarting ssh.
    Restarting,
    /// The local SOCKS port could not be bound.
    ListenPortBusy,
    /// The wrapper's monitor port could not be bound.
    AddressInUse,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Signal::Timeout => "timeout",
            Signal::HostUnreachable => "host unreachable",
            Signal::AuthDenied(AuthFailure::PublicKey) => "public key denied",
            Signal::AuthDenied(AuthFailure::Password) => "password denied",
            Signal::HostKeyUnknown => "host key unknown",
            Signal::PasswordPrompt => "password prompt",
            Signal::ProcessExited => "process exited",
            Signal::Launching => "launching",
            Signal::ConnectionOk => "connection ok",
            Signal::Restarting => "restarting",
            Signal::ListenPortBusy => "listen port busy",
            Signal::AddressInUse => "address in use",
        };
        f.write_str(name)
    }
}

/// Which table the expect loop is scanning with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Before a password was sent.
    #[default]
    Primary,
    /// After a password was sent.
    Secondary,
}

impl Phase {
    /// Returns the table used in this phase.
    pub fn table(self) -> &'static PatternTable<Signal> {
        match self {
            Phase::Primary => primary_table(),
            Phase::Secondary => secondary_table(),
        }
    }
}

/// Returns the table used until a password is sent.
pub fn primary_table() -> &'static PatternTable<Signal> {
    static TABLE: OnceLock<PatternTable<Signal>> = OnceLock::new();
    TABLE.get_or_init(|| {
        PatternTable::new()
            .timeout(Signal::Timeout)
            .literal(Signal::HostUnreachable, "ssh: connect to host")
            .literal(
                Signal::AuthDenied(AuthFailure::PublicKey),
                "Permission denied (publickey)",
            )
            .literal(Signal::HostKeyUnknown, "The authenticity of host")
            .literal(Signal::PasswordPrompt, "s password: ")
            .eof(Signal::ProcessExited)
            .literal(Signal::Launching, "execing")
            .literal(Signal::ConnectionOk, "connection ok")
            .literal(Signal::Restarting, "restarting ssh")
            .literal(
                Signal::ListenPortBusy,
                "channel_setup_fwd_listener: cannot listen to port",
            )
            .literal(Signal::AddressInUse, "Address already in use")
    })
}

/// Returns the table used after a password was sent.
pub fn secondary_table() -> &'static PatternTable<Signal> {
    static TABLE: OnceLock<PatternTable<Signal>> = OnceLock::new();
    TABLE.get_or_init(|| {
        PatternTable::new()
            .timeout(Signal::Timeout)
            .literal(Signal::AuthDenied(AuthFailure::Password), "Permission denied")
            .literal(Signal::HostUnreachable, "ssh: connect to host")
            .eof(Signal::ProcessExited)
            .literal(Signal::ConnectionOk, "connection ok")
    })
}
