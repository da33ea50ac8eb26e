//! Supervisor events.

use tunneler_models::ConnectionState;

/// Events emitted by the supervisor, in the order they happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelEvent {
    /// A message for the user.
    Log(String),
    /// The connection state was set (possibly to the same value).
    StateChanged(ConnectionState),
    /// The local SOCKS port could not be bound.
    PortConflict {
        /// The port that was busy.
        socks_port: u16,
    },
    /// A new monitor port was chosen.
    MonitorPortChanged(u16),
}

impl TunnelEvent {
    /// Creates a log event.
    pub fn log(message: impl Into<String>) -> Self {
        TunnelEvent::Log(message.into())
    }

    /// Returns the message of a log event.
    pub fn as_log(&self) -> Option<&str> {
        match self {
            TunnelEvent::Log(message) => Some(message),
            _ => None,
        }
    }

    /// Returns the new state of a state change.
    pub fn as_state(&self) -> Option<ConnectionState> {
        match self {
            TunnelEvent::StateChanged(state) => Some(*state),
            _ => None,
        }
    }
}
