//! Connection state reported by the supervisor.

use std::fmt;

/// State of the supervised tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No tunnel process is being supervised.
    #[default]
    NotConnected,
    /// A tunnel process is running but has not reported a healthy link yet.
    Connecting,
    /// The tunnel process reported a healthy link.
    Connected,
}

impl ConnectionState {
    /// Returns true while a tunnel process is being supervised.
    pub fn is_active(&self) -> bool {
        !matches!(self, ConnectionState::NotConnected)
    }

    /// Returns a human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::NotConnected => "Not Connected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
