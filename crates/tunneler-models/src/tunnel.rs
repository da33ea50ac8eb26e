//! Tunnel specification for a single connection attempt.

use std::fmt;
use std::path::{Path, PathBuf};

/// Default remote SSH port.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Default local SOCKS5 port.
pub const DEFAULT_SOCKS_PORT: u16 = 7070;

/// Immutable description of one tunnel attempt.
///
/// Remediation never mutates a spec in place; methods such as
/// [`TunnelSpec::with_monitor_port`] return an updated copy.
#[derive(Clone, PartialEq, Eq)]
pub struct TunnelSpec {
    host: String,
    port: u16,
    username: String,
    socks_port: u16,
    monitor_port: Option<u16>,
    identity_file: Option<PathBuf>,
    password: Option<String>,
    extra_args: Vec<String>,
}

impl TunnelSpec {
    /// Creates a spec for `username@host` with default ports.
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SSH_PORT,
            username: username.into(),
            socks_port: DEFAULT_SOCKS_PORT,
            monitor_port: None,
            identity_file: None,
            password: None,
            extra_args: Vec::new(),
        }
    }

    /// Sets the remote SSH port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the local SOCKS5 port.
    pub fn with_socks_port(mut self, port: u16) -> Self {
        self.socks_port = port;
        self
    }

    /// Returns a copy using the given monitor port.
    pub fn with_monitor_port(&self, port: u16) -> Self {
        Self {
            monitor_port: Some(port),
            ..self.clone()
        }
    }

    /// Sets the identity file. Blank paths are ignored.
    pub fn with_identity_file(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.identity_file = if path.as_os_str().is_empty() {
            None
        } else {
            Some(path)
        };
        self
    }

    /// Sets the password answered at a password prompt.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets extra arguments passed to the tunnel binary.
    pub fn with_extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn socks_port(&self) -> u16 {
        self.socks_port
    }

    pub fn monitor_port(&self) -> Option<u16> {
        self.monitor_port
    }

    pub fn identity_file(&self) -> Option<&Path> {
        self.identity_file.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn extra_args(&self) -> &[String] {
        &self.extra_args
    }

    /// Returns the `user@host` destination.
    pub fn destination(&self) -> String {
        format!("{}@{}", self.username, self.host)
    }

    /// Checks that the spec can be turned into a command line.
    ///
    /// Returns `Err(message)` describing the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("server address is empty".to_string());
        }
        if self.host.contains(char::is_whitespace) {
            return Err(format!("server address contains whitespace: {}", self.host));
        }
        if self.username.trim().is_empty() {
            return Err("username is empty".to_string());
        }
        if self.port == 0 {
            return Err("server port must be non-zero".to_string());
        }
        if self.socks_port == 0 {
            return Err("SOCKS5 port must be non-zero".to_string());
        }
        if self.monitor_port == Some(0) {
            return Err("monitor port must be non-zero".to_string());
        }
        Ok(())
    }
}

// The password must never reach logs.
impl fmt::Debug for TunnelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnelSpec")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("socks_port", &self.socks_port)
            .field("monitor_port", &self.monitor_port)
            .field("identity_file", &self.identity_file)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("extra_args", &self.extra_args)
            .finish()
    }
}
