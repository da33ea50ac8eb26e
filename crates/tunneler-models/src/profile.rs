//! Persisted tunnel profile.
//!
//! A profile is what a front-end remembers between runs. It never holds the
//! password; [`TunnelProfile::to_spec`] takes it separately.

use serde::{Deserialize, Serialize};

use crate::tunnel::{TunnelSpec, DEFAULT_SOCKS_PORT, DEFAULT_SSH_PORT};

/// Keys accepted by [`TunnelProfile::set`].
pub const PROFILE_KEYS: &[&str] = &[
    "server",
    "port",
    "username",
    "socks_port",
    "identity",
    "optional",
    "monitor_port",
    "auto_connect",
];

/// Saved connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelProfile {
    /// SSH server address.
    pub server_address: String,

    /// SSH server port.
    #[serde(default = "default_ssh_port")]
    pub server_port: u16,

    /// Login name on the server.
    pub username: String,

    /// Local SOCKS5 port to forward.
    #[serde(default = "default_socks_port")]
    pub socks_port: u16,

    /// Private key passed with `-i`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<String>,

    /// Extra arguments, whitespace separated.
    #[serde(default)]
    pub optional_args: String,

    /// Last monitor port that was chosen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor_port: Option<u16>,

    /// Connect as soon as the front-end starts.
    #[serde(default)]
    pub auto_connect: bool,
}

fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

fn default_socks_port() -> u16 {
    DEFAULT_SOCKS_PORT
}

impl Default for TunnelProfile {
    fn default() -> Self {
        Self {
            server_address: String::new(),
            server_port: DEFAULT_SSH_PORT,
            username: String::new(),
            socks_port: DEFAULT_SOCKS_PORT,
            identity_file: None,
            optional_args: String::new(),
            monitor_port: None,
            auto_connect: false,
        }
    }
}

impl TunnelProfile {
    /// Builds the spec for one attempt, attaching the in-memory password.
    pub fn to_spec(&self, password: Option<&str>) -> TunnelSpec {
        let mut spec = TunnelSpec::new(self.server_address.trim(), self.username.trim())
            .with_port(self.server_port)
            .with_socks_port(self.socks_port)
            .with_extra_args(self.optional_args.split_whitespace());

        if let Some(identity) = self.identity_file.as_deref().map(str::trim) {
            spec = spec.with_identity_file(identity);
        }
        if let Some(port) = self.monitor_port {
            spec = spec.with_monitor_port(port);
        }
        if let Some(password) = password.filter(|p| !p.is_empty()) {
            spec = spec.with_password(password);
        }
        spec
    }

    /// Updates one field from its textual form.
    ///
    /// Returns `Err(message)` for unknown keys or unparsable values.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        let value = value.trim();
        match key {
            "server" => self.server_address = value.to_string(),
            "port" => self.server_port = parse_port(key, value)?,
            "username" => self.username = value.to_string(),
            "socks_port" => self.socks_port = parse_port(key, value)?,
            "identity" => {
                self.identity_file = (!value.is_empty()).then(|| value.to_string());
            }
            "optional" => self.optional_args = value.to_string(),
            "monitor_port" => {
                self.monitor_port = if value.is_empty() {
                    None
                } else {
                    Some(parse_port(key, value)?)
                };
            }
            "auto_connect" => {
                self.auto_connect = match value.to_lowercase().as_str() {
                    "true" | "yes" | "on" | "1" => true,
                    "false" | "no" | "off" | "0" => false,
                    _ => return Err(format!("auto_connect expects true/false, got '{}'", value)),
                };
            }
            _ => {
                return Err(format!(
                    "unknown key '{}' (expected one of: {})",
                    key,
                    PROFILE_KEYS.join(", ")
                ))
            }
        }
        Ok(())
    }
}

fn parse_port(key: &str, value: &str) -> Result<u16, String> {
    match value.parse::<u16>() {
        Ok(0) | Err(_) => Err(format!("{} expects a port in 1-65535, got '{}'", key, value)),
        Ok(port) => Ok(port),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TunnelProfile {
        TunnelProfile {
            server_address: "example.org".to_string(),
            username: "alice".to_string(),
            ..TunnelProfile::default()
        }
    }

    #[test]
    fn test_default_ports() {
        let profile = TunnelProfile::default();
        assert_eq!(profile.server_port, 22);
        assert_eq!(profile.socks_port, 7070);
        assert!(!profile.auto_connect);
    }

    #[test]
    fn test_to_spec() {
        let mut profile = sample();
        profile.identity_file = Some("~/.ssh/id_rsa".to_string());
        profile.optional_args = "-C  -4".to_string();
        profile.monitor_port = Some(23456);

        let spec = profile.to_spec(Some("secret"));
        assert_eq!(spec.destination(), "alice@example.org");
        assert_eq!(spec.extra_args(), ["-C".to_string(), "-4".to_string()]);
        assert_eq!(spec.monitor_port(), Some(23456));
        assert_eq!(spec.password(), Some("secret"));
        assert!(spec.identity_file().is_some());
    }

    #[test]
    fn test_to_spec_ignores_empty_password() {
        let spec = sample().to_spec(Some(""));
        assert!(spec.password().is_none());
    }

    #[test]
    fn test_set_fields() {
        let mut profile = TunnelProfile::default();
        profile.set("server", " host.example ").unwrap();
        profile.set("port", "2222").unwrap();
        profile.set("socks_port", "1080").unwrap();
        profile.set("auto_connect", "yes").unwrap();
        profile.set("identity", "").unwrap();

        assert_eq!(profile.server_address, "host.example");
        assert_eq!(profile.server_port, 2222);
        assert_eq!(profile.socks_port, 1080);
        assert!(profile.auto_connect);
        assert!(profile.identity_file.is_none());
    }

    #[test]
    fn test_set_rejects_bad_values() {
        let mut profile = TunnelProfile::default();
        assert!(profile.set("port", "0").is_err());
        assert!(profile.set("port", "70000").is_err());
        assert!(profile.set("auto_connect", "maybe").is_err());
        assert!(profile.set("colour", "blue").unwrap_err().contains("unknown key"));
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let json = r#"{"server_address":"example.org","username":"alice"}"#;
        let profile: TunnelProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.server_port, 22);
        assert_eq!(profile.socks_port, 7070);
        assert_eq!(profile.optional_args, "");
    }
}
