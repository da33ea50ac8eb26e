//! Supervisor configuration.

use std::ops::RangeInclusive;
use std::time::Duration;

use crate::port::MONITOR_PORT_RANGE;
use crate::retry::RetryPolicy;

/// Configuration for a [`Supervisor`](crate::Supervisor).
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Tunnel wrapper executable.
    pub program: String,
    /// Environment added to the wrapper's process.
    pub env: Vec<(String, String)>,
    /// Wait bound while a fresh spawn has not reported a healthy link.
    pub negotiate_timeout: Duration,
    /// Wait bound once the spawn reported a healthy link.
    pub poll_timeout: Duration,
    /// Backoff delays after recoverable failures.
    pub retry: RetryPolicy,
    /// Consecutive host key prompts tolerated per spawn.
    pub host_key_limit: u32,
    /// Termination attempts before giving up on a process.
    pub terminate_attempts: u32,
    /// Pause between termination attempts.
    pub terminate_interval: Duration,
    /// Range monitor ports are drawn from.
    pub monitor_ports: RangeInclusive<u16>,
    /// Fixed seed for monitor port selection.
    pub port_seed: Option<u64>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            program: "autossh".to_string(),
            env: default_env(),
            negotiate_timeout: Duration::from_secs(30),
            poll_timeout: Duration::from_secs(15),
            retry: RetryPolicy::default(),
            host_key_limit: 3,
            terminate_attempts: 100,
            terminate_interval: Duration::from_millis(100),
            monitor_ports: MONITOR_PORT_RANGE,
            port_seed: None,
        }
    }
}

/// Debug output on, first poll after 10s, no gate time, poll every 30s.
fn default_env() -> Vec<(String, String)> {
    [
        ("AUTOSSH_DEBUG", "1"),
        ("AUTOSSH_FIRST_POLL", "10"),
        ("AUTOSSH_GATETIME", "0"),
        ("AUTOSSH_POLL", "30"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl SupervisorConfig {
    /// Creates a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the wrapper executable.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Sets (or replaces) one wrapper environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.env.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.env.push((key, value)),
        }
        self
    }

    /// Sets the negotiation timeout.
    pub fn with_negotiate_timeout(mut self, timeout: Duration) -> Self {
        self.negotiate_timeout = timeout;
        self
    }

    /// Sets the poll timeout.
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Sets the backoff policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the host key prompt limit.
    pub fn with_host_key_limit(mut self, limit: u32) -> Self {
        self.host_key_limit = limit;
        self
    }

    /// Sets termination retries.
    pub fn with_terminate_attempts(mut self, attempts: u32, interval: Duration) -> Self {
        self.terminate_attempts = attempts.max(1);
        self.terminate_interval = interval;
        self
    }

    /// Sets the monitor port range.
    pub fn with_monitor_ports(mut self, range: RangeInclusive<u16>) -> Self {
        self.monitor_ports = range;
        self
    }

    /// Fixes the monitor port seed.
    pub fn with_port_seed(mut self, seed: u64) -> Self {
        self.port_seed = Some(seed);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SupervisorConfig::default();

        assert_eq!(config.program, "autossh");
        assert_eq!(config.negotiate_timeout, Duration::from_secs(30));
        assert_eq!(config.poll_timeout, Duration::from_secs(15));
        assert_eq!(config.host_key_limit, 3);
        assert_eq!(config.monitor_ports, 10000..=32767);
        assert_eq!(config.env.len(), 4);
        assert!(config
            .env
            .contains(&("AUTOSSH_GATETIME".to_string(), "0".to_string())));
    }

    #[test]
    fn test_config_builder() {
        let config = SupervisorConfig::new()
            .with_program("/opt/bin/autossh")
            .with_env("AUTOSSH_POLL", "60")
            .with_env("AUTOSSH_PATH", "/usr/bin/ssh")
            .with_poll_timeout(Duration::from_secs(5))
            .with_host_key_limit(1)
            .with_terminate_attempts(0, Duration::from_millis(10))
            .with_port_seed(9);

        assert_eq!(config.program, "/opt/bin/autossh");
        assert_eq!(config.env.len(), 5);
        assert!(config
            .env
            .contains(&("AUTOSSH_POLL".to_string(), "60".to_string())));
        assert_eq!(config.poll_timeout, Duration::from_secs(5));
        assert_eq!(config.host_key_limit, 1);
        assert_eq!(config.terminate_attempts, 1);
        assert_eq!(config.port_seed, Some(9));
    }
}
