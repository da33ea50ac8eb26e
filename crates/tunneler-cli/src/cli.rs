//! Command-line interface definition using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tunneler_models::TunnelProfile;
use tunneler_runtime::SupervisorConfig;

/// Version string with git hash and build date, e.g. "0.1.0 (abc1234, 2026-10-18)".
fn version_string() -> &'static str {
    static VERSION_STRING: std::sync::OnceLock<String> = std::sync::OnceLock::new();
    VERSION_STRING.get_or_init(|| {
        format!(
            "{} ({}, {})",
            env!("CARGO_PKG_VERSION"),
            env!("GIT_HASH"),
            env!("BUILD_DATE")
        )
    })
}

/// Tunneler - keeps an autossh SOCKS5 tunnel alive
#[derive(Parser, Debug)]
#[command(name = "tunneler")]
#[command(author, version = version_string(), about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to state directory
    #[arg(short, long, env = "TUNNELER_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Tunnel wrapper executable
    #[arg(long, env = "TUNNELER_AUTOSSH", default_value = "autossh", global = true)]
    pub autossh: String,

    /// Password for password authentication (kept in memory only)
    #[arg(long, env = "TUNNELER_PASSWORD", hide_env_values = true, global = true)]
    pub password: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect in the foreground until Ctrl-C
    Connect(ConnectArgs),

    /// Show or change the saved profile
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Start interactive REPL mode
    Repl,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigAction {
    /// Print the saved profile
    Show,
    /// Change one profile field
    Set {
        /// Field name (server, port, username, socks_port, identity, optional,
        /// monitor_port, auto_connect)
        key: String,
        /// New value (empty clears optional fields)
        value: String,
    },
}

/// Overrides applied on top of the saved profile.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectArgs {
    /// SSH server address
    #[arg(long)]
    pub server: Option<String>,

    /// SSH server port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Login name
    #[arg(short, long)]
    pub username: Option<String>,

    /// Local SOCKS5 port
    #[arg(short = 'D', long)]
    pub socks_port: Option<u16>,

    /// Private key file
    #[arg(short, long)]
    pub identity: Option<String>,

    /// Extra ssh arguments, whitespace separated
    #[arg(short, long, allow_hyphen_values = true)]
    pub optional: Option<String>,

    /// Write the overrides back to the saved profile
    #[arg(long)]
    pub save: bool,
}

impl ConnectArgs {
    /// Applies the overrides to `profile`.
    pub fn apply(&self, profile: &mut TunnelProfile) {
        if let Some(server) = &self.server {
            profile.server_address = server.clone();
        }
        if let Some(port) = self.port {
            profile.server_port = port;
        }
        if let Some(username) = &self.username {
            profile.username = username.clone();
        }
        if let Some(socks_port) = self.socks_port {
            profile.socks_port = socks_port;
        }
        if let Some(identity) = &self.identity {
            profile.identity_file = (!identity.trim().is_empty()).then(|| identity.clone());
        }
        if let Some(optional) = &self.optional {
            profile.optional_args = optional.clone();
        }
    }
}

impl Cli {
    /// Returns the state directory path, using default if not specified.
    pub fn state_dir(&self) -> PathBuf {
        match &self.state_dir {
            Some(dir) => PathBuf::from(shellexpand::tilde(&dir.to_string_lossy()).as_ref()),
            None => dirs::home_dir()
                .map(|h| h.join(".tunneler"))
                .unwrap_or_else(|| PathBuf::from(".tunneler")),
        }
    }

    /// Returns the log level based on verbosity.
    pub fn log_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }

    /// Builds the supervisor configuration.
    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig::new().with_program(shellexpand::tilde(&self.autossh).into_owned())
    }

    /// The in-memory password, ignoring an empty value.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }
}
