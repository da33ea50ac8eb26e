//! Command handlers for CLI subcommands.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};
use tunneler_models::{ConnectionState, TunnelProfile, TunnelSpec};
use tunneler_persistence::ProfileStore;
use tunneler_process::PtySpawner;
use tunneler_runtime::{Supervisor, SupervisorConfig, TunnelEvent};

use crate::cli::{Commands, ConfigAction, ConnectArgs};
use crate::output::print_event;

/// Result type for command operations.
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Settings shared by every command.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory holding the profile and REPL history.
    pub state_dir: PathBuf,
    /// Supervisor configuration.
    pub config: SupervisorConfig,
    /// In-memory password.
    pub password: Option<String>,
}

/// Execute a CLI command.
pub fn execute(command: Commands, settings: &Settings) -> Result<()> {
    let store = ProfileStore::new(&settings.state_dir);

    match command {
        Commands::Connect(args) => cmd_connect(&store, &args, settings),
        Commands::Config { action } => cmd_config(&store, action),
        Commands::Repl => {
            // REPL is handled separately in main
            Ok(())
        }
    }
}

/// Builds the attempt spec from a profile, expanding `~` in the identity path.
pub fn build_spec(profile: &TunnelProfile, password: Option<&str>) -> TunnelSpec {
    let mut profile = profile.clone();
    if let Some(identity) = profile.identity_file.as_mut() {
        *identity = shellexpand::tilde(identity.as_str()).into_owned();
    }
    profile.to_spec(password)
}

/// Records a newly chosen monitor port in the saved profile.
pub fn remember_monitor_port(store: &ProfileStore, port: u16) {
    if let Err(e) = store.save_monitor_port(port) {
        warn!(port, error = %e, "failed to save monitor port");
    }
}

fn cmd_config(store: &ProfileStore, action: ConfigAction) -> Result<()> {
    let mut profile = store.load()?;

    match action {
        ConfigAction::Show => {
            print_profile(&profile);
            println!("  file:         {}", store.path().display());
        }
        ConfigAction::Set { key, value } => {
            profile.set(&key, &value)?;
            store.save(&profile)?;
            info!(key = %key, "profile updated");
            println!("Saved {} = {}", key, value);
        }
    }
    Ok(())
}

/// Prints the profile fields.
pub fn print_profile(profile: &TunnelProfile) {
    let or_none = |value: Option<String>| value.unwrap_or_else(|| "(none)".to_string());

    println!("  server:       {}", profile.server_address);
    println!("  port:         {}", profile.server_port);
    println!("  username:     {}", profile.username);
    println!("  socks_port:   {}", profile.socks_port);
    println!("  identity:     {}", or_none(profile.identity_file.clone()));
    println!("  optional:     {}", profile.optional_args);
    println!(
        "  monitor_port: {}",
        or_none(profile.monitor_port.map(|p| p.to_string()))
    );
    println!("  auto_connect: {}", profile.auto_connect);
}

fn cmd_connect(store: &ProfileStore, args: &ConnectArgs, settings: &Settings) -> Result<()> {
    let mut profile = store.load()?;
    args.apply(&mut profile);
    if args.save {
        store.save(&profile)?;
    }

    let spec = build_spec(&profile, settings.password.as_deref());
    spec.validate()
        .map_err(|e| format!("{} (set it with `tunneler config set` or a flag)", e))?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_foreground(settings.config.clone(), spec, store.clone()))
}

/// How a foreground session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ended {
    ByUser,
    ByTunnel,
}

async fn run_foreground(config: SupervisorConfig, spec: TunnelSpec, store: ProfileStore) -> Result<()> {
    let (supervisor, mut events) = Supervisor::start(config, Arc::new(PtySpawner::new()));
    info!(destination = %spec.destination(), "starting foreground session");
    supervisor.connect(spec).await?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let ended = loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    break Ended::ByTunnel;
                };
                if handle_event(&event, &store) {
                    break Ended::ByTunnel;
                }
            }
            _ = &mut ctrl_c => {
                supervisor.disconnect().await?;
                break Ended::ByUser;
            }
        }
    };

    supervisor.shutdown().await?;
    flush_events(&mut events, &store);

    match ended {
        Ended::ByUser => Ok(()),
        Ended::ByTunnel => Err("tunnel closed".into()),
    }
}

/// Prints and persists one event. Returns true once the tunnel is down.
fn handle_event(event: &TunnelEvent, store: &ProfileStore) -> bool {
    print_event(event);
    match event {
        TunnelEvent::MonitorPortChanged(port) => {
            remember_monitor_port(store, *port);
            false
        }
        TunnelEvent::StateChanged(state) => *state == ConnectionState::NotConnected,
        _ => false,
    }
}

fn flush_events(events: &mut UnboundedReceiver<TunnelEvent>, store: &ProfileStore) {
    while let Ok(event) = events.try_recv() {
        handle_event(&event, store);
    }
}
