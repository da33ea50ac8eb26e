//! Connection supervisor for Tunneler.
//!
//! This crate keeps an `autossh` tunnel alive on behalf of an interactive
//! client:
//! - `Supervisor` - worker task that spawns the wrapper, watches its output
//!   and reacts to what it sees
//! - `ConnectionStateMachine` - pure reducer from output signals to state
//!   changes, log lines and remediation actions
//! - `RetryPolicy` / `PortAllocator` - backoff delays and monitor port choice
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tunneler_models::TunnelSpec;
//! use tunneler_process::PtySpawner;
//! use tunneler_runtime::{Supervisor, SupervisorConfig, TunnelEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (supervisor, mut events) =
//!         Supervisor::start(SupervisorConfig::default(), Arc::new(PtySpawner::new()));
//!
//!     supervisor.connect(TunnelSpec::new("example.org", "alice")).await?;
//!
//!     tokio::spawn(async move {
//!         while let Some(event) = events.recv().await {
//!             if let TunnelEvent::Log(message) = event {
//!                 println!("{}", message);
//!             }
//!         }
//!     });
//!
//!     tokio::signal::ctrl_c().await?;
//!     supervisor.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Reactions
//!
//! - `connection ok` marks the tunnel connected and clears the failure count
//! - unreachable host and wrapper restarts back off (5s, 5s, 10s, 20s, 60s)
//!   and spawn again
//! - a busy monitor port spawns again at once with a different port
//! - host key prompts are answered `yes`, password prompts with the stored
//!   password (once per spawn)
//! - rejected credentials, a busy SOCKS port or an exited process end the
//!   session

pub mod config;
pub mod error;
pub mod event;
pub mod launch;
pub mod machine;
pub mod port;
pub mod retry;
pub mod supervisor;

pub use config::SupervisorConfig;
pub use error::{Result, SupervisorError};
pub use event::TunnelEvent;
pub use launch::launch_command;
pub use machine::{Action, AttemptInfo, ConnectionStateMachine, Step};
pub use port::{PortAllocator, MONITOR_PORT_RANGE};
pub use retry::{RetryPolicy, RetryState};
pub use supervisor::{ConnectOutcome, Supervisor, SupervisorStatus};
