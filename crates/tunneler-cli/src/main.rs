//! Tunneler CLI entry point.

use clap::Parser;
use tracing::warn;
use tracing_subscriber::{fmt, EnvFilter};

use tunneler_cli::cli::{Cli, Commands};
use tunneler_cli::commands::{self, Settings};
use tunneler_cli::repl::Repl;
use tunneler_process::PtySpawner;

fn main() {
    // Load .env.local if it exists (for TUNNELER_PASSWORD etc.)
    let _ = dotenvy::from_filename(".env.local");

    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level().to_string()));

    fmt().with_env_filter(filter).with_target(false).init();

    let settings = Settings {
        state_dir: cli.state_dir(),
        config: cli.supervisor_config(),
        password: cli.password().map(str::to_string),
    };

    if !PtySpawner::is_available(&settings.config.program) {
        warn!(program = %settings.config.program, "tunnel program not found in PATH");
    }

    // Handle command or enter REPL
    let result = match cli.command {
        Some(Commands::Repl) | None => run_repl(&settings),
        Some(cmd) => commands::execute(cmd, &settings),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run_repl(settings: &Settings) -> commands::Result<()> {
    let mut repl = Repl::new(settings)?;
    repl.run()
}
