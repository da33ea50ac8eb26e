//! Wrapper command line.

use tunneler_models::{TunnelSpec, DEFAULT_SSH_PORT};
use tunneler_process::CommandLine;

use crate::config::SupervisorConfig;

/// Builds the wrapper invocation for `spec` with the given monitor port.
///
/// `<program> -M <monitor> -TnN -D <socks> [-i <identity>] [-p <port>] [extra...] user@host`
///
/// The password never appears in the command line.
pub fn launch_command(config: &SupervisorConfig, spec: &TunnelSpec, monitor_port: u16) -> CommandLine {
    let mut command = CommandLine::new(&config.program)
        .args(["-M".to_string(), monitor_port.to_string(), "-TnN".to_string()])
        .args(["-D".to_string(), spec.socks_port().to_string()]);

    if let Some(identity) = spec.identity_file() {
        command = command.arg("-i").arg(identity.to_string_lossy());
    }
    if spec.port() != DEFAULT_SSH_PORT {
        command = command.arg("-p").arg(spec.port().to_string());
    }

    command = command.args(spec.extra_args().iter().cloned());
    command = command.arg(spec.destination());

    for (key, value) in &config.env {
        command = command.env(key, value);
    }
    command
}
