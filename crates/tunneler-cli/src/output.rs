//! Rendering of supervisor events for the terminal.

use chrono::{DateTime, Local, TimeZone};
use tunneler_runtime::TunnelEvent;

/// Prefixes `message` with a timestamp such as `[October 18, 14:03:22]`.
pub fn format_log_line<Tz: TimeZone>(at: &DateTime<Tz>, message: &str) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("[{}] {}", at.format("%B %d, %H:%M:%S"), message)
}

/// Text shown for an event, if any.
pub fn render_event(event: &TunnelEvent) -> Option<String> {
    match event {
        TunnelEvent::Log(message) => Some(message.clone()),
        TunnelEvent::StateChanged(state) => Some(format!("Status: {}", state.label())),
        TunnelEvent::PortConflict { socks_port } => Some(format!(
            "SOCKS5 port {} is busy; pick another with `config set socks_port <port>`",
            socks_port
        )),
        TunnelEvent::MonitorPortChanged(_) => None,
    }
}

/// Prints an event with the current local time.
pub fn print_event(event: &TunnelEvent) {
    if let Some(text) = render_event(event) {
        println!("{}", format_log_line(&Local::now(), &text));
    }
}
