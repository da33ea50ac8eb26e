//! Interactive REPL (Read-Eval-Print Loop) for Tunneler.

use std::path::PathBuf;
use std::sync::Arc;

use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, warn};
use tunneler_models::PROFILE_KEYS;
use tunneler_persistence::ProfileStore;
use tunneler_process::PtySpawner;
use tunneler_runtime::{ConnectOutcome, Supervisor, SupervisorConfig, TunnelEvent};

use crate::commands::{build_spec, print_profile, remember_monitor_port, Result, Settings};
use crate::output::print_event;

/// Help information for a command.
pub struct CommandHelp {
    /// Command name (e.g., "connect").
    pub name: &'static str,
    /// Command aliases (e.g., ["c"]).
    pub aliases: &'static [&'static str],
    /// Brief one-line description.
    pub brief: &'static str,
    /// Detailed description.
    pub description: &'static str,
    /// Usage syntax.
    pub usage: &'static str,
    /// Examples with descriptions.
    pub examples: &'static [(&'static str, &'static str)],
}

/// Static help entries for all commands.
static COMMAND_HELP: &[CommandHelp] = &[
    CommandHelp {
        name: "connect",
        aliases: &["c"],
        brief: "Start or stop the tunnel",
        description: "Starts the tunnel with the saved profile. If the tunnel is already \
                      connecting or connected, it is stopped instead.",
        usage: "/connect",
        examples: &[
            ("/connect", "Start the tunnel"),
            ("/c", "Same as /connect"),
        ],
    },
    CommandHelp {
        name: "disconnect",
        aliases: &["dc"],
        brief: "Stop the tunnel",
        description: "Stops the tunnel and cancels any pending reconnect. Does nothing when idle.",
        usage: "/disconnect",
        examples: &[("/disconnect", "Stop the tunnel")],
    },
    CommandHelp {
        name: "status",
        aliases: &["s"],
        brief: "Show tunnel status",
        description: "Shows the connection state, the destination, the monitor port and the \
                      number of consecutive failures.",
        usage: "/status",
        examples: &[("/status", "Show tunnel status")],
    },
    CommandHelp {
        name: "password",
        aliases: &["pw"],
        brief: "Set or clear the password",
        description: "Sets the password answered to the server's password prompt. The password \
                      is kept in memory only and never written to history or disk.",
        usage: "/password [value]",
        examples: &[
            ("/password hunter2", "Use 'hunter2' for the next connection"),
            ("/password", "Forget the password"),
        ],
    },
    CommandHelp {
        name: "set",
        aliases: &[],
        brief: "Change a profile field",
        description: "Changes one field of the saved profile. Keys: server, port, username, \
                      socks_port, identity, optional, monitor_port, auto_connect. An empty value \
                      clears optional fields.",
        usage: "/set <key> <value>",
        examples: &[
            ("/set server example.org", "Set the server address"),
            ("/set optional -o ServerAliveInterval=10", "Pass extra ssh arguments"),
        ],
    },
    CommandHelp {
        name: "show",
        aliases: &["config"],
        brief: "Show the saved profile",
        description: "Prints every field of the saved profile.",
        usage: "/show",
        examples: &[("/show", "Show the saved profile")],
    },
    CommandHelp {
        name: "help",
        aliases: &["h", "?"],
        brief: "Show help",
        description: "Shows help for all commands or detailed help for a specific command.",
        usage: "/help [command]",
        examples: &[
            ("/help", "Show all commands"),
            ("/help set", "Show detailed help for /set"),
        ],
    },
    CommandHelp {
        name: "quit",
        aliases: &["q", "exit"],
        brief: "Exit the REPL",
        description: "Stops the tunnel and exits. History is saved automatically.",
        usage: "/quit",
        examples: &[("/quit", "Exit the REPL")],
    },
];

/// Tab completion for slash commands.
struct CommandCompleter;

impl CommandCompleter {
    const COMMANDS: &'static [&'static str] = &[
        "/connect", "/disconnect", "/help", "/password", "/quit", "/set", "/show", "/status",
    ];

    fn complete_key(prefix: &str, start: usize) -> (usize, Vec<Pair>) {
        let matches = PROFILE_KEYS
            .iter()
            .filter(|key| key.starts_with(prefix))
            .map(|key| Pair {
                display: key.to_string(),
                replacement: key.to_string(),
            })
            .collect();
        (start, matches)
    }
}

impl Completer for CommandCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        if !line.starts_with('/') {
            return Ok((0, vec![]));
        }

        let prefix = &line[..pos];

        if let Some(key) = prefix.strip_prefix("/set ") {
            if !key.contains(' ') {
                return Ok(Self::complete_key(key, "/set ".len()));
            }
            return Ok((0, vec![]));
        }

        let matches: Vec<Pair> = Self::COMMANDS
            .iter()
            .filter(|cmd| cmd.starts_with(prefix))
            .map(|cmd| Pair {
                display: cmd.to_string(),
                replacement: cmd.to_string(),
            })
            .collect();

        Ok((0, matches))
    }
}

impl Hinter for CommandCompleter {
    type Hint = String;
}

impl Highlighter for CommandCompleter {}
impl Validator for CommandCompleter {}
impl Helper for CommandCompleter {}

/// Slash commands available in the REPL.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    /// Start the tunnel, or stop it if active
    Connect,
    /// Stop the tunnel
    Disconnect,
    /// Show tunnel status
    Status,
    /// Set (Some) or clear (None) the in-memory password
    Password(Option<String>),
    /// Change one profile field
    Set { key: String, value: String },
    /// Print the saved profile
    Show,
    /// Show help (optionally for a specific command)
    Help(Option<String>),
    /// Quit the REPL
    Quit,
    /// Unknown command or usage error
    Unknown(String),
    /// Blank line
    Empty,
}

impl ReplCommand {
    /// Parses input into a REPL command.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();

        if input.is_empty() {
            return ReplCommand::Empty;
        }

        let Some(stripped) = input.strip_prefix('/') else {
            return Self::parse_bare(input);
        };

        let parts: Vec<&str> = stripped.splitn(2, ' ').collect();
        let cmd = parts[0].to_lowercase();
        let arg = parts
            .get(1)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        match cmd.as_str() {
            "connect" | "c" => ReplCommand::Connect,
            "disconnect" | "dc" => ReplCommand::Disconnect,
            "status" | "s" => ReplCommand::Status,
            "password" | "pw" => ReplCommand::Password(arg),
            "set" => Self::parse_set(arg),
            "show" | "config" => ReplCommand::Show,
            "help" | "h" | "?" => ReplCommand::Help(arg),
            "quit" | "q" | "exit" => ReplCommand::Quit,
            _ => ReplCommand::Unknown(cmd),
        }
    }

    /// Accepts a few commands without the leading slash.
    fn parse_bare(input: &str) -> Self {
        match input.to_lowercase().as_str() {
            "connect" => ReplCommand::Connect,
            "disconnect" => ReplCommand::Disconnect,
            "status" => ReplCommand::Status,
            "help" | "?" => ReplCommand::Help(None),
            "quit" | "exit" | "bye" => ReplCommand::Quit,
            _ => ReplCommand::Unknown(input.to_string()),
        }
    }

    fn parse_set(arg: Option<String>) -> Self {
        let Some(arg) = arg else {
            return ReplCommand::Unknown("set requires: /set <key> <value>".to_string());
        };

        let mut parts = arg.splitn(2, ' ');
        let key = parts.next().unwrap_or_default().to_lowercase();
        let value = parts.next().map(str::trim).unwrap_or_default().to_string();
        ReplCommand::Set { key, value }
    }

    /// Whether the raw line may be stored in history.
    fn is_secret(&self) -> bool {
        matches!(self, ReplCommand::Password(Some(_)))
    }
}

/// REPL state
pub struct Repl {
    editor: Editor<CommandCompleter, DefaultHistory>,
    store: ProfileStore,
    password: Option<String>,
    supervisor: Option<Supervisor>,
    history_path: Option<PathBuf>,
    runtime: tokio::runtime::Runtime,
}

impl Repl {
    /// Creates a new REPL instance.
    pub fn new(settings: &Settings) -> Result<Self> {
        let config = rustyline::Config::builder()
            .completion_type(rustyline::CompletionType::List)
            .auto_add_history(false)
            .build();
        let mut editor = Editor::with_config(config)?;
        editor.set_helper(Some(CommandCompleter));
        let store = ProfileStore::new(&settings.state_dir);

        let runtime = tokio::runtime::Runtime::new()?;
        let supervisor = Self::start_supervisor(&runtime, settings.config.clone(), &store);

        let history_path = settings.state_dir.join("repl_history.txt");
        if history_path.exists() {
            let _ = editor.load_history(&history_path);
        }

        Ok(Self {
            editor,
            store,
            password: settings.password.clone(),
            supervisor: Some(supervisor),
            history_path: Some(history_path),
            runtime,
        })
    }

    fn start_supervisor(
        runtime: &tokio::runtime::Runtime,
        config: SupervisorConfig,
        store: &ProfileStore,
    ) -> Supervisor {
        let _guard = runtime.enter();
        let (supervisor, events) = Supervisor::start(config, Arc::new(PtySpawner::new()));
        runtime.spawn(forward_events(events, store.clone()));
        supervisor
    }

    /// Runs the REPL loop.
    pub fn run(&mut self) -> Result<()> {
        println!("Tunneler REPL v{}", env!("CARGO_PKG_VERSION"));
        println!("Type /help for commands, /quit to exit");
        println!();

        match self.store.load() {
            Ok(profile) if profile.auto_connect => {
                if let Err(e) = self.connect() {
                    eprintln!("Error: {}", e);
                }
            }
            Ok(_) => {}
            Err(e) => eprintln!("Error: {}", e),
        }

        loop {
            let prompt = self.prompt();

            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let cmd = ReplCommand::parse(&line);
                    if !cmd.is_secret() && cmd != ReplCommand::Empty {
                        self.editor.add_history_entry(&line)?;
                    }
                    debug!(command = ?cmd.redacted(), "parsed command");

                    match self.handle_command(cmd) {
                        Ok(true) => break, // Quit requested
                        Ok(false) => {}
                        Err(e) => eprintln!("Error: {}", e),
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                }
                Err(ReadlineError::Eof) => {
                    println!("^D");
                    break;
                }
                Err(err) => {
                    eprintln!("Error: {:?}", err);
                    break;
                }
            }
        }

        if let Some(path) = &self.history_path {
            let _ = self.editor.save_history(path);
        }

        self.close();
        println!("Goodbye!");
        Ok(())
    }

    fn prompt(&self) -> String {
        let state = self
            .supervisor
            .as_ref()
            .map(|s| s.state())
            .unwrap_or_default();
        if state.is_active() {
            format!("tunneler [{}]> ", state.label())
        } else {
            "tunneler> ".to_string()
        }
    }

    /// Handles a REPL command. Returns Ok(true) if should quit.
    fn handle_command(&mut self, cmd: ReplCommand) -> Result<bool> {
        match cmd {
            ReplCommand::Connect => self.connect()?,
            ReplCommand::Disconnect => {
                let supervisor = self.supervisor()?;
                self.runtime.block_on(supervisor.disconnect())?;
            }
            ReplCommand::Status => self.print_status()?,
            ReplCommand::Password(password) => {
                match &password {
                    Some(_) => println!("Password set (kept in memory only)."),
                    None => println!("Password cleared."),
                }
                self.password = password;
            }
            ReplCommand::Set { key, value } => {
                let mut profile = self.store.load()?;
                profile.set(&key, &value)?;
                self.store.save(&profile)?;
                println!("Saved {} = {}", key, value);
            }
            ReplCommand::Show => {
                let profile = self.store.load()?;
                print_profile(&profile);
            }
            ReplCommand::Help(topic) => print_help(topic.as_deref()),
            ReplCommand::Quit => return Ok(true),
            ReplCommand::Unknown(cmd) => {
                println!("Unknown command: {}. Type /help for available commands.", cmd);
            }
            ReplCommand::Empty => {}
        }
        Ok(false)
    }

    fn supervisor(&self) -> Result<&Supervisor> {
        self.supervisor
            .as_ref()
            .ok_or_else(|| "supervisor is not running".into())
    }

    fn connect(&self) -> Result<()> {
        let profile = self.store.load()?;
        let spec = build_spec(&profile, self.password.as_deref());
        let supervisor = self.supervisor()?;

        if !supervisor.state().is_active() {
            spec.validate()?;
        }

        match self.runtime.block_on(supervisor.connect(spec))? {
            ConnectOutcome::Started => debug!("tunnel started"),
            ConnectOutcome::Stopped => println!("Tunnel stopped."),
        }
        Ok(())
    }

    fn print_status(&self) -> Result<()> {
        let status = self.supervisor()?.status();
        let profile = self.store.load()?;

        println!("  state:        {}", status.state);
        if !profile.server_address.is_empty() {
            println!(
                "  destination:  {}@{}:{}",
                profile.username, profile.server_address, profile.server_port
            );
            println!("  socks5:       127.0.0.1:{}", profile.socks_port);
        }
        if let Some(port) = status.monitor_port {
            println!("  monitor_port: {}", port);
        }
        if status.consecutive_failures > 0 {
            println!("  failures:     {}", status.consecutive_failures);
        }
        println!(
            "  password:     {}",
            if self.password.is_some() { "set" } else { "not set" }
        );
        Ok(())
    }

    /// Stops the tunnel and the supervisor worker.
    fn close(&mut self) {
        let Some(supervisor) = self.supervisor.take() else {
            return;
        };
        if let Err(e) = self.runtime.block_on(supervisor.shutdown()) {
            warn!(error = %e, "supervisor shutdown failed");
        }
    }
}

impl Drop for Repl {
    fn drop(&mut self) {
        self.close();
    }
}

impl ReplCommand {
    /// Copy safe to log.
    fn redacted(&self) -> ReplCommand {
        match self {
            ReplCommand::Password(Some(_)) => ReplCommand::Password(Some("***".to_string())),
            other => other.clone(),
        }
    }
}

/// Prints and persists supervisor events until the supervisor stops.
async fn forward_events(mut events: UnboundedReceiver<TunnelEvent>, store: ProfileStore) {
    while let Some(event) = events.recv().await {
        print_event(&event);
        if let TunnelEvent::MonitorPortChanged(port) = event {
            remember_monitor_port(&store, port);
        }
    }
    debug!("event feed closed");
}

/// Finds help for a command by name or alias.
fn find_command_help(name: &str) -> Option<&'static CommandHelp> {
    let name_lower = name.trim_start_matches('/').to_lowercase();
    COMMAND_HELP
        .iter()
        .find(|h| h.name == name_lower || h.aliases.contains(&name_lower.as_str()))
}

/// Prints help information.
fn print_help(topic: Option<&str>) {
    match topic {
        Some(cmd) => {
            if let Some(help) = find_command_help(cmd) {
                println!("/{} - {}", help.name, help.brief);
                if !help.aliases.is_empty() {
                    println!("Aliases: {}", help.aliases.join(", "));
                }
                println!();
                println!("{}", help.description);
                println!();
                println!("Usage:");
                for line in help.usage.lines() {
                    println!("  {}", line);
                }
                if !help.examples.is_empty() {
                    println!();
                    println!("Examples:");
                    for (example, desc) in help.examples {
                        println!("  {}  # {}", example, desc);
                    }
                }
            } else {
                println!(
                    "Unknown command: {}. Type /help for available commands.",
                    cmd
                );
            }
        }
        None => {
            println!("Commands:");
            for help in COMMAND_HELP {
                println!("  /{:<12} {}", help.name, help.brief);
            }
            println!();
            println!("Type /help <command> for details.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_slash_commands() {
        assert_eq!(ReplCommand::parse("/connect"), ReplCommand::Connect);
        assert_eq!(ReplCommand::parse("/c"), ReplCommand::Connect);
        assert_eq!(ReplCommand::parse("/dc"), ReplCommand::Disconnect);
        assert_eq!(ReplCommand::parse("/s"), ReplCommand::Status);
        assert_eq!(ReplCommand::parse("/show"), ReplCommand::Show);
        assert_eq!(ReplCommand::parse("/config"), ReplCommand::Show);
        assert_eq!(ReplCommand::parse("/q"), ReplCommand::Quit);
        assert_eq!(ReplCommand::parse("/EXIT"), ReplCommand::Quit);
        assert_eq!(ReplCommand::parse("   "), ReplCommand::Empty);
    }

    #[test]
    fn test_parse_help_topic() {
        assert_eq!(ReplCommand::parse("/help"), ReplCommand::Help(None));
        assert_eq!(
            ReplCommand::parse("/? set"),
            ReplCommand::Help(Some("set".to_string()))
        );
    }

    #[test]
    fn test_parse_password() {
        assert_eq!(
            ReplCommand::parse("/password hunter2"),
            ReplCommand::Password(Some("hunter2".to_string()))
        );
        assert_eq!(ReplCommand::parse("/pw"), ReplCommand::Password(None));
        assert!(ReplCommand::parse("/pw secret").is_secret());
        assert!(!ReplCommand::parse("/pw").is_secret());
    }

    #[test]
    fn test_redacted_hides_password() {
        let cmd = ReplCommand::parse("/password hunter2");
        assert!(!format!("{:?}", cmd.redacted()).contains("hunter2"));
        assert_eq!(ReplCommand::Status.redacted(), ReplCommand::Status);
    }

    #[test]
    fn test_parse_set_keeps_value_spaces() {
        assert_eq!(
            ReplCommand::parse("/set optional -o ServerAliveInterval=10 -C"),
            ReplCommand::Set {
                key: "optional".to_string(),
                value: "-o ServerAliveInterval=10 -C".to_string(),
            }
        );
        assert_eq!(
            ReplCommand::parse("/set identity"),
            ReplCommand::Set {
                key: "identity".to_string(),
                value: String::new(),
            }
        );
        assert!(matches!(ReplCommand::parse("/set"), ReplCommand::Unknown(_)));
    }

    #[test]
    fn test_parse_bare_words() {
        assert_eq!(ReplCommand::parse("connect"), ReplCommand::Connect);
        assert_eq!(ReplCommand::parse("bye"), ReplCommand::Quit);
        assert_eq!(
            ReplCommand::parse("hello"),
            ReplCommand::Unknown("hello".to_string())
        );
        assert_eq!(
            ReplCommand::parse("/frobnicate"),
            ReplCommand::Unknown("frobnicate".to_string())
        );
    }

    #[test]
    fn test_find_command_help() {
        assert_eq!(find_command_help("c").map(|h| h.name), Some("connect"));
        assert_eq!(find_command_help("/set").map(|h| h.name), Some("set"));
        assert!(find_command_help("nope").is_none());
    }

    #[test]
    fn test_help_covers_every_command() {
        for cmd in CommandCompleter::COMMANDS {
            assert!(find_command_help(cmd).is_some(), "no help for {}", cmd);
        }
    }

    #[test]
    fn test_completer_matches_prefix() {
        let completer = CommandCompleter;
        let history = rustyline::history::DefaultHistory::new();
        let ctx = rustyline::Context::new(&history);

        let (pos, matches) = completer.complete("/con", 4, &ctx).unwrap();
        assert_eq!(pos, 0);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].replacement, "/connect");
    }

    #[test]
    fn test_completer_multiple_matches() {
        let completer = CommandCompleter;
        let history = rustyline::history::DefaultHistory::new();
        let ctx = rustyline::Context::new(&history);

        let (_, matches) = completer.complete("/s", 2, &ctx).unwrap();
        let replacements: Vec<&str> = matches.iter().map(|m| m.replacement.as_str()).collect();
        assert_eq!(replacements, vec!["/set", "/show", "/status"]);
    }

    #[test]
    fn test_completer_profile_keys() {
        let completer = CommandCompleter;
        let history = rustyline::history::DefaultHistory::new();
        let ctx = rustyline::Context::new(&history);

        let (pos, matches) = completer.complete("/set so", 7, &ctx).unwrap();
        assert_eq!(pos, 5);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].replacement, "socks_port");
    }

    #[test]
    fn test_completer_non_slash_ignored() {
        let completer = CommandCompleter;
        let history = rustyline::history::DefaultHistory::new();
        let ctx = rustyline::Context::new(&history);

        let (_, matches) = completer.complete("con", 3, &ctx).unwrap();
        assert!(matches.is_empty());
    }
}
