//! Terminal front end for the chat widget core.
//!
//! This binary opens a session against the portfolio assistant backend and
//! runs a REPL on top of it, printing every transcript turn as it arrives.
//!
//! # Usage
//!
//! ```bash
//! # Connect using CHATLINK_* environment variables or localhost defaults
//! chatlink
//!
//! # Point at a specific backend
//! chatlink --api-url https://api.example.com --ws-url wss://api.example.com
//!
//! # Show the HTML each turn renders to
//! chatlink --html
//!
//! # No backend at all
//! chatlink --offline
//! ```
//!
//! # Commands
//!
//! - `/help` - Show available commands
//! - `/clear` - Start a new session
//! - `/mode` - Show the active transport
//! - `/dump [file]` - Write the transcript as JSON
//! - `/quit` - Exit the application

use std::sync::Arc;

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::Notify;

use chatlink::chat::{
    ChatArgs, ChatCommand, ChatSession, SessionConfig, SessionObserver, help_text, parse_command,
};
use chatlink::connection::{
    ConnectionManager, ConnectionState, ScriptedConnector, ScriptedFallback,
};
use chatlink::utils::time::clock;
use chatlink::{Action, Role, Turn};

const ANSI_DIM: &str = "\x1b[2m";
const ANSI_RESET: &str = "\x1b[0m";
const ANSI_CYAN: &str = "\x1b[36m";
const ANSI_GREEN: &str = "\x1b[32m";
const ANSI_RED: &str = "\x1b[31m";
const ANSI_MAGENTA: &str = "\x1b[35m";

/// Prints transcript turns to stdout.
struct TerminalObserver {
    use_color: bool,
    html: bool,
}

impl TerminalObserver {
    fn paint(&self, color: &str, text: &str) -> String {
        if self.use_color {
            format!("{color}{text}{ANSI_RESET}")
        } else {
            text.to_string()
        }
    }
}

impl SessionObserver for TerminalObserver {
    fn on_connection_state(&mut self, state: ConnectionState) {
        if state == ConnectionState::Fallback {
            println!("{}", self.paint(ANSI_DIM, "(using HTTP fallback)"));
        }
    }

    fn on_turn(&mut self, turn: &Turn) {
        let (label, color) = match turn.role() {
            // the user just typed it
            Role::User => return,
            Role::Assistant => ("Assistant", ANSI_GREEN),
            Role::System => ("Assistant", ANSI_CYAN),
            Role::Error => ("Error", ANSI_RED),
        };
        let body = if self.html {
            turn.rendered().as_str()
        } else {
            turn.content()
        };
        let stamp = self.paint(ANSI_DIM, &format!("[{}]", clock(turn.timestamp())));
        println!("{stamp} {}", self.paint(color, &format!("{label}:")));
        for line in body.lines() {
            println!("    {line}");
        }
    }

    fn on_actions(&mut self, actions: &[Action]) {
        for action in actions {
            let text = match action.navigation_target() {
                Some(section) => format!("-> navigate to #{section}"),
                None => format!("-> {} action", action.kind),
            };
            println!("    {}", self.paint(ANSI_MAGENTA, &text));
        }
    }
}

/// Main entry point for the chatlink application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, _) = ChatArgs::from_command_line_relaxed("chatlink [OPTIONS]");
    let use_color = !args.no_color;
    let html = args.html;
    let offline = args.offline;
    let config = SessionConfig::try_from(args)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let session = if offline {
        let manager = ConnectionManager::new(
            Arc::new(ScriptedConnector::refusing()),
            Arc::new(ScriptedFallback::echo()),
        );
        ChatSession::new(manager, config)
    } else {
        ChatSession::network(config)?
    };
    let mut session = session.with_observer(TerminalObserver { use_color, html });
    let mut rl = DefaultEditor::new()?;

    // Ctrl+C while a reply is outstanding abandons it
    let interrupt = Arc::new(Notify::new());
    let interrupt_handler = Arc::clone(&interrupt);
    ctrlc::set_handler(move || {
        interrupt_handler.notify_waiters();
    })?;

    let opened = session.open().await?;
    if let Some(reason) = opened.downgrade_reason {
        tracing::info!(%reason, "live channel unavailable");
    }
    println!("Type /help for commands, /quit to exit\n");

    loop {
        let readline = rl.readline("You: ");

        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                if let Some(cmd) = parse_command(line) {
                    match cmd {
                        ChatCommand::Quit => {
                            println!("Goodbye!");
                            break;
                        }
                        ChatCommand::Clear => match session.reset().await {
                            Ok(_) => print_info(use_color, "Started a new session."),
                            Err(err) => print_error(use_color, &err.to_string()),
                        },
                        ChatCommand::Help => {
                            for line in help_text().lines() {
                                println!("    {}", line);
                            }
                        }
                        ChatCommand::Mode => {
                            print_info(
                                use_color,
                                &format!(
                                    "transport: {} (connection {}, session {})",
                                    session.channel_mode(),
                                    session.connection_state(),
                                    session.state()
                                ),
                            );
                        }
                        ChatCommand::History => print_history(&session),
                        ChatCommand::Dump(path) => dump_transcript(&session, path, use_color),
                        ChatCommand::Health => match session.health().await {
                            Ok(status) if status.healthy => print_info(
                                use_color,
                                &format!("backend healthy ({})", status.status_code),
                            ),
                            Ok(status) => print_error(
                                use_color,
                                &format!("backend unhealthy ({})", status.status_code),
                            ),
                            Err(err) => print_error(use_color, &err.to_string()),
                        },
                        ChatCommand::Markdown(on) => {
                            session.set_markdown(on);
                            if on {
                                print_info(use_color, "Rendering markdown.");
                            } else {
                                print_info(use_color, "Rendering escaped text.");
                            }
                        }
                        ChatCommand::Invalid(message) => {
                            print_error(use_color, &message);
                        }
                    }
                    continue;
                }

                if let Err(err) = session.submit(line).await {
                    // visible failures already reached the transcript
                    if !err.is_user_visible() {
                        print_error(use_color, &err.to_string());
                    }
                    continue;
                }
                let interrupted = tokio::select! {
                    // failures are already in the transcript
                    _ = session.await_reply() => false,
                    _ = interrupt.notified() => true,
                };
                if interrupted && session.cancel_reply() {
                    print_info(use_color, "Stopped waiting for the reply.");
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                print_error(use_color, &format!("Input error: {}", err));
                break;
            }
        }
    }

    session.close().await;
    Ok(())
}

fn print_info(use_color: bool, text: &str) {
    if use_color {
        println!("{ANSI_DIM}{text}{ANSI_RESET}");
    } else {
        println!("{text}");
    }
}

fn print_error(use_color: bool, text: &str) {
    if use_color {
        eprintln!("{ANSI_RED}{text}{ANSI_RESET}");
    } else {
        eprintln!("{text}");
    }
}

fn print_history(session: &ChatSession) {
    let history = session.history();
    if history.is_empty() {
        println!("    History: (empty)");
        return;
    }
    println!("    History ({} exchanges):", history.len());
    for entry in history.iter() {
        println!("      you: {}", entry.user);
        println!("      assistant: {}", entry.assistant);
    }
}

fn dump_transcript(session: &ChatSession, path: Option<String>, use_color: bool) {
    match write_transcript(session, path.as_deref()) {
        Ok(()) => {
            if let Some(path) = path {
                print_info(use_color, &format!("Transcript saved to {path}"));
            }
        }
        Err(err) => print_error(use_color, &format!("Failed to dump transcript: {err}")),
    }
}

fn write_transcript(session: &ChatSession, path: Option<&str>) -> chatlink::Result<()> {
    let turns: Vec<&Turn> = session.transcript().all().collect();
    let json = serde_json::to_string_pretty(&turns)?;
    match path {
        Some(path) => std::fs::write(path, json)?,
        None => println!("{json}"),
    }
    Ok(())
}
