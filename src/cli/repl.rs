//! Lightweight REPL (Read-Eval-Print-Loop) for maya-cli.
//!
//! Provides an interactive mode when no prompt is provided via `-e` or `-f`.
//! Supports minimal commands:
//! - `/quit`, `/exit`, `/q` - Exit the REPL
//! - `/new` - Start a new session (fresh session id, empty state)
//! - `/clear` - Clear the session state but keep the session id
//! - `/state` - Print the current session state as JSON
//!
//! Any other input is sent as a prompt to the game service.

use std::io::{self, BufRead, Write};

use anyhow::Result;

use super::bootstrap::CliContext;
use super::runner::execute_once;

/// REPL command variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    /// Exit the REPL
    Quit,
    /// Start over with a new session id
    New,
    /// Reset the session state
    Clear,
    /// Dump the session state
    State,
    /// Unknown command (will show help)
    Unknown(String),
    /// Regular prompt to send to the game service
    Prompt(String),
    /// Empty input (skip)
    Empty,
}

impl ReplCommand {
    /// Parse user input into a REPL command.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();

        if trimmed.is_empty() {
            return ReplCommand::Empty;
        }

        if trimmed.starts_with('/') {
            match trimmed.to_lowercase().as_str() {
                "/quit" | "/exit" | "/q" => ReplCommand::Quit,
                "/new" => ReplCommand::New,
                "/clear" => ReplCommand::Clear,
                "/state" => ReplCommand::State,
                _ => ReplCommand::Unknown(trimmed.to_string()),
            }
        } else {
            ReplCommand::Prompt(trimmed.to_string())
        }
    }
}

/// Run an interactive REPL session.
///
/// Returns when the user exits or on EOF (Ctrl+D).
pub async fn run_repl(ctx: &mut CliContext) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let interactive = atty::is(atty::Stream::Stdin);

    if interactive {
        eprintln!("maya-cli interactive mode");
        eprintln!("Session {}", ctx.conversation.session_id());
        eprintln!("Type /quit to exit, /new for a new session\n");
    }

    loop {
        if interactive {
            print!("> ");
            stdout.flush()?;
        }

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            // EOF (Ctrl+D)
            if interactive {
                eprintln!("\nGoodbye!");
            }
            break;
        }

        match ReplCommand::parse(&input) {
            ReplCommand::Empty => {
                continue;
            }
            ReplCommand::Quit => {
                eprintln!("Goodbye!");
                break;
            }
            ReplCommand::New => {
                ctx.new_conversation();
                eprintln!("New session {}", ctx.conversation.session_id());
            }
            ReplCommand::Clear => {
                ctx.store.clear();
                eprintln!("Session state cleared");
            }
            ReplCommand::State => {
                let json = ctx.store.read(|state| serde_json::to_string_pretty(state))?;
                println!("{}", json);
            }
            ReplCommand::Unknown(cmd) => {
                eprintln!("Unknown command: {}", cmd);
                eprintln!("Available: /quit, /exit, /q, /new, /clear, /state");
                continue;
            }
            ReplCommand::Prompt(prompt) => {
                if let Err(e) = execute_once(ctx, &prompt).await {
                    eprintln!("Error: {:#}", e);
                }

                println!(); // Blank line between interactions
            }
        }
    }

    Ok(())
}
