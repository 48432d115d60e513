//! CLI output handling.
//!
//! Renders each session event as it arrives and a summary once a request
//! finishes. Three modes: terminal (human readable, stderr for progress and
//! stdout for chat text), JSON lines, and quiet (summary only).

use std::io::{self, Write};

use anyhow::Result;
use serde::Serialize;

use crate::session::parse::extract_command_text;
use crate::session::{AgentStatus, SessionEvent, SessionState};
use crate::transport::RunOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputMode {
    pub json: bool,
    pub quiet: bool,
}

/// Render one event together with the state it produced.
pub fn render_event(event: &SessionEvent, state: &SessionState, mode: OutputMode) -> Result<()> {
    if mode.json {
        // JSON mode: one event per line in wire form
        println!("{}", serde_json::to_string(event)?);
        io::stdout().flush()?;
    } else if !mode.quiet {
        render_event_terminal(event, state)?;
    }
    Ok(())
}

fn render_event_terminal(event: &SessionEvent, state: &SessionState) -> Result<()> {
    match event {
        SessionEvent::Status(_) => {
            eprintln!("[status] {}", state.status.tip);
        }
        SessionEvent::Chunk(text) => {
            print!("{}", text);
            io::stdout().flush()?;
        }
        SessionEvent::CodeChunk(_) => {
            // Progress ticks only make sense on a terminal
            if atty::is(atty::Stream::Stderr) {
                eprint!(".");
                io::stderr().flush()?;
            }
        }
        SessionEvent::Command(command) => {
            eprintln!("[step] {}", extract_command_text(command));
        }
        SessionEvent::Explanation(text) | SessionEvent::Features(text) => {
            eprintln!("[info] {}", truncate(text.trim(), 120));
        }
        SessionEvent::Suggestions(_) => {
            if !state.suggestions.is_empty() {
                eprintln!("\n[suggestions]");
                for suggestion in &state.suggestions {
                    eprintln!("  - {}", suggestion);
                }
            }
        }
        SessionEvent::Code(code) => {
            eprintln!(
                "\n[code] html {} bytes, css {} bytes, js {} bytes",
                code.html.len(),
                code.css.len(),
                code.js.len()
            );
        }
        SessionEvent::Error(message) => {
            eprintln!("\nError: {}", message);
        }
        SessionEvent::PublishStatus(status) => {
            eprintln!("[publish] {}...", status.trim());
        }
        SessionEvent::PublishSuccess(success) => {
            eprintln!("[publish] Live at {}", success.live_url);
        }
        SessionEvent::PublishError(kind) => {
            let guidance = state.publisher.message.as_deref().unwrap_or_default();
            eprintln!("[publish] Failed ({}): {}", kind, guidance);
        }
        SessionEvent::PublishMessage(text) => {
            eprintln!("[publish] {}", text);
        }
        SessionEvent::AssetSessionStart(start) => {
            eprintln!(
                "[assets] Generating {} asset(s): {}",
                start.total_assets,
                start.categories.join(", ")
            );
        }
        SessionEvent::AssetGenerating(progress) => {
            eprintln!("[assets] {} ({})", progress.category, progress.status);
        }
        SessionEvent::AssetCompleted(done) => {
            let location = state
                .preview_url_for(&done.filename)
                .unwrap_or_else(|| done.storage_url.clone());
            eprintln!("[assets] {} ready: {}", done.category, location);
        }
        SessionEvent::AssetSessionComplete(done) => {
            eprintln!(
                "[assets] {}/{} generated ({})",
                done.total_generated, done.total_requested, done.status
            );
        }
        SessionEvent::AssetError(error) => {
            let label = if error.critical { "error" } else { "warning" };
            eprintln!("[assets] {}: {}", label, error.error);
        }
        SessionEvent::StreamComplete => {}
    }
    Ok(())
}

#[derive(Serialize)]
struct Summary<'a> {
    r#type: &'static str,
    outcome: RunOutcome,
    state: &'a SessionState,
    agents: crate::session::AgentPanel,
}

/// Render the end-of-request summary.
///
/// In quiet terminal mode this is the only output, so it carries the final
/// chat text as well.
pub fn render_summary(state: &SessionState, outcome: RunOutcome, mode: OutputMode) -> Result<()> {
    if mode.json {
        let summary = Summary {
            r#type: "summary",
            outcome,
            state,
            agents: state.agents(),
        };
        println!("{}", serde_json::to_string(&summary)?);
        io::stdout().flush()?;
        return Ok(());
    }

    if mode.quiet {
        if !state.transcript.is_empty() {
            println!("{}", state.transcript.trim_end());
        }
    } else {
        // End the streamed chat text
        println!();
    }

    if outcome == RunOutcome::Cancelled {
        eprintln!("[done] Cancelled");
        return Ok(());
    }

    eprintln!("[done] Generation: {:?}", state.generation_status);
    if let Some(error) = &state.last_error {
        eprintln!("[done] Error: {}", error);
    }
    if let Some(code) = &state.code {
        eprintln!("[done] Game code: {} bytes", code.html.len() + code.css.len() + code.js.len());
    }
    if let Some(url) = &state.publisher.live_url {
        eprintln!("[done] Live URL: {}", url);
    }
    if !state.assets.items.is_empty() {
        eprintln!("[done] Assets: {}", state.assets.items.len());
    }

    if !mode.quiet {
        for agent in state.agents().agents {
            if agent.status == AgentStatus::Idle {
                continue;
            }
            eprintln!(
                "[agent] {} {:?}{}",
                agent.name,
                agent.status,
                agent
                    .current_task
                    .or(agent.last_activity)
                    .map(|task| format!(": {}", task))
                    .unwrap_or_default()
            );
        }
    }

    Ok(())
}

/// Truncate a string to a maximum length.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
