//! CLI execution runner.
//!
//! Streams prompts through the game service, runs the 3D pipeline, or
//! serves the local backend.

use std::path::Path;

use anyhow::{Context, Result};
use futures::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;

use crate::pipeline::AssetPipeline;
use crate::session::GenerationStatus;
use crate::transport::{run_generation, RunOutcome};

use super::bootstrap::CliContext;
use super::output::{render_event, render_summary, truncate, OutputMode};

/// Prompt sent after a successful generation when `--publish` is set.
const PUBLISH_PROMPT: &str = "publish my game";

fn output_mode(ctx: &CliContext) -> OutputMode {
    OutputMode {
        json: ctx.args.json,
        quiet: ctx.args.quiet,
    }
}

/// Send one prompt and wait for its stream to finish.
///
/// Ctrl+C cancels the in-flight request and resets the session state.
pub async fn execute_once(ctx: &mut CliContext, prompt: &str) -> Result<RunOutcome> {
    let outcome = stream_prompt(ctx, prompt).await?;

    let generated = ctx.store.read(|s| s.generation_status == GenerationStatus::Completed);
    if outcome == RunOutcome::Completed && generated {
        if let Some(path) = ctx.args.output.clone() {
            write_game(ctx, &path).await?;
        }
        if ctx.args.publish {
            return stream_prompt(ctx, PUBLISH_PROMPT).await;
        }
    }

    Ok(outcome)
}

async fn stream_prompt(ctx: &CliContext, prompt: &str) -> Result<RunOutcome> {
    let mode = output_mode(ctx);
    let request = ctx.conversation.request(prompt);

    // A fresh token per request, so one Ctrl+C only stops this request
    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_cancel.cancel();
        }
    });

    let mut render_error = None;
    let result = run_generation(&ctx.client, &ctx.store, &request, &cancel, |event, state| {
        if render_error.is_none() {
            render_error = render_event(event, state, mode).err();
        }
    })
    .await;
    ctrl_c.abort();

    let outcome = result.context("Request to the game service failed")?;
    if let Some(e) = render_error {
        tracing::warn!("Output error: {}", e);
    }

    ctx.store
        .read(|state| render_summary(state, outcome, mode))?;
    Ok(outcome)
}

async fn write_game(ctx: &CliContext, path: &Path) -> Result<()> {
    let Some(code) = ctx.store.read(|s| s.code.clone()) else {
        return Ok(());
    };
    tokio::fs::write(path, &code.html)
        .await
        .with_context(|| format!("Failed to write game to {}", path.display()))?;
    if !ctx.args.quiet {
        eprintln!("[output] Game written to {}", path.display());
    }
    Ok(())
}

/// Execute prompts from a file, one per line.
///
/// Each non-empty, non-comment line is executed sequentially.
/// Lines starting with `#` are treated as comments.
/// Execution stops on the first error or cancellation.
pub async fn execute_batch(ctx: &mut CliContext, file_path: &Path) -> Result<()> {
    let content = tokio::fs::read_to_string(file_path)
        .await
        .with_context(|| format!("Failed to read prompt file: {}", file_path.display()))?;

    let prompts = parse_prompts(&content);
    if prompts.is_empty() {
        anyhow::bail!("No prompts found in file: {}", file_path.display());
    }

    let total = prompts.len();
    if !ctx.args.quiet {
        eprintln!(
            "[batch] Executing {} prompt(s) from {}",
            total,
            file_path.display()
        );
    }

    for (i, prompt) in prompts.iter().enumerate() {
        if !ctx.args.quiet {
            eprintln!(
                "\n[batch] [{}/{}] Executing: {}",
                i + 1,
                total,
                truncate(prompt, 50)
            );
        }

        if execute_once(ctx, prompt).await? == RunOutcome::Cancelled {
            eprintln!("[batch] Cancelled at prompt {}/{}", i + 1, total);
            return Ok(());
        }

        if !ctx.args.quiet {
            eprintln!("[batch] [{}/{}] Complete", i + 1, total);
        }
    }

    if !ctx.args.quiet {
        eprintln!("\n[batch] All {} prompt(s) completed successfully", total);
    }

    Ok(())
}

fn parse_prompts(content: &str) -> Vec<&str> {
    content
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
}

/// Run the text -> image -> 3D pipeline once.
pub async fn run_model(ctx: &CliContext, prompt: &str) -> Result<()> {
    let pipeline = AssetPipeline::from_settings(&ctx.settings.pipeline)
        .await
        .context("Failed to start the 3D pipeline")?;

    if !ctx.args.quiet && !ctx.args.json {
        eprintln!(
            "[model] Backend: {} (artifacts in {})",
            pipeline.backend().label(),
            pipeline.store().root().display()
        );
    }

    // Announce artifacts as the pipeline writes them
    let json = ctx.args.json;
    let quiet = ctx.args.quiet;
    let mut changes = BroadcastStream::new(pipeline.store().subscribe());
    let notifier = tokio::spawn(async move {
        while let Some(change) = changes.next().await {
            let Ok(change) = change else { continue };
            if json {
                if let Ok(line) = serde_json::to_string(&change) {
                    println!("{}", line);
                }
            } else if !quiet {
                eprintln!("[model] Saved {:?}: {}", change.kind, change.path.display());
            }
        }
    });

    let result = tokio::select! {
        run = pipeline.run(prompt) => Some(run),
        _ = tokio::signal::ctrl_c() => None,
    };
    notifier.abort();

    let Some(run) = result else {
        eprintln!("[model] Cancelled");
        return Ok(());
    };
    let run = run.context("3D pipeline failed")?;

    if json {
        println!("{}", serde_json::to_string(&run)?);
    } else {
        match &run.artifacts.mesh {
            Some(mesh) => println!("{}", mesh.display()),
            None => eprintln!("[model] No mesh produced"),
        }
    }
    Ok(())
}

/// Serve the local game backend until Ctrl+C.
#[cfg(feature = "server")]
pub async fn run_server(ctx: &CliContext) -> Result<()> {
    use super::server::{start_server, ServerConfig};

    let config = ServerConfig::from_settings(&ctx.settings);
    let (addr, shutdown) = start_server(ctx.settings.server.port, config).await?;
    eprintln!("[server] Listening on http://{}", addr);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    eprintln!("[server] Shutting down");
    shutdown.cancel();
    Ok(())
}
