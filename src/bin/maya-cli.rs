//! Maya CLI - headless interface for the Maya game service
//!
//! # Usage
//!
//! ```bash
//! # Build the CLI binary
//! cargo build --features cli --no-default-features --bin maya-cli
//!
//! # Create a game and publish it
//! ./target/debug/maya-cli -e "make a breakout game" --publish -o game.html
//!
//! # JSON output for scripting
//! ./target/debug/maya-cli -e "make a memory game" --json | jq .type
//!
//! # Text -> image -> 3D model
//! ./target/debug/maya-cli --model "a wooden treasure chest" --backend hunyuan3d-2
//!
//! # Local game backend (requires the `server` feature)
//! ./target/debug/maya-cli --server --port 8000
//!
//! # Interactive REPL mode (when no -e or -f provided)
//! ./target/debug/maya-cli
//! ```

use anyhow::Result;
use clap::Parser;

use maya_lib::cli::{execute_batch, execute_once, initialize, run_model, run_repl, Args, Mode};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut ctx = initialize(&args).await?;

    let result = match args.mode() {
        Mode::Server => serve(&ctx).await,
        Mode::Model(prompt) => run_model(&ctx, &prompt).await,
        Mode::Execute(prompt) => execute_once(&mut ctx, &prompt).await.map(|_| ()),
        Mode::Batch(file) => execute_batch(&mut ctx, &file).await,
        Mode::Interactive => run_repl(&mut ctx).await,
    };

    // Graceful shutdown
    ctx.shutdown().await?;

    result
}

#[cfg(feature = "server")]
async fn serve(ctx: &maya_lib::cli::CliContext) -> Result<()> {
    maya_lib::cli::run_server(ctx).await
}

#[cfg(not(feature = "server"))]
async fn serve(_ctx: &maya_lib::cli::CliContext) -> Result<()> {
    anyhow::bail!("maya-cli was built without the `server` feature")
}
