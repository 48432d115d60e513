//! CLI module for headless Maya operation.
//!
//! Every mode shares one bootstrap and one output renderer:
//!
//! ```text
//! +-----------+     +-----------------+     +--------------+     +-----------+
//! | GameClient| --> | run_generation  | --> | SessionStore | --> | output.rs |
//! | (SSE)     |     | (cancel, effects|     | (reducer)    |     | (print/   |
//! +-----------+     +-----------------+     +--------------+     |  JSON)    |
//!                                                                +-----------+
//! ```
//!
//! `--model` runs the 3D asset pipeline instead and `--server` serves the
//! local game backend (feature `server`).
//!
//! # REPL Mode
//!
//! When no prompt is provided via `-e` or `-f`, the CLI enters
//! interactive REPL mode. See `repl.rs` for details.

mod args;
mod bootstrap;
mod output;
mod repl;
mod runner;
#[cfg(feature = "server")]
pub mod server;

pub use args::{Args, Mode};
pub use bootstrap::{initialize, CliContext};
pub use output::{render_event, render_summary, OutputMode};
pub use repl::run_repl;
pub use runner::{execute_batch, execute_once, run_model};
#[cfg(feature = "server")]
pub use runner::run_server;
