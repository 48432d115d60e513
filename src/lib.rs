//! Maya game-session core.
//!
//! - [`session`]: folds server-pushed events into one session state
//! - [`transport`]: SSE client for the game service
//! - [`retry`]: wait-time aware retry executor with per-operation logs
//! - [`pipeline`]: text -> image -> 3D asset pipeline over model spaces
//! - [`rate_limit`]: per-client request limits
//! - [`settings`]: `~/.maya/settings.toml`
//!
//! The `cli` feature adds the `maya-cli` surface and the `server` feature
//! the local HTTP/SSE game backend.

pub mod error;
pub mod pipeline;
pub mod rate_limit;
pub mod retry;
pub mod session;
pub mod settings;
pub mod transport;

#[cfg(feature = "cli")]
pub mod cli;

pub use error::{MayaError, Result};
