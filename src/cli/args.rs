//! CLI argument parsing using clap.

use clap::Parser;
use std::path::PathBuf;

/// Maya CLI - drive the game service, run the 3D asset pipeline, or serve
#[derive(Parser, Debug, Clone)]
#[command(name = "maya-cli")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Send a single prompt and exit
    #[arg(short = 'e', long, conflicts_with_all = ["file", "model", "server"])]
    pub execute: Option<String>,

    /// Send prompts from a file (one per line, `#` for comments) and exit
    #[arg(short = 'f', long, conflicts_with_all = ["execute", "model", "server"])]
    pub file: Option<PathBuf>,

    /// Publish the game after each successful generation
    #[arg(long)]
    pub publish: bool,

    /// Run the text-to-3D pipeline for this prompt instead of a game request
    #[arg(long, value_name = "PROMPT", conflicts_with = "server")]
    pub model: Option<String>,

    /// Force the 3D backend (instantmesh, hunyuan3d-2, hunyuan3d-2mini-turbo)
    #[arg(long, requires = "model")]
    pub backend: Option<String>,

    /// Run the HTTP/SSE game server
    #[arg(long)]
    pub server: bool,

    /// Server port (overrides settings)
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Game service URL (overrides settings)
    #[arg(long, env = "MAYA_BASE_URL")]
    pub base_url: Option<String>,

    /// Reuse an existing session id
    #[arg(long)]
    pub session: Option<String>,

    /// Write the final game HTML to this file
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Output events as JSON lines (for scripting/parsing)
    #[arg(long)]
    pub json: bool,

    /// Only output the final result (suppress streaming)
    #[arg(long, short = 'q')]
    pub quiet: bool,

    /// Show verbose output (debug information)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// What a parsed command line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Server,
    Model(String),
    Execute(String),
    Batch(PathBuf),
    Interactive,
}

impl Args {
    pub fn mode(&self) -> Mode {
        if self.server {
            Mode::Server
        } else if let Some(prompt) = &self.model {
            Mode::Model(prompt.clone())
        } else if let Some(prompt) = &self.execute {
            Mode::Execute(prompt.clone())
        } else if let Some(file) = &self.file {
            Mode::Batch(file.clone())
        } else {
            Mode::Interactive
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_default_values() {
        let args = Args::parse_from(["maya-cli"]);
        assert!(!args.publish);
        assert!(!args.json);
        assert!(!args.quiet);
        assert!(!args.verbose);
        assert_eq!(args.mode(), Mode::Interactive);
    }

    #[test]
    fn test_args_execute_flag() {
        let args = Args::parse_from(["maya-cli", "-e", "make a breakout game", "--publish"]);
        assert_eq!(args.mode(), Mode::Execute("make a breakout game".to_string()));
        assert!(args.publish);
    }

    #[test]
    fn test_args_model_with_backend() {
        let args = Args::parse_from([
            "maya-cli",
            "--model",
            "a wooden chair",
            "--backend",
            "hunyuan3d-2",
        ]);
        assert_eq!(args.mode(), Mode::Model("a wooden chair".to_string()));
        assert_eq!(args.backend.as_deref(), Some("hunyuan3d-2"));
    }

    #[test]
    fn test_backend_requires_model() {
        assert!(Args::try_parse_from(["maya-cli", "--backend", "instantmesh"]).is_err());
    }

    #[test]
    fn test_server_mode() {
        let args = Args::parse_from(["maya-cli", "--server", "--port", "9000"]);
        assert_eq!(args.mode(), Mode::Server);
        assert_eq!(args.port, Some(9000));
    }

    #[test]
    fn test_execute_conflicts_with_server() {
        assert!(Args::try_parse_from(["maya-cli", "--server", "-e", "hi"]).is_err());
    }

    #[test]
    fn test_args_output_modes() {
        let args = Args::parse_from(["maya-cli", "--json", "--quiet"]);
        assert!(args.json);
        assert!(args.quiet);
    }
}
