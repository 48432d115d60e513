//! CLI bootstrap - load settings, logging and the game client.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::session::{SessionState, SessionStore};
use crate::settings::{MayaSettings, SettingsManager};
use crate::transport::{Conversation, GameClient};

use super::args::Args;

/// Everything a CLI mode needs, owned for the lifetime of the process.
pub struct CliContext {
    /// Command-line arguments
    pub args: Args,

    pub settings_manager: Arc<SettingsManager>,

    /// Settings snapshot with command-line overrides applied
    pub settings: MayaSettings,

    pub client: GameClient,

    /// Reducer state shared by every request of this process
    pub store: Arc<SessionStore>,

    /// Session id sent with every request
    pub conversation: Conversation,
}

impl std::fmt::Debug for CliContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CliContext")
            .field("base_url", &self.client.base_url())
            .field("session_id", &self.conversation.session_id())
            .finish_non_exhaustive()
    }
}

impl CliContext {
    /// Start over with a fresh session id and an empty state.
    pub fn new_conversation(&mut self) {
        self.conversation = Conversation::new(self.settings.client.user_id.clone());
        self.store.clear();
    }

    pub async fn shutdown(self) -> Result<()> {
        if self.args.verbose {
            eprintln!("[cli] Session {} finished", self.conversation.session_id());
        }
        Ok(())
    }
}

/// Initialize the CLI context.
pub async fn initialize(args: &Args) -> Result<CliContext> {
    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        // Only warn on errors other than file not found
        if !matches!(e, dotenvy::Error::Io(_)) {
            tracing::warn!("Failed to load .env file: {}", e);
        }
    }

    let settings_manager = Arc::new(
        SettingsManager::new()
            .await
            .context("Failed to initialize settings manager")?,
    );

    // Ensure settings file exists (creates template on first run)
    if let Err(e) = settings_manager.ensure_settings_file().await {
        tracing::warn!("Failed to create settings template: {}", e);
    }

    let mut settings = settings_manager.get().await;
    init_logging(args, &settings);

    apply_overrides(&mut settings, args);

    if args.verbose {
        eprintln!(
            "[cli] Settings loaded from {}",
            settings_manager.path().display()
        );
        eprintln!("[cli] Game service: {}", settings.client.base_url);
    }

    let client = GameClient::new(settings.client.base_url.clone())
        .context("Failed to build HTTP client")?;
    let store = Arc::new(SessionStore::with_state(SessionState::with_asset_base_url(
        client.base_url(),
    )));
    let conversation = match &args.session {
        Some(id) => Conversation::with_session_id(id.clone(), settings.client.user_id.clone()),
        None => Conversation::new(settings.client.user_id.clone()),
    };

    Ok(CliContext {
        args: args.clone(),
        settings_manager,
        settings,
        client,
        store,
        conversation,
    })
}

fn init_logging(args: &Args, settings: &MayaSettings) {
    let log_level = if args.verbose {
        "debug"
    } else {
        settings.advanced.log_level.as_str()
    };
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    match format!("maya_lib={}", log_level).parse() {
        Ok(directive) => filter = filter.add_directive(directive),
        Err(e) => eprintln!("[cli] Ignoring log level '{}': {}", log_level, e),
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Command-line flags win over the settings file.
fn apply_overrides(settings: &mut MayaSettings, args: &Args) {
    if let Some(base_url) = &args.base_url {
        settings.client.base_url = base_url.clone();
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }
    if let Some(backend) = &args.backend {
        settings.pipeline.backend = Some(backend.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_overrides_replace_settings() {
        let mut settings = MayaSettings::default();
        let args = Args::parse_from([
            "maya-cli",
            "--base-url",
            "http://example.test:9000",
            "--port",
            "9100",
            "--model",
            "a lamp",
            "--backend",
            "turbo",
        ]);

        apply_overrides(&mut settings, &args);
        assert_eq!(settings.client.base_url, "http://example.test:9000");
        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.pipeline.backend.as_deref(), Some("turbo"));
    }

    #[test]
    fn test_no_overrides_keep_settings() {
        let mut settings = MayaSettings::default();
        let args = Args::parse_from(["maya-cli"]);
        let before = settings.client.base_url.clone();

        apply_overrides(&mut settings, &args);
        assert_eq!(settings.client.base_url, before);
        assert_eq!(settings.pipeline.backend, None);
    }
}
