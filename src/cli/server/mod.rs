//! HTTP/SSE game server.
//!
//! ```text
//! +--------------------------------------------------------------+
//! |  Axum HTTP Server                                            |
//! |  /health (GET)                          -> health check      |
//! |  /generate-game, /chat (POST)           -> SSE event stream  |
//! |  /sessions (GET)                        -> list sessions     |
//! |  /sessions/{id} (DELETE)                -> drop session      |
//! |  /assets/{id} (GET)                     -> asset listing     |
//! |  /assets/{id}/{file}/preview (GET)      -> asset bytes       |
//! +--------------------------------------------------------------+
//!          |                         |
//!          v                         v
//! +------------------------+  +----------------------+
//! | SessionManager         |  | AssetStore           |
//! |  current game per id   |  |  <asset_dir>/<id>/.. |
//! +------------------------+  +----------------------+
//! ```
//!
//! Start it with `maya-cli --server --port 8000`.

mod handlers;
mod mock;
mod session;
pub mod types;

pub use handlers::AppState;
pub use mock::{generate_site_name, Intent, Template};
pub use session::{GameSession, SessionManager, DEFAULT_MAX_SESSIONS, DEFAULT_SESSION_TTL_SECS};
pub use types::{ErrorResponse, HealthResponse, ListSessionsResponse, SessionInfo};

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::rate_limit::RateLimitConfig;
use crate::settings::{expand_home, maya_dir, MayaSettings};

/// Delay between scripted events, so clients see a live stream.
pub const DEFAULT_EVENT_PACING: Duration = Duration::from_millis(300);

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub max_sessions: usize,
    pub rate_limit: RateLimitConfig,
    pub asset_dir: PathBuf,
    pub public_base_url: Option<String>,
    pub pacing: Duration,
}

impl ServerConfig {
    pub fn from_settings(settings: &MayaSettings) -> Self {
        Self {
            max_sessions: settings.server.max_sessions,
            rate_limit: settings.rate_limit,
            asset_dir: settings
                .server
                .asset_dir
                .as_deref()
                .map(expand_home)
                .unwrap_or_else(|| maya_dir().join("assets")),
            public_base_url: settings.server.public_base_url.clone(),
            pacing: DEFAULT_EVENT_PACING,
        }
    }
}

/// Bind and serve in the background.
///
/// Returns the bound address (port 0 picks a free port) and a token that
/// shuts the server down when cancelled.
pub async fn start_server(
    port: u16,
    config: ServerConfig,
) -> anyhow::Result<(SocketAddr, CancellationToken)> {
    let (state, shutdown_token) = AppState::new(&config)?;
    let app = create_router(state.clone());

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!(
        "HTTP server listening on {} (assets in {:?})",
        actual_addr,
        config.asset_dir
    );

    // Idle sessions and stale rate-limit windows
    let cleanup_state = state.clone();
    let cleanup_shutdown = shutdown_token.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let cleaned = cleanup_state
                        .session_manager
                        .cleanup_idle(DEFAULT_SESSION_TTL_SECS)
                        .await;
                    if cleaned > 0 {
                        tracing::info!("Cleaned up {} idle sessions", cleaned);
                    }
                    cleanup_state.rate_limiter.cleanup();
                }
                _ = cleanup_shutdown.cancelled() => {
                    tracing::debug!("Cleanup task shutting down");
                    break;
                }
            }
        }
    });

    let server_shutdown = shutdown_token.clone();
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(server_shutdown.cancelled_owned())
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_token))
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/generate-game", post(handlers::generate_game))
        .route("/chat", post(handlers::generate_game))
        .route("/sessions", get(handlers::list_sessions))
        .route("/sessions/{session_id}", delete(handlers::delete_session))
        .route("/assets/{session_id}", get(handlers::list_assets))
        .route(
            "/assets/{session_id}/{filename}/preview",
            get(handlers::preview_asset),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{GenerationStatus, PublishStatus, SessionStore};
    use crate::transport::{run_generation, Conversation, GameClient, RunOutcome};

    fn config(dir: &tempfile::TempDir) -> ServerConfig {
        ServerConfig {
            max_sessions: 10,
            rate_limit: RateLimitConfig::default(),
            asset_dir: dir.path().to_path_buf(),
            public_base_url: None,
            pacing: Duration::ZERO,
        }
    }

    #[test]
    fn config_from_default_settings() {
        let config = ServerConfig::from_settings(&MayaSettings::default());
        assert_eq!(config.max_sessions, 100);
        assert!(config.asset_dir.ends_with("assets"));
    }

    #[tokio::test]
    async fn start_server_binds_to_port() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, shutdown) = start_server(0, config(&dir)).await.unwrap();
        assert!(addr.port() > 0);
        assert!(!shutdown.is_cancelled());
        shutdown.cancel();
    }

    mod end_to_end {
        use super::*;

        async fn serve() -> (tempfile::TempDir, GameClient, CancellationToken) {
            let dir = tempfile::tempdir().unwrap();
            let (addr, shutdown) = start_server(0, config(&dir)).await.unwrap();
            let client = GameClient::new(format!("http://{}", addr)).unwrap();
            (dir, client, shutdown)
        }

        #[tokio::test]
        async fn create_then_publish() {
            let (_dir, client, shutdown) = serve().await;
            let store = SessionStore::new();
            let conversation = Conversation::new("tester");
            let cancel = CancellationToken::new();

            let mut seen = 0;
            let outcome = run_generation(
                &client,
                &store,
                &conversation.request("make a breakout game"),
                &cancel,
                |_, _| seen += 1,
            )
            .await
            .unwrap();
            assert_eq!(outcome, RunOutcome::Completed);
            assert!(seen > 5);

            let state = store.snapshot();
            assert_eq!(state.generation_status, GenerationStatus::Completed);
            assert!(state.code.unwrap().html.contains("Breakout"));

            run_generation(
                &client,
                &store,
                &conversation.request("publish my breakout game"),
                &cancel,
                |_, _| {},
            )
            .await
            .unwrap();
            let publisher = store.read(|s| s.publisher.clone());
            assert_eq!(publisher.status, PublishStatus::Published);
            assert!(publisher.live_url.unwrap().starts_with("https://publish-breakout-"));

            shutdown.cancel();
        }

        #[tokio::test]
        async fn asset_run_refreshes_listing() {
            let (_dir, client, shutdown) = serve().await;
            let store = SessionStore::new();
            let conversation = Conversation::new("tester");

            run_generation(
                &client,
                &store,
                &conversation.request("draw sprites for a platformer"),
                &CancellationToken::new(),
                |_, _| {},
            )
            .await
            .unwrap();

            let assets = store.read(|s| s.assets.clone());
            assert!(!assets.is_generating);
            assert_eq!(assets.items.len(), 3);
            assert_eq!(assets.session_id.as_deref(), Some(conversation.session_id()));

            let listed = client.list_assets(conversation.session_id()).await.unwrap();
            assert!(listed[0]
                .preview_url
                .starts_with(&format!("{}/assets/", client.base_url())));

            shutdown.cancel();
        }

        #[tokio::test]
        async fn cancelled_run_resets_store() {
            let (_dir, client, shutdown) = serve().await;
            let store = SessionStore::new();
            let cancel = CancellationToken::new();
            cancel.cancel();

            let outcome = run_generation(
                &client,
                &store,
                &Conversation::new("tester").request("make a game"),
                &cancel,
                |_, _| {},
            )
            .await
            .unwrap();
            assert_eq!(outcome, RunOutcome::Cancelled);
            assert_eq!(store.snapshot().code, None);

            shutdown.cancel();
        }
    }
}
