//! Per-conversation state for the game server.
//!
//! ```text
//! +------------------------------------------+
//! |  SessionManager (DashMap)                |
//! |    +-- session id -> GameSession         |
//! |          current game, last activity     |
//! +------------------------------------------+
//! ```
//!
//! Sessions are created on first use by a request carrying an unknown id
//! and reaped after a period without requests.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::types::SessionInfo;
use crate::session::GameCode;

pub const DEFAULT_MAX_SESSIONS: usize = 100;

/// Idle sessions are dropped after 30 minutes.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 30 * 60;

/// Note: manual Debug impl because of the locks and token.
pub struct GameSession {
    pub id: String,

    /// Cancelled when the session is removed; running streams stop.
    pub cancel_token: CancellationToken,

    pub created_at: Instant,

    pub last_activity: RwLock<Instant>,

    /// Game produced by the latest creation run, used by publish runs
    current_game: RwLock<Option<GameCode>>,

    /// Live URL of the latest successful publish
    live_url: RwLock<Option<String>>,
}

impl GameSession {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Instant::now();
        Self {
            id: id.into(),
            cancel_token: CancellationToken::new(),
            created_at: now,
            last_activity: RwLock::new(now),
            current_game: RwLock::new(None),
            live_url: RwLock::new(None),
        }
    }

    pub async fn current_game(&self) -> Option<GameCode> {
        self.current_game.read().await.clone()
    }

    pub async fn set_current_game(&self, game: GameCode) {
        *self.current_game.write().await = Some(game);
    }

    pub async fn live_url(&self) -> Option<String> {
        self.live_url.read().await.clone()
    }

    pub async fn set_live_url(&self, url: String) {
        *self.live_url.write().await = Some(url);
    }

    pub async fn touch(&self) {
        *self.last_activity.write().await = Instant::now();
    }

    pub async fn is_idle(&self, max_idle_secs: u64) -> bool {
        let last = *self.last_activity.read().await;
        last.elapsed().as_secs() > max_idle_secs
    }

    pub async fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            age_ms: self.created_at.elapsed().as_millis() as u64,
            has_game: self.current_game.read().await.is_some(),
            live_url: self.live_url().await,
        }
    }
}

impl std::fmt::Debug for GameSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameSession")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("is_cancelled", &self.cancel_token.is_cancelled())
            .finish_non_exhaustive()
    }
}

pub struct SessionManager {
    sessions: DashMap<String, Arc<GameSession>>,
    pub max_sessions: usize,
}

impl SessionManager {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            max_sessions,
        }
    }

    /// Look up a session, creating it if the id is new. A missing id gets a
    /// server-generated UUID.
    pub fn get_or_create(&self, id: Option<&str>) -> anyhow::Result<Arc<GameSession>> {
        let id = match id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        };

        if let Some(existing) = self.sessions.get(&id) {
            return Ok(existing.clone());
        }

        if self.sessions.len() >= self.max_sessions {
            anyhow::bail!("Maximum session limit ({}) reached", self.max_sessions);
        }

        let session = self
            .sessions
            .entry(id.clone())
            .or_insert_with(|| Arc::new(GameSession::new(id)))
            .clone();
        Ok(session)
    }

    pub fn get(&self, id: &str) -> Option<Arc<GameSession>> {
        self.sessions.get(id).map(|r| r.clone())
    }

    /// Remove a session and stop its running streams.
    pub fn remove(&self, id: &str) -> Option<Arc<GameSession>> {
        let (_, session) = self.sessions.remove(id)?;
        session.cancel_token.cancel();
        Some(session)
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    pub async fn list_sessions(&self) -> Vec<SessionInfo> {
        let sessions: Vec<Arc<GameSession>> =
            self.sessions.iter().map(|r| r.value().clone()).collect();
        let mut infos = Vec::with_capacity(sessions.len());
        for session in sessions {
            infos.push(session.info().await);
        }
        infos
    }

    /// Drop sessions idle for longer than `max_idle_secs`.
    pub async fn cleanup_idle(&self, max_idle_secs: u64) -> usize {
        let sessions: Vec<Arc<GameSession>> =
            self.sessions.iter().map(|r| r.value().clone()).collect();

        let mut removed = 0;
        for session in sessions {
            if session.is_idle(max_idle_secs).await && self.remove(&session.id).is_some() {
                tracing::info!("Cleaned up idle session: {}", session.id);
                removed += 1;
            }
        }
        removed
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SESSIONS)
    }
}
