//! HTTP client for the game service.

use std::pin::Pin;
use std::time::Duration;

use futures::stream::FuturesUnordered;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::sse::{SseFrame, SseStream};
use crate::error::{MayaError, Result};
use crate::session::{asset_preview_url, AssetRecord, Effect, SessionEvent, SessionState, SessionStore};

pub const DEFAULT_USER_ID: &str = "default_user";

/// Ceiling for one asset listing request.
const ASSET_LIST_TIMEOUT: Duration = Duration::from_secs(10);

/// Body of `POST /chat` and `POST /generate-game`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default = "default_user_id")]
    pub user_id: String,
}

fn default_user_id() -> String {
    DEFAULT_USER_ID.to_string()
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            session_id: None,
            user_id: default_user_id(),
        }
    }

    /// Key for per-client rate limiting. Requests without a user of their
    /// own are keyed by session so anonymous callers don't share one bucket.
    pub fn rate_limit_key(&self) -> String {
        let user = self.user_id.trim();
        if !user.is_empty() && user != DEFAULT_USER_ID {
            return user.to_string();
        }
        match self.session_id.as_deref().map(str::trim) {
            Some(session) if !session.is_empty() => format!("session:{}", session),
            _ => DEFAULT_USER_ID.to_string(),
        }
    }
}

/// A run of requests sharing one session id, so a later publish request
/// finds the game an earlier request created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    session_id: String,
    user_id: String,
}

impl Conversation {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
        }
    }

    pub fn with_session_id(session_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn request(&self, prompt: impl Into<String>) -> GenerateRequest {
        GenerateRequest {
            prompt: prompt.into(),
            session_id: Some(self.session_id.clone()),
            user_id: self.user_id.clone(),
        }
    }
}

/// Body of `GET /assets/{session_id}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetListResponse {
    #[serde(alias = "session_id")]
    pub session_id: String,
    #[serde(default)]
    pub assets: Vec<AssetRecord>,
}

pub type EventStream = Pin<Box<dyn Stream<Item = SessionEvent> + Send>>;

#[derive(Clone)]
pub struct GameClient {
    http: reqwest::Client,
    base_url: String,
}

impl std::fmt::Debug for GameClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GameClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Open the event stream for one request.
    pub async fn stream(&self, request: &GenerateRequest) -> Result<EventStream> {
        let url = format!("{}/chat", self.base_url);
        tracing::debug!("POST {} (session {:?})", url, request.session_id);

        let response = self.http.post(&url).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MayaError::Backend(error_message(status, &body)));
        }

        Ok(decode_events(SseStream::new(response)))
    }

    /// Fetch the stored assets of a session. Preview URLs are always
    /// derived from this client's base URL.
    pub async fn list_assets(&self, session_id: &str) -> Result<Vec<AssetRecord>> {
        let url = format!("{}/assets/{}", self.base_url, session_id);
        let response = self
            .http
            .get(&url)
            .timeout(ASSET_LIST_TIMEOUT)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MayaError::Backend(error_message(status, &body)));
        }

        let listing: AssetListResponse = response.json().await?;
        Ok(listing
            .assets
            .into_iter()
            .map(|mut record| {
                record.preview_url = asset_preview_url(&self.base_url, session_id, &record.filename);
                record
            })
            .collect())
    }
}

fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    #[derive(Deserialize)]
    struct Body {
        error: String,
    }
    match serde_json::from_str::<Body>(body) {
        Ok(parsed) => format!("{}: {}", status, parsed.error),
        Err(_) if body.is_empty() => status.to_string(),
        Err(_) => format!("{}: {}", status, body),
    }
}

/// Turn SSE frames into session events. Stops at `[DONE]` or the first
/// transport error; malformed events are logged and skipped.
pub fn decode_events<S>(frames: S) -> EventStream
where
    S: Stream<Item = Result<SseFrame>> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        futures::pin_mut!(frames);
        while let Some(frame) = frames.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::error!("Event stream ended early: {}", e);
                    break;
                }
            };
            if frame.is_done() {
                break;
            }
            if frame.data.trim().is_empty() {
                continue;
            }
            match SessionEvent::from_json(&frame.data) {
                Ok(event) => yield event,
                Err(e) => tracing::warn!("Skipping malformed event: {}", e),
            }
        }
    })
}

/// How a generation run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Cancelled,
}

/// Stream one request into `store`.
///
/// `on_event` sees each event together with the state it produced. Effects
/// run alongside the stream, so a slow asset refresh never holds back later
/// events; the run completes once the stream has ended and every effect has
/// finished. On cancellation the subscription and pending effects are
/// dropped and the store is reset.
pub async fn run_generation<F>(
    client: &GameClient,
    store: &SessionStore,
    request: &GenerateRequest,
    cancel: &CancellationToken,
    mut on_event: F,
) -> Result<RunOutcome>
where
    F: FnMut(&SessionEvent, &SessionState),
{
    store.begin_cycle();

    let mut events = tokio::select! {
        _ = cancel.cancelled() => {
            store.cancel();
            return Ok(RunOutcome::Cancelled);
        }
        opened = client.stream(request) => opened?,
    };

    let mut effects = FuturesUnordered::new();
    let mut stream_done = false;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                store.cancel();
                tracing::info!("Generation cancelled");
                return Ok(RunOutcome::Cancelled);
            }
            Some(refreshed) = effects.next(), if !effects.is_empty() => {
                if refreshed > 0 {
                    tracing::debug!("Asset refresh added {} record(s)", refreshed);
                }
            }
            next = events.next(), if !stream_done => match next {
                Some(event) => {
                    let requested = store.dispatch(event.clone());
                    store.read(|state| on_event(&event, state));
                    for effect in requested {
                        effects.push(run_effect(client, store, request, effect));
                    }
                }
                None => stream_done = true,
            },
            else => break,
        }

        if stream_done && effects.is_empty() {
            break;
        }
    }

    Ok(RunOutcome::Completed)
}

/// Perform one reducer effect. Returns how many asset records were added.
async fn run_effect(
    client: &GameClient,
    store: &SessionStore,
    request: &GenerateRequest,
    effect: Effect,
) -> usize {
    match effect {
        Effect::RefreshAssets { session_id, delay } => {
            let session_id = session_id
                .or_else(|| store.read(|s| s.assets.session_id.clone()))
                .or_else(|| request.session_id.clone());
            let Some(session_id) = session_id else {
                tracing::debug!("No session id known, skipping asset refresh");
                return 0;
            };

            tokio::time::sleep(delay).await;
            match client.list_assets(&session_id).await {
                Ok(records) => store.merge_refreshed_assets(records),
                Err(e) => {
                    tracing::warn!("Asset refresh for {} failed: {}", session_id, e);
                    0
                }
            }
        }
    }
}
