//! HTTP request handlers for the game server.

use std::convert::Infallible;
use std::path::{Component, Path as FsPath};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use futures::stream::Stream;
use tokio_util::sync::CancellationToken;

use super::mock::{self, Intent};
use super::session::{GameSession, SessionManager};
use super::types::*;
use super::ServerConfig;
use crate::error::MayaError;
use crate::pipeline::{content_type_for, AssetStore, ResourceKind, StoredAsset};
use crate::rate_limit::RateLimiter;
use crate::session::{asset_preview_url, AssetError, AssetRecord, SessionEvent};
use crate::transport::DONE_MARKER;

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Application state shared across all handlers
pub struct AppState {
    pub session_manager: SessionManager,
    pub rate_limiter: RateLimiter,
    pub assets: Arc<AssetStore>,
    /// Prefix for asset URLs handed to clients; relative URLs when unset
    pub public_base_url: String,
    /// Delay between scripted events
    pub pacing: Duration,
    pub shutdown_token: CancellationToken,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> crate::error::Result<(Arc<Self>, CancellationToken)> {
        let shutdown_token = CancellationToken::new();
        let state = Arc::new(Self {
            session_manager: SessionManager::new(config.max_sessions),
            rate_limiter: RateLimiter::from_config(&config.rate_limit),
            assets: Arc::new(AssetStore::new(&config.asset_dir)?),
            public_base_url: config
                .public_base_url
                .as_deref()
                .unwrap_or("")
                .trim_end_matches('/')
                .to_string(),
            pacing: config.pacing,
            shutdown_token: shutdown_token.clone(),
        });
        Ok((state, shutdown_token))
    }

    fn asset_url(&self, session_id: &str, filename: &str) -> String {
        asset_preview_url(&self.public_base_url, session_id, filename)
    }

    fn asset_record(&self, session_id: &str, stored: StoredAsset) -> AssetRecord {
        let url = self.asset_url(session_id, &stored.filename);
        AssetRecord {
            category: stored
                .filename
                .split('_')
                .next()
                .unwrap_or_default()
                .to_string(),
            storage_url: url.clone(),
            preview_url: url,
            size_bytes: stored.size_bytes,
            created_at: stored.created_at.map(|t| t.to_rfc3339()),
            status: "completed".to_string(),
            filename: stored.filename,
        }
    }
}

fn api_error(status: StatusCode, message: impl Into<String>, code: &str) -> ApiError {
    (status, Json(ErrorResponse::with_code(message, code)))
}

/// A single path segment with no traversal.
fn is_plain_name(name: &str) -> bool {
    let mut components = FsPath::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

// =============================================================================
// Health
// =============================================================================

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

// =============================================================================
// Sessions
// =============================================================================

pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<ListSessionsResponse> {
    let sessions = state.session_manager.list_sessions().await;
    Json(ListSessionsResponse {
        count: sessions.len(),
        max_sessions: state.session_manager.max_sessions,
        sessions,
    })
}

/// Forget a session and stop any stream it is running.
///
/// - `204 No Content`: removed
/// - `404 Not Found`: unknown id
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    match state.session_manager.remove(&session_id) {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Session '{}' not found", session_id),
            "SESSION_NOT_FOUND",
        )),
    }
}

// =============================================================================
// Game generation (SSE streaming)
// =============================================================================

/// Answer a prompt with a stream of session events.
///
/// # Request Body
///
/// ```json
/// { "prompt": "make a breakout game", "session_id": "optional", "user_id": "optional" }
/// ```
///
/// # Response
///
/// - `200 OK`: SSE stream, one `{"type","payload"}` object per frame, ending
///   with `data: [DONE]`
/// - `400 Bad Request`: empty prompt
/// - `429 Too Many Requests`: per-client rate limit hit (user id, else session id)
/// - `503 Service Unavailable`: session limit reached
pub async fn generate_game(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerateRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    if req.prompt.trim().is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Prompt cannot be empty",
            "EMPTY_PROMPT",
        ));
    }

    if let Err(e) = state.rate_limiter.check(&req.rate_limit_key()) {
        tracing::warn!("{}", e);
        let retry_after = match &e {
            MayaError::RateLimited { retry_after, .. } => retry_after.as_secs().max(1),
            _ => 1,
        };
        return Err((
            StatusCode::TOO_MANY_REQUESTS,
            Json(ErrorResponse::with_code(e.to_string(), "RATE_LIMITED").retry_after(retry_after)),
        ));
    }

    let session = state
        .session_manager
        .get_or_create(req.session_id.as_deref())
        .map_err(|e| {
            api_error(
                StatusCode::SERVICE_UNAVAILABLE,
                e.to_string(),
                "SESSION_LIMIT_REACHED",
            )
        })?;
    session.touch().await;

    let intent = Intent::classify(&req.prompt);
    tracing::info!(
        "Session {} ({}): {:?} request",
        session.id,
        req.user_id,
        intent
    );

    let stream = script_stream(state.clone(), session, req, intent);

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}

fn to_sse(event: &SessionEvent) -> Option<Event> {
    match Event::default().json_data(event) {
        Ok(sse) => Some(sse),
        Err(e) => {
            tracing::error!("Failed to encode '{}' event: {}", event.name(), e);
            None
        }
    }
}

/// Wait out the pacing delay. False if the stream should stop.
async fn pace(state: &AppState, session: &GameSession) -> bool {
    if state.pacing.is_zero() {
        return !(session.cancel_token.is_cancelled() || state.shutdown_token.is_cancelled());
    }
    tokio::select! {
        _ = tokio::time::sleep(state.pacing) => true,
        _ = session.cancel_token.cancelled() => false,
        _ = state.shutdown_token.cancelled() => false,
    }
}

fn script_stream(
    state: Arc<AppState>,
    session: Arc<GameSession>,
    req: GenerateRequest,
    intent: Intent,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        let events = match intent {
            Intent::Create => mock::creation_script(&req.prompt).1,
            Intent::Publish => {
                let game = session.current_game().await;
                mock::publish_script(&req.prompt, game.as_ref())
            }
            Intent::Assets => Vec::new(),
        };

        for event in events {
            if !pace(&state, &session).await {
                tracing::debug!("Stream for session {} stopped", session.id);
                return;
            }
            match &event {
                SessionEvent::Code(code) => session.set_current_game(code.clone()).await,
                SessionEvent::PublishSuccess(success) => {
                    session.set_live_url(success.live_url.clone()).await
                }
                _ => {}
            }
            if let Some(sse) = to_sse(&event) {
                yield Ok(sse);
            }
        }

        if intent == Intent::Assets {
            let start = mock::asset_start(&req.prompt, &session.id, &req.user_id);
            if let Some(sse) = to_sse(&start) {
                yield Ok(sse);
            }

            let mut generated = 0;
            for category in mock::ASSET_CATEGORIES {
                if !pace(&state, &session).await {
                    return;
                }
                if let Some(sse) = to_sse(&mock::asset_generating(category)) {
                    yield Ok(sse);
                }

                let saved = state
                    .assets
                    .save(
                        Some(&session.id),
                        category,
                        "png",
                        ResourceKind::Image,
                        mock::PLACEHOLDER_PNG,
                    )
                    .await;
                let event = match saved {
                    Ok(stored) => {
                        generated += 1;
                        let url = state.asset_url(&session.id, &stored.filename);
                        mock::asset_completed(
                            category,
                            &stored.filename,
                            &url,
                            stored.size_bytes,
                            &session.id,
                        )
                    }
                    Err(e) => {
                        tracing::error!("Failed to store {} asset: {}", category, e);
                        SessionEvent::AssetError(AssetError {
                            error: e.to_string(),
                            category: Some(category.to_string()),
                            critical: false,
                        })
                    }
                };
                if let Some(sse) = to_sse(&event) {
                    yield Ok(sse);
                }
            }

            if let Some(sse) = to_sse(&mock::asset_complete(generated)) {
                yield Ok(sse);
            }
        }

        yield Ok(Event::default().data(DONE_MARKER));
    }
}

// =============================================================================
// Assets
// =============================================================================

/// List the stored assets of a session. Unknown sessions list as empty.
pub async fn list_assets(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<AssetListResponse>, ApiError> {
    if !is_plain_name(&session_id) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Invalid session id",
            "INVALID_PATH",
        ));
    }

    let stored = state.assets.list(Some(&session_id)).await.map_err(|e| {
        tracing::error!("Listing assets for {} failed: {}", session_id, e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string(), "ASSET_LIST_FAILED")
    })?;

    let assets = stored
        .into_iter()
        .map(|asset| state.asset_record(&session_id, asset))
        .collect();
    Ok(Json(AssetListResponse { session_id, assets }))
}

/// Serve the bytes of one stored asset.
pub async fn preview_asset(
    State(state): State<Arc<AppState>>,
    Path((session_id, filename)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    if !is_plain_name(&session_id) || !is_plain_name(&filename) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Invalid asset path",
            "INVALID_PATH",
        ));
    }

    match state.assets.read(Some(&session_id), &filename).await {
        Ok(bytes) => Ok((
            [
                (header::CONTENT_TYPE, content_type_for(&filename)),
                (header::CACHE_CONTROL, "public, max-age=3600"),
            ],
            bytes,
        )),
        Err(MayaError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Asset '{}' not found", filename),
            "ASSET_NOT_FOUND",
        )),
        Err(MayaError::PathEscape(_)) => Err(api_error(
            StatusCode::BAD_REQUEST,
            "Invalid asset path",
            "INVALID_PATH",
        )),
        Err(e) => Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            e.to_string(),
            "ASSET_READ_FAILED",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::server::create_router;
    use crate::rate_limit::RateLimitConfig;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        Router,
    };
    use tower::ServiceExt;

    fn test_app(max_requests: u32) -> (tempfile::TempDir, Router) {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            max_sessions: 10,
            rate_limit: RateLimitConfig {
                max_requests,
                window_secs: 60,
            },
            asset_dir: dir.path().to_path_buf(),
            public_base_url: None,
            pacing: Duration::ZERO,
        };
        let (state, _) = AppState::new(&config).unwrap();
        (dir, create_router(state))
    }

    fn post(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    /// Decode the `data:` payloads of an SSE body.
    fn events_of(body: &str) -> (Vec<SessionEvent>, bool) {
        let mut events = Vec::new();
        let mut done = false;
        for frame in body.split("\n\n") {
            for line in frame.lines() {
                if let Some(data) = line.strip_prefix("data:") {
                    let data = data.trim_start();
                    if data == DONE_MARKER {
                        done = true;
                    } else {
                        events.push(SessionEvent::from_json(data).unwrap());
                    }
                }
            }
        }
        (events, done)
    }

    async fn stream(app: &Router, uri: &str, body: serde_json::Value) -> (Vec<SessionEvent>, bool) {
        let response = app.clone().oneshot(post(uri, body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        events_of(&body_text(response).await)
    }

    mod health_tests {
        use super::*;

        #[tokio::test]
        async fn health_returns_200_ok() {
            let (_dir, app) = test_app(10);
            let response = app.oneshot(get("/health")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let health: HealthResponse =
                serde_json::from_str(&body_text(response).await).unwrap();
            assert_eq!(health.status, "healthy");
        }
    }

    mod generate_tests {
        use super::*;
        use serde_json::json;

        #[tokio::test]
        async fn empty_prompt_is_400() {
            let (_dir, app) = test_app(10);
            let response = app
                .oneshot(post("/generate-game", json!({"prompt": "   "})))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let err: ErrorResponse = serde_json::from_str(&body_text(response).await).unwrap();
            assert_eq!(err.code.as_deref(), Some("EMPTY_PROMPT"));
        }

        #[tokio::test]
        async fn creation_stream_ends_with_done() {
            let (_dir, app) = test_app(10);
            let (events, done) =
                stream(&app, "/chat", json!({"prompt": "make a breakout game"})).await;
            assert!(done);
            assert_eq!(events[0], SessionEvent::Status("thinking".into()));
            let code = events.iter().find_map(|e| match e {
                SessionEvent::Code(code) => Some(code),
                _ => None,
            });
            assert!(code.unwrap().html.contains("Breakout"));
        }

        #[tokio::test]
        async fn publish_without_game_reports_no_game() {
            let (_dir, app) = test_app(10);
            let (events, done) = stream(
                &app,
                "/chat",
                json!({"prompt": "publish it", "session_id": "fresh"}),
            )
            .await;
            assert!(done);
            assert!(events.contains(&SessionEvent::PublishError("no_game".into())));
        }

        #[tokio::test]
        async fn publish_after_creation_succeeds() {
            let (_dir, app) = test_app(10);
            stream(
                &app,
                "/generate-game",
                json!({"prompt": "memory game", "session_id": "s1"}),
            )
            .await;
            let (events, _) = stream(
                &app,
                "/chat",
                json!({"prompt": "publish my memory game", "session_id": "s1"}),
            )
            .await;

            let success = events.iter().find_map(|e| match e {
                SessionEvent::PublishSuccess(s) => Some(s),
                _ => None,
            });
            assert!(success.unwrap().live_url.ends_with(".web.app"));
        }

        #[tokio::test]
        async fn rate_limit_is_per_user() {
            let (_dir, app) = test_app(2);
            for _ in 0..2 {
                let response = app
                    .clone()
                    .oneshot(post("/chat", json!({"prompt": "hi", "user_id": "alice"})))
                    .await
                    .unwrap();
                assert_eq!(response.status(), StatusCode::OK);
            }

            let response = app
                .clone()
                .oneshot(post("/chat", json!({"prompt": "hi", "user_id": "alice"})))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
            let err: ErrorResponse = serde_json::from_str(&body_text(response).await).unwrap();
            assert_eq!(err.code.as_deref(), Some("RATE_LIMITED"));
            assert!(err.retry_after_secs.unwrap() >= 1);

            let response = app
                .oneshot(post("/chat", json!({"prompt": "hi", "user_id": "bob"})))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        #[tokio::test]
        async fn anonymous_requests_are_limited_per_session() {
            let (_dir, app) = test_app(1);
            for session in ["s1", "s2"] {
                let response = app
                    .clone()
                    .oneshot(post("/chat", json!({"prompt": "hi", "session_id": session})))
                    .await
                    .unwrap();
                assert_eq!(response.status(), StatusCode::OK);
            }

            let response = app
                .oneshot(post("/chat", json!({"prompt": "hi", "session_id": "s1"})))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        }
    }

    mod asset_tests {
        use super::*;
        use serde_json::json;

        #[tokio::test]
        async fn asset_request_stores_and_lists() {
            let (_dir, app) = test_app(10);
            let (events, done) = stream(
                &app,
                "/chat",
                json!({"prompt": "generate sprites for a knight", "session_id": "s9"}),
            )
            .await;
            assert!(done);
            let completed = events
                .iter()
                .filter(|e| matches!(e, SessionEvent::AssetCompleted(_)))
                .count();
            assert_eq!(completed, mock::ASSET_CATEGORIES.len());

            let response = app.clone().oneshot(get("/assets/s9")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let listing: AssetListResponse =
                serde_json::from_str(&body_text(response).await).unwrap();
            assert_eq!(listing.assets.len(), 3);
            let first = &listing.assets[0];
            assert_eq!(
                first.preview_url,
                format!("/assets/s9/{}/preview", first.filename)
            );

            let response = app
                .oneshot(get(&format!("/assets/s9/{}/preview", first.filename)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(
                response.headers()[header::CONTENT_TYPE],
                "image/png"
            );
        }

        #[tokio::test]
        async fn unknown_session_lists_empty() {
            let (_dir, app) = test_app(10);
            let response = app.oneshot(get("/assets/nobody")).await.unwrap();
            let listing: AssetListResponse =
                serde_json::from_str(&body_text(response).await).unwrap();
            assert!(listing.assets.is_empty());
        }

        #[tokio::test]
        async fn traversal_is_rejected() {
            let (_dir, app) = test_app(10);
            let response = app
                .clone()
                .oneshot(get("/assets/s1/..%2F..%2Fsecret/preview"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);

            let response = app.oneshot(get("/assets/s1/missing.png/preview")).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }
    }

    #[test]
    fn plain_names() {
        assert!(is_plain_name("image_1.png"));
        assert!(!is_plain_name(".."));
        assert!(!is_plain_name("a/b"));
        assert!(!is_plain_name("/etc"));
        assert!(!is_plain_name(""));
    }
}
