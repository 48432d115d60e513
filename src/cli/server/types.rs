//! Request/response types for the HTTP server.
//!
//! Streaming requests reuse [`crate::transport::GenerateRequest`] and asset
//! listings reuse [`crate::transport::AssetListResponse`], so the client and
//! server agree on one wire format.

use serde::{Deserialize, Serialize};

pub use crate::transport::{AssetListResponse, GenerateRequest};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    /// Always "healthy" when the server answers
    pub status: String,
    pub version: String,
    /// Seconds since the Unix epoch
    pub timestamp: i64,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: String,
    /// Milliseconds since the session was created
    pub age_ms: u64,
    pub has_game: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListSessionsResponse {
    pub sessions: Vec<SessionInfo>,
    pub count: usize,
    pub max_sessions: usize,
}

/// Error response body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: String,
    /// Error code for programmatic handling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Seconds to wait before retrying, for rate-limited requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: None,
            retry_after_secs: None,
        }
    }

    pub fn with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: Some(code.into()),
            retry_after_secs: None,
        }
    }

    pub fn retry_after(mut self, secs: u64) -> Self {
        self.retry_after_secs = Some(secs);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_includes_version() {
        let resp = HealthResponse::healthy();
        assert_eq!(resp.status, "healthy");
        assert_eq!(resp.version, env!("CARGO_PKG_VERSION"));
        assert!(resp.timestamp > 0);
    }

    #[test]
    fn error_code_is_omitted_when_absent() {
        let json = serde_json::to_string(&ErrorResponse::new("boom")).unwrap();
        assert_eq!(json, r#"{"error":"boom"}"#);
    }

    #[test]
    fn rate_limited_error_shape() {
        let err = ErrorResponse::with_code("Too many requests", "RATE_LIMITED").retry_after(12);
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "RATE_LIMITED");
        assert_eq!(json["retry_after_secs"], 12);
    }

    #[test]
    fn generate_request_defaults_user() {
        let req: GenerateRequest =
            serde_json::from_str(r#"{"prompt":"make a game","session_id":"s1"}"#).unwrap();
        assert_eq!(req.user_id, "default_user");
        assert_eq!(req.session_id.as_deref(), Some("s1"));
    }
}
