//! Server-pushed session events.
//!
//! Every event arrives as one JSON object `{"type": ..., "payload": ...}`.
//! The payload shape depends on the tag. Fields of structured payloads are
//! decoded one by one: a missing, null or wrong-kind field takes its default
//! and the rest of the event still folds into the state.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use super::state::OperationType;

/// One event of the session stream, in wire form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Generation status: "thinking" | "generating"
    Status(String),
    /// Conversational text for the chat transcript
    Chunk(String),
    /// Partial generated code, appended in arrival order
    CodeChunk(String),
    /// Tag-like progress text, e.g. `<generateCSS>Adding styling...</generateCSS>`
    Command(String),
    Explanation(String),
    Features(String),
    /// Bulleted suggestion text
    Suggestions(String),
    /// Terminal: final generated code
    Code(GameCode),
    /// Terminal: generation failed
    Error(String),
    /// Publisher progression: "validating" | "preparing" | "deploying"
    PublishStatus(String),
    /// Terminal: game is live
    PublishSuccess(PublishSuccess),
    /// Terminal: publish failed, payload is the error kind
    PublishError(String),
    PublishMessage(String),
    AssetSessionStart(AssetSessionStart),
    AssetGenerating(AssetGenerating),
    AssetCompleted(AssetCompleted),
    AssetSessionComplete(AssetSessionComplete),
    AssetError(AssetError),
    StreamComplete,
}

/// Generated game code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameCode {
    #[serde(deserialize_with = "lenient")]
    pub html: String,
    #[serde(deserialize_with = "lenient")]
    pub css: String,
    #[serde(deserialize_with = "lenient")]
    pub js: String,
}

impl GameCode {
    /// A game with no markup at all is treated as absent.
    pub fn is_empty(&self) -> bool {
        self.html.trim().is_empty() && self.css.trim().is_empty() && self.js.trim().is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PublishSuccess {
    #[serde(deserialize_with = "lenient")]
    #[serde(alias = "live_url")]
    pub live_url: String,
    #[serde(deserialize_with = "lenient")]
    #[serde(alias = "site_name")]
    pub site_name: String,
    #[serde(deserialize_with = "lenient")]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AssetSessionStart {
    #[serde(deserialize_with = "lenient")]
    pub description: String,
    #[serde(deserialize_with = "lenient")]
    #[serde(alias = "total_assets")]
    pub total_assets: u32,
    #[serde(deserialize_with = "lenient")]
    pub categories: Vec<String>,
    #[serde(deserialize_with = "lenient")]
    #[serde(alias = "session_id", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(deserialize_with = "lenient")]
    #[serde(alias = "user_id", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetGenerating {
    #[serde(deserialize_with = "lenient")]
    pub category: String,
    #[serde(deserialize_with = "lenient")]
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AssetCompleted {
    #[serde(deserialize_with = "lenient")]
    pub category: String,
    #[serde(deserialize_with = "lenient")]
    pub filename: String,
    #[serde(deserialize_with = "lenient")]
    #[serde(alias = "storage_url")]
    pub storage_url: String,
    #[serde(deserialize_with = "lenient")]
    #[serde(alias = "size_bytes")]
    pub size_bytes: u64,
    #[serde(deserialize_with = "lenient")]
    #[serde(alias = "session_id", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(deserialize_with = "lenient")]
    #[serde(alias = "created_at", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AssetSessionComplete {
    #[serde(deserialize_with = "lenient")]
    #[serde(alias = "total_generated")]
    pub total_generated: u32,
    #[serde(deserialize_with = "lenient")]
    #[serde(alias = "total_requested")]
    pub total_requested: u32,
    #[serde(deserialize_with = "lenient")]
    pub status: String,
    #[serde(deserialize_with = "lenient")]
    #[serde(alias = "fallback_mode", skip_serializing_if = "Option::is_none")]
    pub fallback_mode: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetError {
    #[serde(deserialize_with = "lenient")]
    pub error: String,
    #[serde(deserialize_with = "lenient")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub critical: bool,
}

/// Decode one payload field, falling back to the default when the value is
/// null or of the wrong kind.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_else(|e| {
        tracing::debug!("Ignoring malformed payload field: {}", e);
        T::default()
    }))
}

/// An event object that could not be decoded.
#[derive(Debug, Error)]
#[error("Failed to decode '{event_type}' event: {message}")]
pub struct EventDecodeError {
    pub event_type: String,
    pub message: String,
}

impl SessionEvent {
    /// Decode one wire object.
    pub fn from_value(value: serde_json::Value) -> Result<Self, EventDecodeError> {
        let event_type = value
            .get("type")
            .and_then(|t| t.as_str())
            .unwrap_or("<missing>")
            .to_string();

        serde_json::from_value(value).map_err(|e| EventDecodeError {
            event_type,
            message: e.to_string(),
        })
    }

    /// Decode one wire object from its JSON text.
    pub fn from_json(text: &str) -> Result<Self, EventDecodeError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| EventDecodeError {
                event_type: "<unparsed>".to_string(),
                message: e.to_string(),
            })?;
        Self::from_value(value)
    }

    /// The wire tag of this event.
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Status(_) => "status",
            SessionEvent::Chunk(_) => "chunk",
            SessionEvent::CodeChunk(_) => "code_chunk",
            SessionEvent::Command(_) => "command",
            SessionEvent::Explanation(_) => "explanation",
            SessionEvent::Features(_) => "features",
            SessionEvent::Suggestions(_) => "suggestions",
            SessionEvent::Code(_) => "code",
            SessionEvent::Error(_) => "error",
            SessionEvent::PublishStatus(_) => "publish_status",
            SessionEvent::PublishSuccess(_) => "publish_success",
            SessionEvent::PublishError(_) => "publish_error",
            SessionEvent::PublishMessage(_) => "publish_message",
            SessionEvent::AssetSessionStart(_) => "asset_session_start",
            SessionEvent::AssetGenerating(_) => "asset_generating",
            SessionEvent::AssetCompleted(_) => "asset_completed",
            SessionEvent::AssetSessionComplete(_) => "asset_session_complete",
            SessionEvent::AssetError(_) => "asset_error",
            SessionEvent::StreamComplete => "stream_complete",
        }
    }

    /// The operation this event implies, or `None` if it leaves the
    /// current operation unchanged.
    pub fn operation_class(&self) -> Option<OperationType> {
        match self {
            SessionEvent::PublishStatus(_)
            | SessionEvent::PublishSuccess(_)
            | SessionEvent::PublishError(_)
            | SessionEvent::PublishMessage(_) => Some(OperationType::Publishing),
            SessionEvent::Status(_)
            | SessionEvent::Explanation(_)
            | SessionEvent::Code(_)
            | SessionEvent::Features(_) => Some(OperationType::GameCreation),
            _ => None,
        }
    }

    /// Whether this event ends a generation or publish cycle.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionEvent::Code(_)
                | SessionEvent::Error(_)
                | SessionEvent::PublishSuccess(_)
                | SessionEvent::PublishError(_)
                | SessionEvent::StreamComplete
        )
    }
}
