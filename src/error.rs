use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MayaError {
    /// HTTP request failed before a response was read
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Remote backend reported a failure. The message is kept verbatim so
    /// retry logic can inspect it for quota hints.
    #[error("{0}")]
    Backend(String),

    #[error("Timed out after {secs}s: {operation}")]
    Timeout { operation: String, secs: u64 },

    #[error("Could not detect backend type for '{0}'; set pipeline.backend in settings")]
    UnknownBackend(String),

    #[error("Missing data: {0}")]
    MissingData(String),

    #[error("Path escapes asset directory: {0}")]
    PathEscape(PathBuf),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Streaming error: {0}")]
    Stream(String),

    #[error("Rate limit exceeded for '{client_id}', retry in {}s", retry_after.as_secs())]
    RateLimited {
        client_id: String,
        retry_after: Duration,
    },
}

impl MayaError {
    /// Whether retrying the same call can plausibly succeed.
    ///
    /// Structural failures (unknown backend, missing data, bad paths) are
    /// never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MayaError::Http(_)
                | MayaError::Backend(_)
                | MayaError::Stream(_)
                | MayaError::Timeout { .. }
        )
    }
}

// Serialize as the display string for JSON error bodies
impl Serialize for MayaError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MayaError>;
