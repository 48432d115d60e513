//! Clients for hosted model spaces.
//!
//! [`SpaceClient`] is the seam the pipeline talks through. [`GradioClient`]
//! implements it over the Gradio HTTP API:
//!
//! ```text
//! GET  /config                        handshake (bounded)
//! GET  {api}/info                     endpoint listing
//! POST {api}/upload                   multipart file upload
//! POST {api}/call/<name>              -> {"event_id": ...}
//! GET  {api}/call/<name>/<event_id>   SSE: event: complete | error
//! ```
//!
//! `{api}` is the base URL plus the `api_prefix` announced in the config
//! (empty on older servers).

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{MayaError, Result};
use crate::transport::sse::SseStream;

/// Ceiling for the connection handshake.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// A file as exchanged with a Gradio server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileData {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orig_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default = "file_data_meta")]
    pub meta: Value,
}

fn file_data_meta() -> Value {
    json!({"_type": "gradio.FileData"})
}

impl FileData {
    pub fn from_path(path: impl Into<String>) -> Self {
        let path = path.into();
        let orig_name = Path::new(&path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        Self {
            path,
            orig_name,
            meta: file_data_meta(),
            ..Default::default()
        }
    }

    /// Extract a file from a prediction output value.
    ///
    /// Accepts a FileData object, a `{"value": FileData}` update wrapper,
    /// or a bare path string.
    pub fn from_output(value: &Value) -> Option<Self> {
        match value {
            Value::String(path) if !path.is_empty() => Some(Self::from_path(path.clone())),
            Value::Object(map) => {
                if map.contains_key("path") || map.contains_key("url") {
                    let mut file: FileData = serde_json::from_value(value.clone()).ok()?;
                    if file.path.is_empty() && file.url.is_none() {
                        return None;
                    }
                    if file.orig_name.is_none() && !file.path.is_empty() {
                        file.orig_name = Self::from_path(file.path.clone()).orig_name;
                    }
                    Some(file)
                } else {
                    map.get("value").and_then(Self::from_output)
                }
            }
            _ => None,
        }
    }

    /// Lowercase extension of the file name, if any.
    pub fn extension(&self) -> Option<String> {
        let name = self.orig_name.as_deref().unwrap_or(&self.path);
        Path::new(name)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Operations the pipeline needs from a model space.
#[async_trait]
pub trait SpaceClient: Send + Sync {
    /// Declared space name, e.g. `tencent/Hunyuan3D-2`.
    fn name(&self) -> &str;

    /// Named API endpoints, e.g. `/generation_all`.
    async fn endpoints(&self) -> Result<Vec<String>>;

    async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Result<FileData>;

    /// Call an endpoint and wait for its outputs.
    async fn predict(&self, api_name: &str, args: Vec<Value>) -> Result<Vec<Value>>;

    async fn download(&self, file: &FileData) -> Result<Vec<u8>>;
}

#[derive(Debug, Deserialize)]
struct SpaceConfig {
    #[serde(default)]
    api_prefix: Option<String>,
    #[serde(default)]
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiInfo {
    #[serde(default)]
    named_endpoints: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct CallResponse {
    event_id: String,
}

/// `owner/name` -> `https://owner-name.hf.space`; URLs pass through.
pub fn resolve_space_url(space: &str) -> Result<String> {
    let space = space.trim();
    if space.starts_with("http://") || space.starts_with("https://") {
        let parsed = url::Url::parse(space)
            .map_err(|e| MayaError::Config(format!("Invalid space URL '{}': {}", space, e)))?;
        return Ok(parsed.as_str().trim_end_matches('/').to_string());
    }

    let Some((owner, name)) = space.split_once('/') else {
        return Err(MayaError::Config(format!(
            "Space '{}' must be 'owner/name' or a URL",
            space
        )));
    };
    if owner.is_empty() || name.is_empty() || name.contains('/') {
        return Err(MayaError::Config(format!(
            "Space '{}' must be 'owner/name' or a URL",
            space
        )));
    }

    let subdomain: String = format!("{}-{}", owner, name)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    Ok(format!("https://{}.hf.space", subdomain))
}

/// Gradio HTTP API client.
#[derive(Clone)]
pub struct GradioClient {
    http: reqwest::Client,
    name: String,
    api_base: String,
}

impl std::fmt::Debug for GradioClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GradioClient")
            .field("name", &self.name)
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl GradioClient {
    /// Connect to a space, performing the config handshake.
    pub async fn connect(space: &str, token: Option<&str>) -> Result<Self> {
        let base = resolve_space_url(space)?;

        let mut headers = HeaderMap::new();
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| MayaError::Config(format!("Invalid token: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        tracing::info!("Connecting to space {} at {}", space, base);
        let config_url = format!("{}/config", base);
        let config: SpaceConfig = tokio::time::timeout(HANDSHAKE_TIMEOUT, async {
            let response = http.get(&config_url).send().await?;
            let response = check_status(response).await?;
            Ok::<_, MayaError>(response.json::<SpaceConfig>().await?)
        })
        .await
        .map_err(|_| MayaError::Timeout {
            operation: format!("handshake with {}", space),
            secs: HANDSHAKE_TIMEOUT.as_secs(),
        })??;

        let prefix = config.api_prefix.unwrap_or_default();
        tracing::debug!(
            "Space {} gradio version {:?}, api prefix '{}'",
            space,
            config.version,
            prefix
        );

        Ok(Self {
            http,
            name: space.to_string(),
            api_base: format!("{}{}", base, prefix.trim_end_matches('/')),
        })
    }

    fn endpoint_path(api_name: &str) -> &str {
        api_name.trim_start_matches('/')
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(MayaError::Backend(format!(
        "HTTP {}: {}",
        status,
        body.chars().take(500).collect::<String>()
    )))
}

/// Pull the error text out of a Gradio `error` event payload.
fn error_message(data: &str) -> String {
    match serde_json::from_str::<Value>(data) {
        Ok(Value::String(s)) => s,
        Ok(Value::Object(map)) => map
            .get("error")
            .or_else(|| map.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| data.to_string()),
        Ok(Value::Null) | Err(_) if data.trim().is_empty() || data.trim() == "null" => {
            "Unknown error from space".to_string()
        }
        _ => data.to_string(),
    }
}

#[async_trait]
impl SpaceClient for GradioClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn endpoints(&self) -> Result<Vec<String>> {
        let response = self
            .http
            .get(format!("{}/info", self.api_base))
            .send()
            .await?;
        let info: ApiInfo = check_status(response).await?.json().await?;
        Ok(info.named_endpoints.keys().cloned().collect())
    }

    async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Result<FileData> {
        let size = bytes.len();
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new().part("files", part);
        let response = self
            .http
            .post(format!("{}/upload", self.api_base))
            .multipart(form)
            .send()
            .await?;
        let paths: Vec<String> = check_status(response).await?.json().await?;
        let path = paths
            .into_iter()
            .next()
            .ok_or_else(|| MayaError::Backend("Upload returned no path".to_string()))?;

        tracing::debug!("Uploaded {} ({} bytes) to {}", filename, size, self.name);
        let mut file = FileData::from_path(path);
        file.orig_name = Some(filename.to_string());
        Ok(file)
    }

    async fn predict(&self, api_name: &str, args: Vec<Value>) -> Result<Vec<Value>> {
        let endpoint = Self::endpoint_path(api_name);
        let call_url = format!("{}/call/{}", self.api_base, endpoint);

        let response = self
            .http
            .post(&call_url)
            .json(&json!({ "data": args }))
            .send()
            .await?;
        let call: CallResponse = check_status(response).await?.json().await?;
        tracing::debug!("{} {} -> event {}", self.name, api_name, call.event_id);

        let response = self
            .http
            .get(format!("{}/{}", call_url, call.event_id))
            .send()
            .await?;
        let mut frames = SseStream::new(check_status(response).await?);

        while let Some(frame) = frames.next().await {
            let frame = frame?;
            match frame.event.as_deref() {
                Some("complete") => {
                    return match serde_json::from_str::<Value>(&frame.data)? {
                        Value::Array(outputs) => Ok(outputs),
                        other => Ok(vec![other]),
                    };
                }
                Some("error") => return Err(MayaError::Backend(error_message(&frame.data))),
                Some(other) => tracing::trace!("{} {}: '{}' event", self.name, api_name, other),
                None => {}
            }
        }

        Err(MayaError::Stream(format!(
            "{} {} ended without a result",
            self.name, api_name
        )))
    }

    async fn download(&self, file: &FileData) -> Result<Vec<u8>> {
        let url = match file.url.as_deref() {
            Some(url) if url.starts_with("data:") => return decode_data_url(url),
            Some(url) => url.to_string(),
            None => format!("{}/file={}", self.api_base, file.path),
        };

        let response = self.http.get(&url).send().await?;
        let bytes = check_status(response).await?.bytes().await?;
        tracing::debug!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }
}

/// Decode a base64 `data:` URL.
pub fn decode_data_url(url: &str) -> Result<Vec<u8>> {
    let (header, payload) = url
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(','))
        .ok_or_else(|| MayaError::MissingData("Malformed data URL".to_string()))?;
    if !header.ends_with(";base64") {
        return Ok(payload.as_bytes().to_vec());
    }
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| MayaError::MissingData(format!("Invalid base64 in data URL: {}", e)))
}
