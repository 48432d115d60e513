//! Settings schema definitions for Maya configuration.
//!
//! All settings structs use `#[serde(default)]` to allow partial configuration files.
//! Missing fields are filled with sensible defaults.

use serde::{Deserialize, Serialize};

use crate::rate_limit::RateLimitConfig;
use crate::retry::RetryPolicy;

/// Root settings structure for Maya.
///
/// Loaded from `~/.maya/settings.toml` with environment variable interpolation support.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MayaSettings {
    /// Schema version for migrations
    pub version: u32,

    /// Local game backend (server feature)
    pub server: ServerSettings,

    /// Where the CLI streams sessions from
    pub client: ClientSettings,

    /// Text -> image -> 3D pipeline
    pub pipeline: PipelineSettings,

    /// Per-user request limits on the generation endpoints
    pub rate_limit: RateLimitConfig,

    /// Advanced/debug settings
    pub advanced: AdvancedSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub port: u16,

    /// Base URL advertised in asset preview links. Defaults to the bound address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_base_url: Option<String>,

    /// Maximum remembered sessions
    pub max_sessions: usize,

    /// Directory generated assets are stored in. Defaults to `~/.maya/assets`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Game backend base URL
    pub base_url: String,

    /// Identifier sent with each request, used for rate limiting
    pub user_id: String,
}

/// Model space configuration.
///
/// Numeric generation parameters are kept loosely typed: a value that is
/// missing, non-numeric, or outside the backend's range falls back to that
/// backend's default when the pipeline starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Text-to-image space (`owner/name` or full URL)
    pub image_space: String,

    /// Endpoint on the image space
    pub image_api: String,

    pub image_width: u32,
    pub image_height: u32,
    pub image_steps: u32,

    /// Image-to-3D space (`owner/name` or full URL)
    pub model_space: String,

    /// Backend override: "instantmesh" | "hunyuan3d-2" | "hunyuan3d-2mini-turbo"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,

    /// Hugging Face token (supports $ENV_VAR syntax)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hf_token: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub guidance_scale: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub octree_resolution: Option<serde_json::Value>,

    /// Output directory for pipeline artifacts. Defaults to `~/.maya/assets`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_dir: Option<String>,

    /// Retry behaviour for each backend call
    pub retry: RetryPolicy,
}

/// Advanced/debug settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvancedSettings {
    /// Log level: "error" | "warn" | "info" | "debug" | "trace"
    pub log_level: String,
}

// =============================================================================
// Default implementations
// =============================================================================

impl Default for MayaSettings {
    fn default() -> Self {
        Self {
            version: 1,
            server: ServerSettings::default(),
            client: ClientSettings::default(),
            pipeline: PipelineSettings::default(),
            rate_limit: RateLimitConfig::default(),
            advanced: AdvancedSettings::default(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 8000,
            public_base_url: None,
            max_sessions: 100,
            asset_dir: None,
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            user_id: "default_user".to_string(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            image_space: "black-forest-labs/FLUX.1-schnell".to_string(),
            image_api: "/infer".to_string(),
            image_width: 1024,
            image_height: 1024,
            image_steps: 4,
            model_space: "TencentARC/InstantMesh".to_string(),
            backend: None,
            hf_token: Some("$HF_TOKEN".to_string()),
            steps: None,
            guidance_scale: None,
            seed: None,
            octree_resolution: None,
            asset_dir: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl Default for AdvancedSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
