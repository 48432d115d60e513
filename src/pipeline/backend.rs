//! Image-to-3D backend detection.
//!
//! Detection runs once per pipeline, in order:
//!
//! 1. Manual override from settings
//! 2. Endpoint signatures from the space's API listing (bounded lookup)
//! 3. Substring match on the declared space name
//!
//! There is no default: parameter shapes differ per backend, so an
//! unrecognized space is an error.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::client::SpaceClient;
use crate::error::{MayaError, Result};

/// Ceiling for the endpoint listing lookup.
pub const ENDPOINT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    #[serde(rename = "instantmesh")]
    InstantMesh,
    #[serde(rename = "hunyuan3d-2")]
    Hunyuan3D2,
    #[serde(rename = "hunyuan3d-2mini-turbo")]
    Hunyuan3D2MiniTurbo,
}

impl BackendKind {
    /// Parse a settings override. Case and separators are ignored.
    pub fn from_override(value: &str) -> Option<Self> {
        let normalized: String = value
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "instantmesh" => Some(BackendKind::InstantMesh),
            "hunyuan3d2" | "hunyuan" => Some(BackendKind::Hunyuan3D2),
            "hunyuan3d2miniturbo" | "miniturbo" | "turbo" => Some(BackendKind::Hunyuan3D2MiniTurbo),
            _ => None,
        }
    }

    /// Match on endpoint signatures. Mini-Turbo is checked first because it
    /// also exposes `/generation_all`.
    pub fn from_endpoints(endpoints: &[String]) -> Option<Self> {
        let has = |name: &str| endpoints.iter().any(|e| e == name);

        if has("/on_gen_mode_change") {
            Some(BackendKind::Hunyuan3D2MiniTurbo)
        } else if has("/check_input_image") && (has("/make3d") || has("/generate_mvs")) {
            Some(BackendKind::InstantMesh)
        } else if has("/generation_all") || has("/shape_generation") {
            Some(BackendKind::Hunyuan3D2)
        } else {
            None
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_lowercase();
        if lower.contains("instantmesh") {
            Some(BackendKind::InstantMesh)
        } else if lower.contains("mini") && lower.contains("turbo") {
            Some(BackendKind::Hunyuan3D2MiniTurbo)
        } else if lower.contains("hunyuan3d-2") {
            Some(BackendKind::Hunyuan3D2)
        } else {
            None
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BackendKind::InstantMesh => "InstantMesh",
            BackendKind::Hunyuan3D2 => "Hunyuan3D-2",
            BackendKind::Hunyuan3D2MiniTurbo => "Hunyuan3D-2mini-Turbo",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    Override,
    Endpoints,
    Name,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    Detected {
        kind: BackendKind,
        via: DetectionSource,
    },
    Unknown,
}

impl Detection {
    pub fn into_result(self, space: &str) -> Result<BackendKind> {
        match self {
            Detection::Detected { kind, .. } => Ok(kind),
            Detection::Unknown => Err(MayaError::UnknownBackend(space.to_string())),
        }
    }
}

/// Work out which backend a space runs.
pub async fn detect_backend(override_value: Option<&str>, client: &dyn SpaceClient) -> Detection {
    if let Some(value) = override_value.filter(|v| !v.trim().is_empty()) {
        match BackendKind::from_override(value) {
            Some(kind) => {
                tracing::info!("Using backend override: {}", kind);
                return Detection::Detected {
                    kind,
                    via: DetectionSource::Override,
                };
            }
            None => tracing::warn!("Ignoring unrecognized backend override '{}'", value),
        }
    }

    match tokio::time::timeout(ENDPOINT_LOOKUP_TIMEOUT, client.endpoints()).await {
        Ok(Ok(endpoints)) => {
            tracing::debug!("{} exposes {:?}", client.name(), endpoints);
            if let Some(kind) = BackendKind::from_endpoints(&endpoints) {
                tracing::info!("Detected {} from endpoints of {}", kind, client.name());
                return Detection::Detected {
                    kind,
                    via: DetectionSource::Endpoints,
                };
            }
        }
        Ok(Err(e)) => tracing::warn!("Endpoint listing of {} failed: {}", client.name(), e),
        Err(_) => tracing::warn!(
            "Endpoint listing of {} timed out after {}s",
            client.name(),
            ENDPOINT_LOOKUP_TIMEOUT.as_secs()
        ),
    }

    match BackendKind::from_name(client.name()) {
        Some(kind) => {
            tracing::info!("Detected {} from space name {}", kind, client.name());
            Detection::Detected {
                kind,
                via: DetectionSource::Name,
            }
        }
        None => {
            tracing::error!("Could not detect backend for {}", client.name());
            Detection::Unknown
        }
    }
}
