//! Per-backend generation parameters.
//!
//! Each backend accepts its own ranges. Configured values arrive loosely
//! typed (from TOML); anything absent, non-numeric or out of range is
//! replaced by the backend's default rather than clamped to the nearest
//! bound.

use serde::Serialize;
use serde_json::Value;

use super::backend::BackendKind;
use crate::settings::PipelineSettings;

/// Inclusive numeric range with a default.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParamRange {
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

impl ParamRange {
    pub const fn new(min: f64, max: f64, default: f64) -> Self {
        Self { min, max, default }
    }

    /// The configured value if it is a usable number in range, else the default.
    pub fn resolve(&self, raw: Option<&Value>) -> f64 {
        match raw.and_then(as_number) {
            Some(n) if n.is_finite() && n >= self.min && n <= self.max => n,
            Some(n) => {
                tracing::warn!(
                    "Parameter {} outside [{}, {}], using default {}",
                    n,
                    self.min,
                    self.max,
                    self.default
                );
                self.default
            }
            None => {
                if let Some(value) = raw {
                    tracing::warn!(
                        "Parameter {} is not numeric, using default {}",
                        value,
                        self.default
                    );
                }
                self.default
            }
        }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Valid ranges for one backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BackendRanges {
    pub steps: ParamRange,
    pub guidance_scale: ParamRange,
    pub seed: ParamRange,
    pub octree_resolution: ParamRange,
}

const SEED_MAX: f64 = u32::MAX as f64;

pub fn ranges(kind: BackendKind) -> BackendRanges {
    match kind {
        BackendKind::InstantMesh => BackendRanges {
            steps: ParamRange::new(30.0, 75.0, 75.0),
            guidance_scale: ParamRange::new(1.0, 20.0, 5.0),
            seed: ParamRange::new(0.0, SEED_MAX, 42.0),
            octree_resolution: ParamRange::new(16.0, 512.0, 256.0),
        },
        BackendKind::Hunyuan3D2 => BackendRanges {
            steps: ParamRange::new(1.0, 100.0, 50.0),
            guidance_scale: ParamRange::new(1.0, 20.0, 5.0),
            seed: ParamRange::new(0.0, SEED_MAX, 1234.0),
            octree_resolution: ParamRange::new(16.0, 512.0, 256.0),
        },
        BackendKind::Hunyuan3D2MiniTurbo => BackendRanges {
            steps: ParamRange::new(1.0, 100.0, 5.0),
            guidance_scale: ParamRange::new(1.0, 20.0, 5.0),
            seed: ParamRange::new(0.0, SEED_MAX, 1234.0),
            octree_resolution: ParamRange::new(16.0, 512.0, 256.0),
        },
    }
}

/// Raw, loosely typed parameter values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawParams {
    pub steps: Option<Value>,
    pub guidance_scale: Option<Value>,
    pub seed: Option<Value>,
    pub octree_resolution: Option<Value>,
}

impl From<&PipelineSettings> for RawParams {
    fn from(settings: &PipelineSettings) -> Self {
        Self {
            steps: settings.steps.clone(),
            guidance_scale: settings.guidance_scale.clone(),
            seed: settings.seed.clone(),
            octree_resolution: settings.octree_resolution.clone(),
        }
    }
}

/// Parameters ready to send to a backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResolvedParams {
    pub steps: u32,
    pub guidance_scale: f64,
    pub seed: u64,
    pub octree_resolution: u32,
}

pub fn resolve_params(kind: BackendKind, raw: &RawParams) -> ResolvedParams {
    let ranges = ranges(kind);
    ResolvedParams {
        steps: ranges.steps.resolve(raw.steps.as_ref()).round() as u32,
        guidance_scale: ranges.guidance_scale.resolve(raw.guidance_scale.as_ref()),
        seed: ranges.seed.resolve(raw.seed.as_ref()).round() as u64,
        octree_resolution: ranges
            .octree_resolution
            .resolve(raw.octree_resolution.as_ref())
            .round() as u32,
    }
}
