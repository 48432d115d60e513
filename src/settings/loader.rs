//! Settings loading, saving, and environment variable interpolation.
//!
//! The `SettingsManager` handles:
//! - Loading settings from `~/.maya/settings.toml`
//! - Resolving `$VAR` and `${VAR}` references in secret and path fields
//! - Atomic file writes with temp file + rename
//! - First-run template generation

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tokio::sync::RwLock;

use super::schema::MayaSettings;

/// Embedded template for first-run generation.
const TEMPLATE: &str = include_str!("template.toml");

/// `~/.maya`, or `./.maya` when no home directory is known.
pub fn maya_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".maya")
}

/// Get the path to the global settings file.
pub fn settings_path() -> PathBuf {
    maya_dir().join("settings.toml")
}

/// Expand a leading `~/` in a configured path.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest),
        None => PathBuf::from(path),
    }
}

/// Manages settings loading, interpolation, and persistence.
pub struct SettingsManager {
    /// Cached settings (with env vars resolved)
    settings: RwLock<MayaSettings>,

    path: PathBuf,
}

impl SettingsManager {
    /// Load from `~/.maya/settings.toml`.
    pub async fn new() -> Result<Self> {
        Self::with_path(settings_path()).await
    }

    /// Load from an explicit path. A missing file yields defaults.
    pub async fn with_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let settings = load_from_path(&path).await?;
        Ok(Self {
            settings: RwLock::new(settings),
            path,
        })
    }

    /// Get the current settings (read-only).
    pub async fn get(&self) -> MayaSettings {
        self.settings.read().await.clone()
    }

    /// Replace the settings and persist them.
    pub async fn update(&self, new_settings: MayaSettings) -> Result<()> {
        let toml_string =
            toml::to_string_pretty(&new_settings).context("Failed to serialize settings")?;
        *self.settings.write().await = new_settings;
        write_atomic(&self.path, &toml_string).await?;
        tracing::info!("Saved settings to {:?}", self.path);
        Ok(())
    }

    /// Read one setting by dot path, e.g. `pipeline.model_space`.
    pub async fn get_value(&self, key: &str) -> Result<serde_json::Value> {
        let json = serde_json::to_value(&*self.settings.read().await)?;
        key.split('.')
            .try_fold(&json, |node, part| node.get(part))
            .cloned()
            .with_context(|| format!("Setting '{}' not found", key))
    }

    /// Write one setting by dot path and persist.
    pub async fn set_value(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let mut json = serde_json::to_value(&*self.settings.read().await)?;
        set_nested_value(&mut json, key, value)?;
        let updated: MayaSettings =
            serde_json::from_value(json).with_context(|| format!("Invalid value for '{}'", key))?;
        self.update(updated).await
    }

    /// Reset to defaults and persist.
    pub async fn reset(&self) -> Result<()> {
        self.update(MayaSettings::default()).await
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the commented template if no settings file exists yet.
    ///
    /// Returns `true` if a new file was created.
    pub async fn ensure_settings_file(&self) -> Result<bool> {
        if self.path.exists() {
            return Ok(false);
        }
        write_atomic(&self.path, TEMPLATE).await?;
        tracing::info!("Generated settings template at {:?}", self.path);
        Ok(true)
    }

    /// Reload settings from disk.
    pub async fn reload(&self) -> Result<()> {
        let settings = load_from_path(&self.path).await?;
        *self.settings.write().await = settings;
        Ok(())
    }
}

async fn load_from_path(path: &Path) -> Result<MayaSettings> {
    if !path.exists() {
        tracing::debug!("Settings file not found at {:?}, using defaults", path);
        return Ok(MayaSettings::default());
    }

    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read settings file {:?}", path))?;
    let mut settings: MayaSettings =
        toml::from_str(&contents).context("Failed to deserialize settings")?;
    resolve_env_vars(&mut settings);

    tracing::info!("Loaded settings from {:?}", path);
    Ok(settings)
}

async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {:?}", parent))?;
    }
    let temp_path = path.with_extension("toml.tmp");
    tokio::fs::write(&temp_path, contents).await?;
    tokio::fs::rename(&temp_path, path).await?;
    Ok(())
}

/// Resolve `$VAR` references in the fields that may hold secrets or paths.
fn resolve_env_vars(settings: &mut MayaSettings) {
    let fields = [
        &mut settings.pipeline.hf_token,
        &mut settings.pipeline.asset_dir,
        &mut settings.server.asset_dir,
        &mut settings.server.public_base_url,
    ];
    for field in fields {
        if let Some(value) = field.as_mut() {
            if let Some(resolved) = resolve_env_ref(value) {
                *value = resolved;
            } else if value.trim_start().starts_with('$') {
                // Referenced variable is unset
                *field = None;
            }
        }
    }
}

fn set_nested_value(json: &mut serde_json::Value, key: &str, value: serde_json::Value) -> Result<()> {
    let (parents, leaf) = key.rsplit_once('.').unwrap_or(("", key));
    if leaf.is_empty() {
        bail!("Empty key path");
    }

    let mut node = json;
    if !parents.is_empty() {
        for part in parents.split('.') {
            node = node
                .get_mut(part)
                .with_context(|| format!("Setting path '{}' not found", key))?;
        }
    }

    match node.as_object_mut() {
        Some(object) => {
            object.insert(leaf.to_string(), value);
            Ok(())
        }
        None => bail!("Cannot set '{}': parent is not a table", key),
    }
}

/// Resolve a `$VAR` or `${VAR}` reference.
///
/// `None` when the value is not a reference or the variable is unset.
fn resolve_env_ref(value: &str) -> Option<String> {
    let reference = value.trim().strip_prefix('$')?;
    let name = reference
        .strip_prefix('{')
        .and_then(|inner| inner.strip_suffix('}'))
        .unwrap_or(reference);
    std::env::var(name).ok()
}

/// Setting value if non-empty, else the first non-empty env var, else `default`.
pub fn get_with_env_fallback(
    setting: &Option<String>,
    env_vars: &[&str],
    default: Option<String>,
) -> Option<String> {
    setting
        .as_ref()
        .filter(|v| !v.is_empty())
        .cloned()
        .or_else(|| {
            env_vars
                .iter()
                .filter_map(|name| std::env::var(name).ok())
                .find(|v| !v.is_empty())
        })
        .or(default)
}
