//! Centralized TOML-based settings system for Maya.
//!
//! Settings are loaded from `~/.maya/settings.toml` with environment variable
//! interpolation support. Environment variables still work as a fallback
//! through the `get_with_env_fallback` helper.
//!
//! # Usage
//!
//! ```rust,ignore
//! use maya_lib::settings::{SettingsManager, get_with_env_fallback};
//!
//! let manager = SettingsManager::new().await?;
//! let settings = manager.get().await;
//!
//! let token = get_with_env_fallback(
//!     &settings.pipeline.hf_token,
//!     &["HF_TOKEN", "HUGGING_FACE_HUB_TOKEN"],
//!     None,
//! );
//! ```

pub mod loader;
pub mod schema;

pub use loader::{expand_home, get_with_env_fallback, maya_dir, settings_path, SettingsManager};
pub use schema::{
    AdvancedSettings, ClientSettings, MayaSettings, PipelineSettings, ServerSettings,
};
