//! Local artifact storage.
//!
//! Every write gets a unique `<prefix>_<YYYYmmdd_HHMMSS>_<8 hex>.<ext>` name,
//! so concurrent pipelines can share one directory. Every path is checked to
//! stay under the store root before any read or write, and each write is
//! announced on a broadcast channel.

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::error::{MayaError, Result};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Image,
    ProcessedImage,
    MultiView,
    Mesh,
    Other,
}

/// Notification sent after an artifact is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceChanged {
    /// `file://` URI of the written artifact
    pub uri: String,
    pub path: PathBuf,
    pub kind: ResourceKind,
}

/// Metadata for a stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAsset {
    pub filename: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct AssetStore {
    root: PathBuf,
    changes: broadcast::Sender<ResourceChanged>,
}

impl AssetStore {
    /// Create the root directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self { root, changes })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ResourceChanged> {
        self.changes.subscribe()
    }

    /// Resolve a relative path under the root, rejecting anything that
    /// could land outside it.
    pub fn resolve(&self, relative: &Path) -> Result<PathBuf> {
        let mut resolved = self.root.clone();
        let mut depth = 0usize;

        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    resolved.push(part);
                    depth += 1;
                }
                Component::CurDir => {}
                Component::ParentDir if depth > 0 => {
                    resolved.pop();
                    depth -= 1;
                }
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(MayaError::PathEscape(relative.to_path_buf()));
                }
            }
        }

        Ok(resolved)
    }

    /// Build a unique file name.
    pub fn unique_filename(prefix: &str, ext: &str) -> String {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!(
            "{}_{}_{}.{}",
            prefix,
            stamp,
            &suffix[..8],
            ext.trim_start_matches('.')
        )
    }

    /// Write bytes under `subdir` with a fresh unique name and announce it.
    pub async fn save(
        &self,
        subdir: Option<&str>,
        prefix: &str,
        ext: &str,
        kind: ResourceKind,
        bytes: &[u8],
    ) -> Result<StoredAsset> {
        let filename = Self::unique_filename(prefix, ext);
        let relative = match subdir {
            Some(dir) => Path::new(dir).join(&filename),
            None => PathBuf::from(&filename),
        };
        let path = self.resolve(&relative)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        tracing::info!("Saved {:?} artifact {:?} ({} bytes)", kind, path, bytes.len());

        let notice = ResourceChanged {
            uri: file_uri(&path),
            path: path.clone(),
            kind,
        };
        // No subscribers is fine
        let _ = self.changes.send(notice);

        Ok(StoredAsset {
            filename,
            path,
            size_bytes: bytes.len() as u64,
            created_at: Some(Utc::now()),
        })
    }

    /// Read a stored file.
    pub async fn read(&self, subdir: Option<&str>, filename: &str) -> Result<Vec<u8>> {
        let relative = match subdir {
            Some(dir) => Path::new(dir).join(filename),
            None => PathBuf::from(filename),
        };
        let path = self.resolve(&relative)?;
        Ok(tokio::fs::read(&path).await?)
    }

    /// Files directly under `subdir`, sorted by name. A missing directory
    /// lists as empty.
    pub async fn list(&self, subdir: Option<&str>) -> Result<Vec<StoredAsset>> {
        let dir = match subdir {
            Some(dir) => self.resolve(Path::new(dir))?,
            None => self.root.clone(),
        };

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut assets = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            assets.push(StoredAsset {
                filename: entry.file_name().to_string_lossy().into_owned(),
                path: entry.path(),
                size_bytes: metadata.len(),
                created_at: metadata.modified().ok().map(DateTime::<Utc>::from),
            });
        }
        assets.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(assets)
    }
}

fn file_uri(path: &Path) -> String {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    format!("file://{}", absolute.display())
}

/// Content type for a stored file, from its extension.
pub fn content_type_for(filename: &str) -> &'static str {
    let ext = Path::new(filename)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "glb" => "model/gltf-binary",
        "obj" => "model/obj",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}
