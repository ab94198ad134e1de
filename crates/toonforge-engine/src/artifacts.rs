use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

const UPLOADS_SEGMENT: &str = "uploads";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    /// Public reference, e.g. `/uploads/<uuid>.png`.
    pub reference: String,
    pub path: PathBuf,
    pub media_type: String,
    pub sha256: String,
    pub bytes: usize,
}

impl StoredArtifact {
    pub fn describe(&self) -> Map<String, Value> {
        let value = json!({
            "reference": self.reference,
            "path": self.path.to_string_lossy(),
            "media_type": self.media_type,
            "sha256": self.sha256,
            "bytes": self.bytes,
        });
        value.as_object().cloned().unwrap_or_default()
    }
}

/// Binary storage for generated images. Every `store` call yields a fresh
/// reference; nothing is overwritten.
pub trait ArtifactStore: Send + Sync {
    fn store(&self, bytes: &[u8], media_type: &str) -> Result<StoredArtifact>;
    /// Best-effort removal of an artifact whose generation was never persisted.
    fn discard(&self, artifact: &StoredArtifact) -> Result<()>;
}

/// Writes artifacts under `<public_dir>/uploads/`.
#[derive(Debug, Clone)]
pub struct UploadDir {
    public_dir: PathBuf,
}

impl UploadDir {
    pub fn new(public_dir: impl Into<PathBuf>) -> Self {
        Self {
            public_dir: public_dir.into(),
        }
    }

    pub fn dir(&self) -> PathBuf {
        self.public_dir.join(UPLOADS_SEGMENT)
    }
}

impl ArtifactStore for UploadDir {
    fn store(&self, bytes: &[u8], media_type: &str) -> Result<StoredArtifact> {
        let dir = self.dir();
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
        let ext = extension_for(Some(media_type), bytes);
        let file_name = format!("{}.{ext}", Uuid::new_v4());
        let path = dir.join(&file_name);
        fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;

        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Ok(StoredArtifact {
            reference: format!("/{UPLOADS_SEGMENT}/{file_name}"),
            path,
            media_type: media_type.to_string(),
            sha256: hex::encode(hasher.finalize()),
            bytes: bytes.len(),
        })
    }

    fn discard(&self, artifact: &StoredArtifact) -> Result<()> {
        match fs::remove_file(&artifact.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("failed to remove {}", artifact.path.display()))
            }
        }
    }
}

/// Picks a file extension from the declared media type, then from the image
/// signature, then defaults to `png`.
pub fn extension_for(media_type: Option<&str>, bytes: &[u8]) -> &'static str {
    if let Some(mime) = media_type {
        let lowered = mime.to_ascii_lowercase();
        if lowered.contains("jpeg") || lowered.contains("jpg") {
            return "jpg";
        }
        if lowered.contains("webp") {
            return "webp";
        }
        if lowered.contains("gif") {
            return "gif";
        }
        if lowered.contains("png") {
            return "png";
        }
    }
    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Jpeg) => "jpg",
        Ok(image::ImageFormat::WebP) => "webp",
        Ok(image::ImageFormat::Gif) => "gif",
        _ => "png",
    }
}

/// Media type for a reference image on disk, by extension.
pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}
