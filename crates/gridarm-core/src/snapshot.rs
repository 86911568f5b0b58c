//! Camera snapshots handed to the decision-maker.

use crate::error::{CoreError, CoreResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One encoded camera frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// `image/png` or `image/jpeg`
    pub media_type: String,
    /// Base64 (standard alphabet, padded) image bytes
    pub data: String,
}

impl Snapshot {
    pub fn from_bytes(media_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            media_type: media_type.into(),
            data: STANDARD.encode(bytes),
        }
    }

    /// `data:` URI for OpenAI-style `image_url` parts.
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data)
    }
}

/// Produces the current view of the workspace.
pub trait SnapshotSource {
    fn capture(&mut self) -> CoreResult<Snapshot>;
}

/// Reads the latest frame an external camera process keeps writing to one path.
#[derive(Debug, Clone)]
pub struct FileSnapshotSource {
    path: PathBuf,
}

impl FileSnapshotSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn media_type_for(path: &Path) -> CoreResult<&'static str> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Ok("image/png"),
        "jpg" | "jpeg" => Ok("image/jpeg"),
        _ => Err(CoreError::Snapshot(format!(
            "unsupported image type for {} (expected .png, .jpg or .jpeg)",
            path.display()
        ))),
    }
}

impl SnapshotSource for FileSnapshotSource {
    fn capture(&mut self) -> CoreResult<Snapshot> {
        let media_type = media_type_for(&self.path)?;
        let bytes = std::fs::read(&self.path)
            .map_err(|e| CoreError::Snapshot(format!("{}: {}", self.path.display(), e)))?;
        if bytes.is_empty() {
            return Err(CoreError::Snapshot(format!("{} is empty", self.path.display())));
        }
        debug!(path = %self.path.display(), bytes = bytes.len(), "snapshot captured");
        Ok(Snapshot::from_bytes(media_type, &bytes))
    }
}
