use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::db::models::TrackMetadata;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Entry {index}: {field} is required")]
    MissingField { index: usize, field: &'static str },
}

/// One song in an import manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    #[serde(default)]
    pub path: PathBuf,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default, alias = "youtube_id")]
    pub external_ref: Option<String>,
}

impl ManifestEntry {
    pub fn metadata(&self) -> TrackMetadata {
        TrackMetadata {
            title: self.title.clone(),
            artist: self.artist.clone(),
            external_ref: self.external_ref.clone().filter(|r| !r.is_empty()),
            duration_secs: None,
            source_path: Some(self.path.display().to_string()),
        }
    }
}

/// Parse a manifest: a JSON array of `{path, title, artist, external_ref?}`.
///
/// Relative paths resolve against the manifest's directory. Every entry must carry a
/// non-empty path, title and artist.
pub fn load_manifest(path: &Path) -> Result<Vec<ManifestEntry>, ManifestError> {
    let contents = std::fs::read_to_string(path)?;
    let base = path.parent().unwrap_or(Path::new("."));
    parse_manifest(&contents, base)
}

pub fn parse_manifest(json: &str, base: &Path) -> Result<Vec<ManifestEntry>, ManifestError> {
    let mut entries: Vec<ManifestEntry> = serde_json::from_str(json)?;

    for (index, e) in entries.iter_mut().enumerate() {
        if e.path.as_os_str().is_empty() {
            return Err(ManifestError::MissingField { index, field: "path" });
        }
        if e.title.trim().is_empty() {
            return Err(ManifestError::MissingField { index, field: "title" });
        }
        if e.artist.trim().is_empty() {
            return Err(ManifestError::MissingField { index, field: "artist" });
        }
        if e.path.is_relative() {
            e.path = base.join(&e.path);
        }
    }

    Ok(entries)
}
