pub mod manifest;

use crate::SUPPORTED_EXTENSIONS;
use crate::db::models::TrackMetadata;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Collect decodable audio files under `paths`, sorted for a stable ingestion order.
pub fn collect_audio_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();

    for path in paths {
        for entry in WalkDir::new(path).follow_links(true).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            if is_supported(entry.path()) {
                files.push(entry.into_path());
            }
        }
    }

    files.sort();
    files.dedup();
    log::info!("Found {} audio files", files.len());
    files
}

pub fn is_supported(path: &Path) -> bool {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    SUPPORTED_EXTENSIONS.contains(&ext.as_str())
}

/// Guess title/artist from a file name.
///
/// "Artist - Title.wav" splits on the first " - "; anything else becomes the title
/// with an "Unknown" artist. Underscores read as spaces.
pub fn metadata_from_filename(path: &Path) -> TrackMetadata {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .replace('_', " ");
    let stem = stem.trim();

    let (artist, title) = match stem.split_once(" - ") {
        Some((a, t)) if !a.trim().is_empty() && !t.trim().is_empty() => (a.trim(), t.trim()),
        _ => ("Unknown", stem),
    };

    TrackMetadata {
        title: title.to_string(),
        artist: artist.to_string(),
        source_path: Some(path.display().to_string()),
        ..Default::default()
    }
}
