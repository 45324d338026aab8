use serde::{Deserialize, Serialize};

use crate::analyzer::hashing::TrackId;

/// Catalog data supplied when registering a track.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
    /// Caller-defined reference (video id, URL, catalog number...).
    pub external_ref: Option<String>,
    pub duration_secs: Option<f64>,
    /// Where the audio was read from, if it came from a local file.
    pub source_path: Option<String>,
}

impl TrackMetadata {
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            ..Default::default()
        }
    }
}

/// A track row read back from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackRecord {
    pub id: TrackId,
    pub title: String,
    pub artist: String,
    pub external_ref: Option<String>,
    pub duration_secs: Option<f64>,
}

impl TrackRecord {
    /// Human-readable name: "Title — Artist".
    pub fn display_name(&self) -> String {
        format!("{} — {}", self.title, self.artist)
    }
}

/// One stored occurrence of a hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StoredPoint {
    pub track_id: TrackId,
    pub anchor_time_offset: u32,
}

/// Catalog statistics.
#[derive(Debug)]
pub struct CatalogStats {
    pub total_tracks: i64,
    pub total_fingerprints: i64,
    pub distinct_hashes: i64,
    pub total_duration_hours: f64,
}
