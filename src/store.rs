use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::RwLock;

use thiserror::Error;

use crate::analyzer::hashing::{Fingerprint, TrackId};
use crate::db::DbError;
use crate::db::models::{StoredPoint, TrackMetadata, TrackRecord};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Db(#[from] DbError),
    #[error("Track {0} is not registered")]
    UnknownTrack(TrackId),
    #[error("Store lock poisoned")]
    Poisoned,
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Db(DbError::Sqlite(e))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Persistence contract for fingerprints and the track records they point at.
///
/// `put` must be idempotent per (hash, track, anchor) so a failed ingestion can be
/// retried as a whole. Once `put` returns, later `lookup` calls see the data.
pub trait FingerprintStore {
    /// Create or refresh a track record. Must precede `put` for that track.
    fn register_track(&self, id: TrackId, metadata: &TrackMetadata) -> Result<()>;

    /// Persist a batch of fingerprints.
    fn put(&self, fingerprints: &[Fingerprint]) -> Result<()>;

    /// Every supplied hash appears in the result; unknown ones map to an empty list.
    fn lookup(&self, hashes: &[u32]) -> Result<HashMap<u32, Vec<StoredPoint>>>;

    /// Delete a track and all of its fingerprints. Returns false if it did not exist.
    fn remove_track(&self, id: TrackId) -> Result<bool>;

    fn track(&self, id: TrackId) -> Result<Option<TrackRecord>>;
}

#[derive(Default)]
struct Inner {
    tracks: BTreeMap<TrackId, TrackMetadata>,
    index: HashMap<u32, BTreeSet<StoredPoint>>,
    hashes_by_track: HashMap<TrackId, HashSet<u32>>,
}

/// Process-local store. Each call holds the lock for its whole batch.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track_count(&self) -> Result<usize> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.tracks.len())
    }

    pub fn fingerprint_count(&self) -> Result<usize> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.index.values().map(|s| s.len()).sum())
    }
}

impl FingerprintStore for MemoryStore {
    fn register_track(&self, id: TrackId, metadata: &TrackMetadata) -> Result<()> {
        let mut inner = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        inner.tracks.insert(id, metadata.clone());
        Ok(())
    }

    fn put(&self, fingerprints: &[Fingerprint]) -> Result<()> {
        let mut inner = self.inner.write().map_err(|_| StoreError::Poisoned)?;

        // validate the whole batch before touching the index
        if let Some(fp) = fingerprints
            .iter()
            .find(|fp| !inner.tracks.contains_key(&fp.track_id))
        {
            return Err(StoreError::UnknownTrack(fp.track_id));
        }

        for fp in fingerprints {
            inner.index.entry(fp.hash).or_default().insert(StoredPoint {
                track_id: fp.track_id,
                anchor_time_offset: fp.anchor_time_offset,
            });
            inner
                .hashes_by_track
                .entry(fp.track_id)
                .or_default()
                .insert(fp.hash);
        }
        Ok(())
    }

    fn lookup(&self, hashes: &[u32]) -> Result<HashMap<u32, Vec<StoredPoint>>> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(hashes
            .iter()
            .map(|h| {
                let points = inner
                    .index
                    .get(h)
                    .map(|s| s.iter().copied().collect())
                    .unwrap_or_default();
                (*h, points)
            })
            .collect())
    }

    fn remove_track(&self, id: TrackId) -> Result<bool> {
        let mut inner = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        let existed = inner.tracks.remove(&id).is_some();

        if let Some(hashes) = inner.hashes_by_track.remove(&id) {
            for h in hashes {
                if let Some(points) = inner.index.get_mut(&h) {
                    points.retain(|p| p.track_id != id);
                    if points.is_empty() {
                        inner.index.remove(&h);
                    }
                }
            }
        }
        Ok(existed)
    }

    fn track(&self, id: TrackId) -> Result<Option<TrackRecord>> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.tracks.get(&id).map(|m| TrackRecord {
            id,
            title: m.title.clone(),
            artist: m.artist.clone(),
            external_ref: m.external_ref.clone(),
            duration_secs: m.duration_secs,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn fp(hash: u32, track: u32, anchor: u32) -> Fingerprint {
        Fingerprint {
            hash,
            track_id: TrackId(track),
            anchor_time_offset: anchor,
        }
    }

    #[test]
    fn test_put_requires_registered_track() {
        let store = MemoryStore::new();
        let err = store.put(&[fp(1, 9, 0)]).unwrap_err();
        assert!(matches!(err, StoreError::UnknownTrack(TrackId(9))));
    }

    #[test]
    fn test_lookup_returns_every_requested_hash() {
        let store = MemoryStore::new();
        store.register_track(TrackId(1), &TrackMetadata::new("A", "X")).unwrap();
        store.put(&[fp(10, 1, 3), fp(10, 1, 8), fp(11, 1, 4)]).unwrap();

        let hits = store.lookup(&[10, 99]).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[&10].len(), 2);
        assert!(hits[&99].is_empty());
    }

    #[test]
    fn test_put_is_idempotent() {
        let store = MemoryStore::new();
        store.register_track(TrackId(1), &TrackMetadata::new("A", "X")).unwrap();
        let batch = vec![fp(10, 1, 3), fp(11, 1, 4)];
        store.put(&batch).unwrap();
        let first = store.lookup(&[10, 11]).unwrap();
        store.put(&batch).unwrap();
        assert_eq!(store.lookup(&[10, 11]).unwrap(), first);
        assert_eq!(store.fingerprint_count().unwrap(), 2);
    }

    #[test]
    fn test_remove_track_leaves_others() {
        let store = MemoryStore::new();
        store.register_track(TrackId(1), &TrackMetadata::new("A", "X")).unwrap();
        store.register_track(TrackId(2), &TrackMetadata::new("B", "Y")).unwrap();
        store.put(&[fp(10, 1, 3), fp(10, 2, 5), fp(12, 1, 1)]).unwrap();

        assert!(store.remove_track(TrackId(1)).unwrap());
        assert!(!store.remove_track(TrackId(1)).unwrap());

        let hits = store.lookup(&[10, 12]).unwrap();
        assert_eq!(hits[&10], vec![StoredPoint { track_id: TrackId(2), anchor_time_offset: 5 }]);
        assert!(hits[&12].is_empty());
        assert!(store.track(TrackId(1)).unwrap().is_none());
        assert_eq!(store.track(TrackId(2)).unwrap().unwrap().title, "B");
    }

    #[test]
    fn test_concurrent_puts_for_different_tracks() {
        let store = Arc::new(MemoryStore::new());
        let handles: Vec<_> = (1..=4u32)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .register_track(TrackId(t), &TrackMetadata::new(format!("T{t}"), "X"))
                        .unwrap();
                    let batch: Vec<Fingerprint> = (0..100).map(|i| fp(i, t, i * t)).collect();
                    store.put(&batch).unwrap();
                    store.lookup(&[0, 1, 2]).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(store.track_count().unwrap(), 4);
        assert_eq!(store.fingerprint_count().unwrap(), 400);
        let hits = store.lookup(&[50]).unwrap();
        assert_eq!(hits[&50].len(), 4);
    }
}
