use std::collections::{BTreeSet, HashMap};

use super::models::{CatalogStats, StoredPoint, TrackMetadata, TrackRecord};
use super::{Database, Result};
use crate::analyzer::hashing::{Fingerprint, TrackId};
use crate::store::{self, FingerprintStore, StoreError};
use rusqlite::params;

fn track_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TrackRecord> {
    Ok(TrackRecord {
        id: TrackId(row.get(0)?),
        title: row.get(1)?,
        artist: row.get(2)?,
        external_ref: row.get(3)?,
        duration_secs: row.get(4)?,
    })
}

impl Database {
    /// Smallest unused track id above every existing one.
    pub fn next_track_id(&self) -> Result<TrackId> {
        let id: u32 = self.conn.query_row(
            "SELECT COALESCE(MAX(id), 0) + 1 FROM tracks",
            [],
            |row| row.get(0),
        )?;
        Ok(TrackId(id))
    }

    /// Find a track by its (title, artist) key.
    pub fn find_track_by_key(&self, title: &str, artist: &str) -> Result<Option<TrackRecord>> {
        let result = self.conn.query_row(
            "SELECT id, title, artist, external_ref, duration_secs
             FROM tracks WHERE title = ?1 AND artist = ?2",
            params![title, artist],
            track_from_row,
        );

        match result {
            Ok(t) => Ok(Some(t)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All tracks with their fingerprint counts, ordered by id.
    pub fn list_tracks(&self) -> Result<Vec<(TrackRecord, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.id, t.title, t.artist, t.external_ref, t.duration_secs,
                    (SELECT COUNT(*) FROM fingerprints f WHERE f.track_id = t.id)
             FROM tracks t
             ORDER BY t.id",
        )?;

        let tracks = stmt
            .query_map([], |row| Ok((track_from_row(row)?, row.get(5)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(tracks)
    }

    /// Get catalog statistics.
    pub fn stats(&self) -> Result<CatalogStats> {
        let total_tracks: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM tracks", [], |row| row.get(0))?;

        let total_fingerprints: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM fingerprints", [], |row| row.get(0))?;

        let distinct_hashes: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT hash) FROM fingerprints",
            [],
            |row| row.get(0),
        )?;

        let total_duration_hours: f64 = self.conn.query_row(
            "SELECT COALESCE(SUM(duration_secs), 0.0) / 3600.0 FROM tracks",
            [],
            |row| row.get(0),
        )?;

        Ok(CatalogStats {
            total_tracks,
            total_fingerprints,
            distinct_hashes,
            total_duration_hours,
        })
    }

    fn track_exists(conn: &rusqlite::Connection, id: TrackId) -> Result<bool> {
        let found: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tracks WHERE id = ?1",
            params![id.0],
            |row| row.get(0),
        )?;
        Ok(found > 0)
    }
}

impl FingerprintStore for Database {
    fn register_track(&self, id: TrackId, m: &TrackMetadata) -> store::Result<()> {
        self.conn.execute(
            "INSERT INTO tracks (
                id, title, artist, external_ref, duration_secs, source_path, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, datetime('now'))
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                artist = excluded.artist,
                external_ref = excluded.external_ref,
                duration_secs = excluded.duration_secs,
                source_path = excluded.source_path,
                updated_at = datetime('now')
            ",
            params![
                id.0,
                m.title,
                m.artist,
                m.external_ref,
                m.duration_secs,
                m.source_path,
            ],
        )?;
        Ok(())
    }

    /// Writes the whole batch in one transaction.
    fn put(&self, fingerprints: &[Fingerprint]) -> store::Result<()> {
        if fingerprints.is_empty() {
            return Ok(());
        }

        let tx = self.conn.unchecked_transaction()?;

        let track_ids: BTreeSet<TrackId> = fingerprints.iter().map(|f| f.track_id).collect();
        for id in track_ids {
            if !Self::track_exists(&tx, id)? {
                return Err(StoreError::UnknownTrack(id));
            }
        }

        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO fingerprints (hash, track_id, anchor_offset)
                 VALUES (?1, ?2, ?3)",
            )?;
            for f in fingerprints {
                stmt.execute(params![f.hash, f.track_id.0, f.anchor_time_offset])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn lookup(&self, hashes: &[u32]) -> store::Result<HashMap<u32, Vec<StoredPoint>>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT track_id, anchor_offset FROM fingerprints
             WHERE hash = ?1
             ORDER BY track_id, anchor_offset",
        )?;

        let mut result = HashMap::with_capacity(hashes.len());
        for &hash in hashes {
            if result.contains_key(&hash) {
                continue;
            }
            let points = stmt
                .query_map(params![hash], |row| {
                    Ok(StoredPoint {
                        track_id: TrackId(row.get(0)?),
                        anchor_time_offset: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            result.insert(hash, points);
        }

        Ok(result)
    }

    fn remove_track(&self, id: TrackId) -> store::Result<bool> {
        // fingerprints go with it via ON DELETE CASCADE
        let deleted = self
            .conn
            .execute("DELETE FROM tracks WHERE id = ?1", params![id.0])?;
        Ok(deleted > 0)
    }

    fn track(&self, id: TrackId) -> store::Result<Option<TrackRecord>> {
        let result = self.conn.query_row(
            "SELECT id, title, artist, external_ref, duration_secs
             FROM tracks WHERE id = ?1",
            params![id.0],
            track_from_row,
        );

        match result {
            Ok(t) => Ok(Some(t)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
