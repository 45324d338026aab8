pub mod models;
pub mod queries;

use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration failed: {0}")]
    Migration(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// How long a writer waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Current schema version (stored in `PRAGMA user_version`).
const SCHEMA_VERSION: i32 = 2;

pub struct Database {
    pub conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        // WAL mode lets lookups run alongside another connection's writes
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        self.conn.busy_timeout(BUSY_TIMEOUT)?;
        self.migrate()?;
        Ok(())
    }

    fn migrate(&self) -> Result<()> {
        let version: i32 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);

        if version > SCHEMA_VERSION {
            return Err(DbError::Migration(format!(
                "database schema v{version} is newer than this build (v{SCHEMA_VERSION})"
            )));
        }
        if version < 1 {
            self.migrate_v1()?;
        }
        if version < 2 {
            self.migrate_v2()?;
        }

        self.conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(())
    }

    /// V1: tracks + fingerprint index
    fn migrate_v1(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS tracks (
                id              INTEGER PRIMARY KEY,
                title           TEXT NOT NULL,
                artist          TEXT NOT NULL,
                external_ref    TEXT,
                duration_secs   REAL,

                created_at      TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_tracks_key ON tracks(title, artist);

            CREATE TABLE IF NOT EXISTS fingerprints (
                hash            INTEGER NOT NULL,
                track_id        INTEGER NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
                anchor_offset   INTEGER NOT NULL,
                PRIMARY KEY (hash, track_id, anchor_offset)
            ) WITHOUT ROWID;

            CREATE INDEX IF NOT EXISTS idx_fingerprints_track ON fingerprints(track_id);
            ",
        )?;
        Ok(())
    }

    /// V2: remember where a track's audio came from
    fn migrate_v2(&self) -> Result<()> {
        try_add_column(&self.conn, "tracks", "source_path TEXT")
    }
}

/// Helper: try to add a column, ignore if it already exists.
fn try_add_column(conn: &Connection, table: &str, column_def: &str) -> Result<()> {
    let sql = format!("ALTER TABLE {table} ADD COLUMN {column_def}");
    match conn.execute(&sql, []) {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(_, Some(msg))) if msg.contains("duplicate column") => {
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.db");
        {
            let db = Database::open(&path).unwrap();
            db.conn
                .execute("INSERT INTO tracks (id, title, artist) VALUES (1, 'a', 'b')", [])
                .unwrap();
        }
        let db = Database::open(&path).unwrap();
        let version: i32 = db
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
        let count: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM tracks", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_rejects_newer_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.db");
        {
            let db = Database::open(&path).unwrap();
            db.conn.pragma_update(None, "user_version", 99).unwrap();
        }
        assert!(matches!(Database::open(&path), Err(DbError::Migration(_))));
    }
}
