//! SQLite persistence for snapshots, so the last known-good state survives restarts.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};

use crate::{SnapshotStore, StoreError, StoredSnapshot};

/// SQLite-backed snapshot store. The connection is serialized behind a mutex,
/// so concurrent writers never interleave (last writer wins).
pub struct SqliteSnapshotStore {
    conn: Mutex<Connection>,
}

impl SqliteSnapshotStore {
    /// Open (or create) a database at the given filesystem path and run migrations.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Open an in-memory database. Useful for testing.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS snapshots (
                key        TEXT PRIMARY KEY,
                payload    TEXT NOT NULL,
                cached_at  INTEGER NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl SnapshotStore for SqliteSnapshotStore {
    fn get(&self, key: &str) -> Result<Option<StoredSnapshot>, StoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT payload, cached_at FROM snapshots WHERE key = ?1",
                params![key],
                |row| {
                    Ok(StoredSnapshot {
                        payload: row.get(0)?,
                        cached_at_epoch: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    fn set(&self, key: &str, payload: &str, now_epoch: i64) -> Result<(), StoreError> {
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO snapshots (key, payload, cached_at) VALUES (?1, ?2, ?3)",
            params![key, payload, now_epoch],
        )?;
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), StoreError> {
        self.conn
            .lock()
            .execute("DELETE FROM snapshots WHERE key = ?1", params![key])?;
        Ok(())
    }
}
