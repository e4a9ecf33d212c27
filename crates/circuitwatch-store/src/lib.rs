//! circuitwatch-store: persisted last-known-good snapshots.
//! A small key-value seam ([`SnapshotStore`]) with a SQLite backend for
//! devices and an in-memory backend for tests and ephemeral runs.
//! Single-key replace is atomic; there are no multi-key transactions.

pub mod error;
pub mod memory;
pub mod sqlite;

pub use error::StoreError;
pub use memory::MemorySnapshotStore;
pub use sqlite::SqliteSnapshotStore;

use std::sync::Arc;

/// Payload plus the epoch second it was captured at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSnapshot {
    /// Serialized value (JSON text).
    pub payload: String,
    pub cached_at_epoch: i64,
}

impl StoredSnapshot {
    pub fn age_secs(&self, now_epoch: i64) -> i64 {
        now_epoch.saturating_sub(self.cached_at_epoch)
    }
}

/// Local snapshot persistence. Enables fake injection for testing.
pub trait SnapshotStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<StoredSnapshot>, StoreError>;

    /// Replace whatever is stored under `key`.
    fn set(&self, key: &str, payload: &str, now_epoch: i64) -> Result<(), StoreError>;

    /// Remove the entry. Clearing a missing key is not an error.
    fn clear(&self, key: &str) -> Result<(), StoreError>;
}

impl<T: SnapshotStore + ?Sized> SnapshotStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<StoredSnapshot>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, payload: &str, now_epoch: i64) -> Result<(), StoreError> {
        (**self).set(key, payload, now_epoch)
    }

    fn clear(&self, key: &str) -> Result<(), StoreError> {
        (**self).clear(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_from_epoch() {
        let snap = StoredSnapshot {
            payload: "{}".into(),
            cached_at_epoch: 100,
        };
        assert_eq!(snap.age_secs(110), 10);
    }

    #[test]
    fn arc_forwards_to_inner() {
        let store: Arc<dyn SnapshotStore> = Arc::new(MemorySnapshotStore::new());
        store.set("k", "v", 1).expect("set");
        let got = store.get("k").expect("get").expect("present");
        assert_eq!(got.payload, "v");
    }
}
