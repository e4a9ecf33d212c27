//! In-memory snapshot store.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::{SnapshotStore, StoreError, StoredSnapshot};

#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    entries: Mutex<HashMap<String, StoredSnapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn get(&self, key: &str) -> Result<Option<StoredSnapshot>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, payload: &str, now_epoch: i64) -> Result<(), StoreError> {
        self.entries.lock().insert(
            key.to_string(),
            StoredSnapshot {
                payload: payload.to_string(),
                cached_at_epoch: now_epoch,
            },
        );
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}
