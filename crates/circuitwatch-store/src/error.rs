//! Error types for snapshot persistence.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("snapshot store unavailable: {0}")]
    Unavailable(String),
}
