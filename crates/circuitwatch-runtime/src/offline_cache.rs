//! Offline-first cache: live value when healthy, last persisted snapshot
//! (marked stale) when not, degraded default when nothing was ever cached.
//!
//! A snapshot is written only after a successful, non-degraded read that its
//! source marks as durable. Values derived from the local beacon are served
//! live but never written, so nothing anonymous outlives the session.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use circuitwatch_core::{Cached, CircuitState, Degradable, Freshness, GroupMemberLocation};
use circuitwatch_source_cloud::{CloudError, NetworkRosterPoller, NetworkStatePoller};
use circuitwatch_store::{SnapshotStore, StoreError, StoredSnapshot};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Default delay between refresh cycles (seconds).
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 5;

/// Snapshot key for the arbitrated circuit state written by `run`.
pub const STATE_CACHE_KEY: &str = "circuit_state";

/// Snapshot key for direct network reads of the circuit state (`status`).
pub const NETWORK_STATE_CACHE_KEY: &str = "circuit_state:network";

/// Snapshot key for a group's roster.
pub fn roster_cache_key(group_id: &str) -> String {
    format!("roster:{group_id}")
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error("source stream closed")]
    Closed,
}

/// One value read by a [`CacheSource`].
#[derive(Debug, Clone, PartialEq)]
pub struct Reading<T> {
    pub value: T,
    /// `false` when the value may be served but must not be written to disk.
    pub durable: bool,
}

impl<T> Reading<T> {
    pub fn durable(value: T) -> Self {
        Self {
            value,
            durable: true,
        }
    }

    pub fn ephemeral(value: T) -> Self {
        Self {
            value,
            durable: false,
        }
    }
}

/// One read per refresh cycle. Enables fake injection for testing.
#[async_trait]
pub trait CacheSource<T>: Send + Sync {
    async fn read_once(&self) -> Result<Reading<T>, SourceError>;
}

#[async_trait]
impl CacheSource<CircuitState> for NetworkStatePoller {
    async fn read_once(&self) -> Result<Reading<CircuitState>, SourceError> {
        Ok(Reading::durable(self.fetch_once().await?))
    }
}

#[async_trait]
impl CacheSource<Vec<GroupMemberLocation>> for NetworkRosterPoller {
    async fn read_once(&self) -> Result<Reading<Vec<GroupMemberLocation>>, SourceError> {
        Ok(Reading::durable(self.fetch_once().await?))
    }
}

/// Stream-backed source: each cycle reads whatever value is current.
///
/// `durable` is evaluated against the same borrowed value as `project`.
pub struct WatchSource<S, T> {
    rx: watch::Receiver<S>,
    project: fn(&S) -> T,
    durable: fn(&S) -> bool,
}

impl<S, T> WatchSource<S, T> {
    pub fn mapped(rx: watch::Receiver<S>, project: fn(&S) -> T) -> Self {
        Self {
            rx,
            project,
            durable: |_| true,
        }
    }

    /// Only values for which `durable` holds are written to the store.
    #[must_use]
    pub fn persist_if(mut self, durable: fn(&S) -> bool) -> Self {
        self.durable = durable;
        self
    }
}

impl<T: Clone> WatchSource<T, T> {
    pub fn latest(rx: watch::Receiver<T>) -> Self {
        Self::mapped(rx, T::clone)
    }
}

#[async_trait]
impl<S, T> CacheSource<T> for WatchSource<S, T>
where
    S: Send + Sync,
    T: Send + 'static,
{
    async fn read_once(&self) -> Result<Reading<T>, SourceError> {
        if self.rx.has_changed().is_err() {
            return Err(SourceError::Closed);
        }
        let current = self.rx.borrow();
        let reading = Reading {
            value: (self.project)(&current),
            durable: (self.durable)(&current),
        };
        drop(current);
        Ok(reading)
    }
}

pub struct OfflineFirstCache<T> {
    source: Arc<dyn CacheSource<T>>,
    store: Arc<dyn SnapshotStore>,
    key: String,
    interval: Duration,
}

impl<T> OfflineFirstCache<T>
where
    T: Degradable + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(
        source: Arc<dyn CacheSource<T>>,
        store: Arc<dyn SnapshotStore>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            source,
            store,
            key: key.into(),
            interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
        }
    }

    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn refresh(&self) -> Cached<T> {
        self.refresh_at(Utc::now()).await
    }

    /// One cycle evaluated at `now`.
    pub async fn refresh_at(&self, now: DateTime<Utc>) -> Cached<T> {
        let degraded = match self.source.read_once().await {
            Ok(Reading { value, durable }) if !value.is_degraded() => {
                if durable {
                    self.persist(&value, now.timestamp()).await;
                }
                return Cached {
                    value,
                    freshness: Freshness::Live,
                };
            }
            Ok(Reading { value, .. }) => Some(value),
            Err(e) => {
                tracing::debug!("cache source {} failed: {e}", self.key);
                None
            }
        };

        if let Some((mut value, cached_at_epoch)) = self.load().await {
            value.annotate_stale(now.timestamp().saturating_sub(cached_at_epoch));
            return Cached {
                value,
                freshness: Freshness::Stale { cached_at_epoch },
            };
        }

        Cached {
            value: degraded.unwrap_or_else(T::degraded_default),
            freshness: Freshness::Default,
        }
    }

    /// Seconds since the snapshot was written, if one exists.
    pub async fn cache_age(&self, now: DateTime<Utc>) -> Option<i64> {
        match self.read_snapshot().await {
            Ok(snapshot) => snapshot.map(|s| s.age_secs(now.timestamp())),
            Err(e) => {
                tracing::warn!("snapshot read for {} failed: {e}", self.key);
                None
            }
        }
    }

    /// Remove the persisted snapshot. The source is untouched.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let store = Arc::clone(&self.store);
        let key = self.key.clone();
        blocking(move || store.clear(&key)).await
    }

    /// Refresh once per interval until cancelled or the receiver hangs up.
    pub async fn run(self, tx: mpsc::Sender<Cached<T>>, cancel: CancellationToken) {
        loop {
            let cached = tokio::select! {
                () = cancel.cancelled() => break,
                cached = self.refresh() => cached,
            };
            let sent = tokio::select! {
                () = cancel.cancelled() => break,
                sent = tx.send(cached) => sent,
            };
            if sent.is_err() {
                tracing::debug!("cache consumer for {} gone", self.key);
                break;
            }
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    async fn persist(&self, value: &T, now_epoch: i64) {
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("snapshot encode for {} failed: {e}", self.key);
                return;
            }
        };
        let store = Arc::clone(&self.store);
        let key = self.key.clone();
        if let Err(e) = blocking(move || store.set(&key, &payload, now_epoch)).await {
            tracing::warn!("snapshot write for {} failed: {e}", self.key);
        }
    }

    async fn read_snapshot(&self) -> Result<Option<StoredSnapshot>, StoreError> {
        let store = Arc::clone(&self.store);
        let key = self.key.clone();
        blocking(move || store.get(&key)).await
    }

    /// Stored value and its epoch, or `None` for any failure.
    async fn load(&self) -> Option<(T, i64)> {
        let snapshot = match self.read_snapshot().await {
            Ok(snapshot) => snapshot?,
            Err(e) => {
                tracing::warn!("snapshot read for {} failed: {e}", self.key);
                return None;
            }
        };
        match serde_json::from_str::<T>(&snapshot.payload) {
            Ok(value) => Some((value, snapshot.cached_at_epoch)),
            Err(e) => {
                tracing::warn!("snapshot for {} no longer decodes: {e}", self.key);
                None
            }
        }
    }
}

async fn blocking<R, F>(f: F) -> Result<R, StoreError>
where
    F: FnOnce() -> Result<R, StoreError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?
}
