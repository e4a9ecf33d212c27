//! Shared construction for subcommands: cloud client, snapshot store, caches.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use circuitwatch_core::{CircuitState, GroupMemberLocation};
use circuitwatch_runtime::OfflineFirstCache;
use circuitwatch_runtime::offline_cache::{NETWORK_STATE_CACHE_KEY, roster_cache_key};
use circuitwatch_source_cloud::state_poller::DEFAULT_POLL_INTERVAL_SECS;
use circuitwatch_source_cloud::{HttpCloudClient, NetworkRosterPoller, NetworkStatePoller};
use circuitwatch_store::{SnapshotStore, SqliteSnapshotStore};

use crate::cli::{Cli, default_db_path};

pub struct Context {
    pub cloud: Arc<HttpCloudClient>,
    pub store: Arc<dyn SnapshotStore>,
    pub group: Option<String>,
    pub request_timeout: Duration,
}

impl Context {
    pub fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        let request_timeout = Duration::from_millis(cli.request_timeout_ms);
        let mut cloud = HttpCloudClient::new(cli.api_url.as_str(), request_timeout)
            .context("failed to build cloud client")?;
        if let Some(ref token) = cli.api_token {
            cloud = cloud.with_token(token.as_str());
        }

        let db = cli.db.clone().unwrap_or_else(default_db_path);
        let store = open_store(&db)?;

        Ok(Self {
            cloud: Arc::new(cloud),
            store,
            group: cli.group.clone(),
            request_timeout,
        })
    }

    /// Cache over a direct network read of the circuit state. Kept apart
    /// from the arbitrated snapshot that `run` writes.
    pub fn status_cache(&self) -> OfflineFirstCache<CircuitState> {
        self.state_cache(NETWORK_STATE_CACHE_KEY)
    }

    /// Network-backed state cache over an arbitrary snapshot key. Used on
    /// its own for `cache_age` and `clear`, which never touch the source.
    pub fn state_cache(&self, key: &str) -> OfflineFirstCache<CircuitState> {
        let poller = NetworkStatePoller::new(
            self.cloud.clone(),
            Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            self.request_timeout,
        );
        OfflineFirstCache::new(Arc::new(poller), Arc::clone(&self.store), key)
    }

    /// Cache over a direct network read of the group roster.
    pub fn roster_cache(&self, group_id: &str) -> OfflineFirstCache<Vec<GroupMemberLocation>> {
        let poller = NetworkRosterPoller::new(
            self.cloud.clone(),
            group_id,
            Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            self.request_timeout,
        );
        OfflineFirstCache::new(
            Arc::new(poller),
            Arc::clone(&self.store),
            roster_cache_key(group_id),
        )
    }
}

fn open_store(path: &Path) -> anyhow::Result<Arc<dyn SnapshotStore>> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let store = SqliteSnapshotStore::open(path)
        .with_context(|| format!("failed to open snapshot store {}", path.display()))?;
    tracing::debug!("snapshot store at {}", path.display());
    Ok(Arc::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use circuitwatch_runtime::offline_cache::STATE_CACHE_KEY;
    use clap::Parser;

    #[test]
    fn status_snapshot_is_kept_apart_from_run() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = dir.path().join("nested/snapshots.db");
        let cli = Cli::try_parse_from([
            "circuitwatch",
            "--db",
            db.to_str().expect("utf-8 path"),
            "status",
        ])
        .expect("parse");
        let ctx = Context::from_cli(&cli).expect("context");

        assert!(db.exists());
        assert_ne!(ctx.status_cache().key(), STATE_CACHE_KEY);
        assert_eq!(ctx.state_cache(STATE_CACHE_KEY).key(), STATE_CACHE_KEY);
        assert_eq!(ctx.roster_cache("g1").key(), "roster:g1");
    }
}
