//! Network roster poller for one group.
//!
//! An empty roster is the degraded value: it tells the presence arbiter that
//! membership could not be confirmed over the network.

use std::sync::Arc;
use std::time::Duration;

use circuitwatch_core::GroupMemberLocation;
use circuitwatch_core::presence::dedup_by_user;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::api::CloudApi;
use crate::error::CloudError;

#[derive(Clone)]
pub struct NetworkRosterPoller {
    api: Arc<dyn CloudApi>,
    group_id: String,
    interval: Duration,
    timeout: Duration,
}

impl NetworkRosterPoller {
    pub fn new(
        api: Arc<dyn CloudApi>,
        group_id: impl Into<String>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            api,
            group_id: group_id.into(),
            interval,
            timeout,
        }
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Fetch, drop members not sharing, and collapse duplicate `user_id` rows.
    pub async fn fetch_once(&self) -> Result<Vec<GroupMemberLocation>, CloudError> {
        let rows = match tokio::time::timeout(self.timeout, self.api.fetch_roster(&self.group_id))
            .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(CloudError::Timeout(
                    u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                ));
            }
        };
        let members: Vec<GroupMemberLocation> = rows
            .into_iter()
            .map(GroupMemberLocation::from)
            .collect();
        Ok(dedup_by_user(members)
            .into_iter()
            .filter(|m| m.sharing)
            .collect())
    }

    /// One cycle's roster; empty on any failure.
    pub async fn next_roster(&self) -> Vec<GroupMemberLocation> {
        match self.fetch_once().await {
            Ok(members) => members,
            Err(e) => {
                tracing::debug!("roster poll for {} failed: {e}", self.group_id);
                Vec::new()
            }
        }
    }

    pub async fn run(self, tx: mpsc::Sender<Vec<GroupMemberLocation>>, cancel: CancellationToken) {
        loop {
            let roster = tokio::select! {
                () = cancel.cancelled() => break,
                roster = self.next_roster() => roster,
            };
            let sent = tokio::select! {
                () = cancel.cancelled() => break,
                sent = tx.send(roster) => sent,
            };
            if sent.is_err() {
                tracing::debug!("roster consumer gone, stopping poller");
                break;
            }
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}
