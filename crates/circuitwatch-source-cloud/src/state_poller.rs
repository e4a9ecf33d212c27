//! Network state poller: an unending, never-failing sequence of circuit states.

use std::sync::Arc;
use std::time::Duration;

use circuitwatch_core::CircuitState;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::api::CloudApi;
use crate::error::CloudError;

/// Message emitted when the cloud cannot be read.
pub const UNSTABLE_MESSAGE: &str = "connection unstable";

/// Default delay between polls (seconds).
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

#[derive(Clone)]
pub struct NetworkStatePoller {
    api: Arc<dyn CloudApi>,
    interval: Duration,
    timeout: Duration,
}

impl NetworkStatePoller {
    pub fn new(api: Arc<dyn CloudApi>, interval: Duration, timeout: Duration) -> Self {
        Self {
            api,
            interval,
            timeout,
        }
    }

    /// One bounded request, mapped. Errors are returned, not swallowed.
    pub async fn fetch_once(&self) -> Result<CircuitState, CloudError> {
        match tokio::time::timeout(self.timeout, self.api.fetch_state()).await {
            Ok(Ok(resp)) => Ok(CircuitState::from(resp)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CloudError::Timeout(
                u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            )),
        }
    }

    /// One cycle's value: the mapped response, or `UNKNOWN` on any failure.
    pub async fn next_state(&self) -> CircuitState {
        match self.fetch_once().await {
            Ok(state) => state,
            Err(e) => {
                tracing::debug!("circuit state poll failed: {e}");
                CircuitState::unknown(UNSTABLE_MESSAGE)
            }
        }
    }

    /// Poll until cancelled or the receiver hangs up. Emits immediately, then
    /// once per `interval` after each completed cycle.
    pub async fn run(self, tx: mpsc::Sender<CircuitState>, cancel: CancellationToken) {
        loop {
            let state = tokio::select! {
                () = cancel.cancelled() => break,
                state = self.next_state() => state,
            };
            let sent = tokio::select! {
                () = cancel.cancelled() => break,
                sent = tx.send(state) => sent,
            };
            if sent.is_err() {
                tracing::debug!("circuit state consumer gone, stopping poller");
                break;
            }
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}
