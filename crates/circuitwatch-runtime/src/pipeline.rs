//! Pipeline wiring: pollers and beacon streams feed the two arbiter tasks,
//! whose outputs are wrapped by offline-first caches for the consumer.
//!
//! ```text
//! state poller ──mpsc──┐
//!                      ├─ state arbiter ──watch── cache(circuit_state) ──mpsc──▶
//! beacon signal ─watch─┘
//! roster poller ──mpsc─┐
//!                      ├─ presence arbiter ─watch── cache(roster:<id>) ──mpsc──▶
//! beacon peers ──watch─┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use circuitwatch_core::presence::BEACON_ID_PREFIX;
use circuitwatch_core::types::live_signal;
use circuitwatch_core::{
    ArbitratedState, BleSignal, Cached, CircuitState, CombineLatest2, GroupMemberLocation,
    LocalIdentity, RawPeer, StateOrigin, arbitrate, resolve_presence,
};
use circuitwatch_source_beacon::{ScanCoordinator, ScanLease};
use circuitwatch_source_cloud::state_poller::DEFAULT_POLL_INTERVAL_SECS;
use circuitwatch_source_cloud::http::DEFAULT_REQUEST_TIMEOUT_MS;
use circuitwatch_source_cloud::{CloudApi, NetworkRosterPoller, NetworkStatePoller};
use circuitwatch_store::SnapshotStore;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::offline_cache::{
    DEFAULT_REFRESH_INTERVAL_SECS, OfflineFirstCache, STATE_CACHE_KEY, WatchSource,
    roster_cache_key,
};

/// Buffer between a poller and its arbiter.
const POLL_CHANNEL_CAPACITY: usize = 8;

/// Buffer between a cache and the consumer.
const OUTPUT_CHANNEL_CAPACITY: usize = 16;

/// How long `stop()` waits for each task before aborting it.
const STOP_GRACE: Duration = Duration::from_secs(2);

/// A signal counts as expired strictly after its TTL; wake just past it.
const EXPIRY_SLACK: Duration = Duration::from_millis(1);

/// How often the state arbiter re-checks that the beacon listener is up.
const SCAN_CHECK_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub refresh_interval: Duration,
    /// Group whose roster is tracked. `None` disables presence.
    pub group_id: Option<String>,
    pub identity: LocalIdentity,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            group_id: None,
            identity: LocalIdentity::default(),
        }
    }
}

/// Consumer side of a running pipeline.
pub struct PipelineOutputs {
    pub state: mpsc::Receiver<Cached<CircuitState>>,
    /// Closed immediately when no group is configured.
    pub presence: mpsc::Receiver<Cached<Vec<GroupMemberLocation>>>,
}

pub struct Pipeline {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    arbitrated: watch::Receiver<ArbitratedState>,
    presence: watch::Receiver<Vec<GroupMemberLocation>>,
}

impl Pipeline {
    /// Spawn every task. Must be called from within a tokio runtime.
    pub fn start(
        config: PipelineConfig,
        cloud: Arc<dyn CloudApi>,
        scan: &ScanCoordinator,
        store: Arc<dyn SnapshotStore>,
    ) -> (Self, PipelineOutputs) {
        let cancel = CancellationToken::new();
        let mut tasks = Vec::new();
        let beacon = Arc::clone(scan.source());

        // ── circuit state ──
        let (net_tx, net_rx) = mpsc::channel(POLL_CHANNEL_CAPACITY);
        let poller = NetworkStatePoller::new(
            Arc::clone(&cloud),
            config.poll_interval,
            config.request_timeout,
        );
        tasks.push(tokio::spawn(poller.run(net_tx, cancel.clone())));

        let (arbitrated_tx, arbitrated_rx) = watch::channel(ArbitratedState::searching());
        tasks.push(tokio::spawn(run_state_arbiter(
            net_rx,
            beacon.active_signal(),
            arbitrated_tx,
            scan.acquire(),
            cancel.clone(),
        )));

        let (state_out_tx, state_out_rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        let state_cache = OfflineFirstCache::<CircuitState>::new(
            Arc::new(
                WatchSource::mapped(arbitrated_rx.clone(), |a: &ArbitratedState| a.state.clone())
                    .persist_if(is_network_state),
            ),
            Arc::clone(&store),
            STATE_CACHE_KEY,
        )
        .with_interval(config.refresh_interval);
        tasks.push(tokio::spawn(state_cache.run(state_out_tx, cancel.clone())));

        // ── group presence ──
        let (presence_tx, presence_rx) = watch::channel(Vec::new());
        let (presence_out_tx, presence_out_rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        match config.group_id {
            Some(group_id) => {
                let (roster_tx, roster_rx) = mpsc::channel(POLL_CHANNEL_CAPACITY);
                let roster_poller = NetworkRosterPoller::new(
                    Arc::clone(&cloud),
                    group_id.clone(),
                    config.poll_interval,
                    config.request_timeout,
                );
                tasks.push(tokio::spawn(roster_poller.run(roster_tx, cancel.clone())));
                tasks.push(tokio::spawn(run_presence_arbiter(
                    roster_rx,
                    beacon.detected_peers(),
                    config.identity,
                    presence_tx,
                    cancel.clone(),
                )));

                let roster_cache = OfflineFirstCache::<Vec<GroupMemberLocation>>::new(
                    Arc::new(
                        WatchSource::latest(presence_rx.clone()).persist_if(is_network_roster),
                    ),
                    store,
                    roster_cache_key(&group_id),
                )
                .with_interval(config.refresh_interval);
                tasks.push(tokio::spawn(roster_cache.run(presence_out_tx, cancel.clone())));
            }
            None => {
                tracing::info!("no group configured, presence disabled");
                drop(presence_out_tx);
            }
        }

        tracing::info!("pipeline started ({} tasks)", tasks.len());
        let pipeline = Self {
            cancel,
            tasks,
            arbitrated: arbitrated_rx,
            presence: presence_rx,
        };
        let outputs = PipelineOutputs {
            state: state_out_rx,
            presence: presence_out_rx,
        };
        (pipeline, outputs)
    }

    /// Raw arbiter output, before the cache.
    pub fn arbitrated(&self) -> watch::Receiver<ArbitratedState> {
        self.arbitrated.clone()
    }

    pub fn presence(&self) -> watch::Receiver<Vec<GroupMemberLocation>> {
        self.presence.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel every task and wait for them to finish. The state arbiter's
    /// scan lease is released as it exits. A second call does nothing.
    pub async fn stop(&mut self) {
        if self.tasks.is_empty() {
            return;
        }
        self.cancel.cancel();
        for handle in self.tasks.drain(..) {
            let abort = handle.abort_handle();
            match tokio::time::timeout(STOP_GRACE, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("pipeline task failed: {e}"),
                Err(_) => {
                    tracing::warn!("pipeline task did not stop in {STOP_GRACE:?}, aborting");
                    abort.abort();
                }
            }
        }
        tracing::info!("pipeline stopped");
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ─── Arbiter tasks ──────────────────────────────────────────────────

/// Combine the latest network state with the latest beacon signal.
///
/// Recomputes on either input once both have reported, and again when the
/// held signal passes its TTL. Holds `lease` for its whole lifetime and
/// keeps the listener scanning while subscribed: on every wakeup, and at
/// least every [`SCAN_CHECK_INTERVAL`].
pub async fn run_state_arbiter(
    mut network: mpsc::Receiver<CircuitState>,
    mut ble: watch::Receiver<Option<BleSignal>>,
    out: watch::Sender<ArbitratedState>,
    lease: ScanLease,
    cancel: CancellationToken,
) {
    let mut scan_check = tokio::time::interval(SCAN_CHECK_INTERVAL);
    scan_check.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut latest: CombineLatest2<CircuitState, Option<BleSignal>> = CombineLatest2::new();
    latest.push_right(ble.borrow_and_update().clone());
    let mut network_open = true;
    let mut ble_open = true;

    loop {
        lease.ensure_scanning();
        let expiry = latest
            .latest()
            .and_then(|(_, signal)| until_expiry(signal.as_ref(), Utc::now()));

        let recompute = tokio::select! {
            () = cancel.cancelled() => break,
            received = network.recv(), if network_open => match received {
                Some(state) => latest.push_left(state).is_some(),
                None => {
                    tracing::debug!("network state stream ended");
                    network_open = false;
                    false
                }
            },
            changed = ble.changed(), if ble_open => match changed {
                Ok(()) => {
                    let signal = ble.borrow_and_update().clone();
                    latest.push_right(signal).is_some()
                }
                Err(_) => {
                    tracing::debug!("beacon signal stream ended");
                    ble_open = false;
                    false
                }
            },
            () = sleep_for(expiry) => true,
            _ = scan_check.tick() => false,
        };

        if recompute && let Some((network_state, signal)) = latest.latest() {
            publish(&out, arbitrate(network_state, signal.as_ref(), Utc::now()));
        }
    }
    drop(lease);
    tracing::debug!("state arbiter stopped");
}

/// Combine the latest network roster with the latest detected peers.
pub async fn run_presence_arbiter(
    mut roster: mpsc::Receiver<Vec<GroupMemberLocation>>,
    mut peers: watch::Receiver<Vec<RawPeer>>,
    identity: LocalIdentity,
    out: watch::Sender<Vec<GroupMemberLocation>>,
    cancel: CancellationToken,
) {
    let mut latest: CombineLatest2<Vec<GroupMemberLocation>, Vec<RawPeer>> =
        CombineLatest2::new();
    latest.push_right(peers.borrow_and_update().clone());
    let mut roster_open = true;
    let mut peers_open = true;

    loop {
        let recompute = tokio::select! {
            () = cancel.cancelled() => break,
            received = roster.recv(), if roster_open => match received {
                Some(members) => latest.push_left(members).is_some(),
                None => {
                    roster_open = false;
                    false
                }
            },
            changed = peers.changed(), if peers_open => match changed {
                Ok(()) => {
                    let detected = peers.borrow_and_update().clone();
                    latest.push_right(detected).is_some()
                }
                Err(_) => {
                    peers_open = false;
                    false
                }
            },
        };

        if recompute && let Some((members, detected)) = latest.latest() {
            publish(&out, resolve_presence(members, detected, &identity));
        }
    }
    tracing::debug!("presence arbiter stopped");
}

/// Beacon-derived states are session-only.
fn is_network_state(arbitrated: &ArbitratedState) -> bool {
    arbitrated.origin == StateOrigin::Network
}

/// Pseudo-identities synthesized from beacon peers are session-only.
#[allow(clippy::ptr_arg)]
fn is_network_roster(members: &Vec<GroupMemberLocation>) -> bool {
    !members
        .iter()
        .any(|m| m.user_id.starts_with(BEACON_ID_PREFIX))
}

fn publish<T: PartialEq>(out: &watch::Sender<T>, next: T) {
    out.send_if_modified(|current| {
        if *current == next {
            false
        } else {
            *current = next;
            true
        }
    });
}

/// Time left until the held signal stops counting, if it still counts.
fn until_expiry(signal: Option<&BleSignal>, now: DateTime<Utc>) -> Option<Duration> {
    let signal = live_signal(signal, now)?;
    let remaining = (signal.expires_at() - now).to_std().unwrap_or_default();
    Some(remaining + EXPIRY_SLACK)
}

async fn sleep_for(delay: Option<Duration>) {
    match delay {
        Some(delay) => tokio::time::sleep(delay).await,
        None => std::future::pending().await,
    }
}
