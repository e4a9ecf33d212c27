//! Local beacon source: latest safety signal, detected peers, scan lifecycle.
//!
//! The radio driver lives outside this process. Decoded frames arrive through
//! [`BeaconSource::ingest_frame`] (see `relay`), and consumers observe them as
//! latest-value `watch` streams.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use circuitwatch_core::{BleSignal, RawPeer};
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::frame::{self, Frame, SignalFrame};

// ─── Collaborator seam ──────────────────────────────────────────────

/// What the arbiters need from the beacon listener.
pub trait LocalSignalSource: Send + Sync {
    /// Latest safety signal, `None` before the first frame or after a stop.
    fn active_signal(&self) -> watch::Receiver<Option<BleSignal>>;

    /// Latest list of anonymously detected nearby peers.
    fn detected_peers(&self) -> watch::Receiver<Vec<RawPeer>>;

    /// Begin listening. No-op when already scanning.
    fn start_scanning(&self);

    /// Stop listening. No-op when already stopped.
    fn stop_scanning(&self);

    fn is_scanning_active(&self) -> bool;
}

// ─── Ingest outcome ─────────────────────────────────────────────────

/// Disposition of one relayed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    SignalAccepted { sequence: u64 },
    /// Same zone, sequence not newer than the live signal.
    SignalReplay { sequence: u64, current: u64 },
    PeersUpdated { count: usize },
    NotScanning,
    Malformed(String),
}

// ─── BeaconSource ───────────────────────────────────────────────────

/// In-process [`LocalSignalSource`] fed by the relay. Cheap to clone.
#[derive(Clone)]
pub struct BeaconSource {
    inner: Arc<Inner>,
}

struct Inner {
    signal_tx: watch::Sender<Option<BleSignal>>,
    peers_tx: watch::Sender<Vec<RawPeer>>,
    scanning: AtomicBool,
    frames_dropped: AtomicU64,
}

impl Default for BeaconSource {
    fn default() -> Self {
        Self::new()
    }
}

impl BeaconSource {
    pub fn new() -> Self {
        let (signal_tx, _) = watch::channel(None);
        let (peers_tx, _) = watch::channel(Vec::new());
        Self {
            inner: Arc::new(Inner {
                signal_tx,
                peers_tx,
                scanning: AtomicBool::new(false),
                frames_dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Decode and publish one relayed frame captured at `now`.
    pub fn ingest_frame(&self, bytes: &[u8], now: DateTime<Utc>) -> IngestOutcome {
        if !self.is_scanning_active() {
            return IngestOutcome::NotScanning;
        }

        match frame::decode(bytes) {
            Ok(Frame::Signal(signal)) => self.ingest_signal(signal, now),
            Ok(Frame::Peers(records)) => {
                let peers: Vec<RawPeer> = records
                    .into_iter()
                    .map(|r| RawPeer {
                        id: r.id,
                        latitude: r.lat,
                        longitude: r.lon,
                        seen_at: now,
                    })
                    .collect();
                let count = peers.len();
                self.inner.peers_tx.send_replace(peers);
                IngestOutcome::PeersUpdated { count }
            }
            Err(e) => {
                self.inner.frames_dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("dropping malformed beacon frame: {e}");
                IngestOutcome::Malformed(e.to_string())
            }
        }
    }

    fn ingest_signal(&self, wire: SignalFrame, now: DateTime<Utc>) -> IngestOutcome {
        let candidate = BleSignal {
            mode: wire.mode,
            zone_id: wire.zone_id,
            sequence: u64::from(wire.sequence),
            temperature: wire.temperature.map(i32::from),
            timestamp: now,
        };
        let sequence = candidate.sequence;
        let mut outcome = IngestOutcome::SignalAccepted { sequence };

        self.inner.signal_tx.send_if_modified(|current| {
            if let Some(held) = current.as_ref()
                && !held.is_expired(now)
                && held.zone_id == candidate.zone_id
                && sequence <= held.sequence
            {
                outcome = IngestOutcome::SignalReplay {
                    sequence,
                    current: held.sequence,
                };
                return false;
            }
            *current = Some(candidate);
            true
        });

        if let IngestOutcome::SignalReplay { current, .. } = &outcome {
            tracing::debug!("ignoring beacon replay seq={sequence} (holding seq={current})");
        }
        outcome
    }

    /// Frames dropped because they failed to decode.
    pub fn frames_dropped(&self) -> u64 {
        self.inner.frames_dropped.load(Ordering::Relaxed)
    }
}

impl LocalSignalSource for BeaconSource {
    fn active_signal(&self) -> watch::Receiver<Option<BleSignal>> {
        self.inner.signal_tx.subscribe()
    }

    fn detected_peers(&self) -> watch::Receiver<Vec<RawPeer>> {
        self.inner.peers_tx.subscribe()
    }

    fn start_scanning(&self) {
        if !self.inner.scanning.swap(true, Ordering::SeqCst) {
            tracing::info!("beacon scanning started");
        }
    }

    fn stop_scanning(&self) {
        if self.inner.scanning.swap(false, Ordering::SeqCst) {
            self.inner.signal_tx.send_replace(None);
            self.inner.peers_tx.send_replace(Vec::new());
            tracing::info!("beacon scanning stopped");
        }
    }

    fn is_scanning_active(&self) -> bool {
        self.inner.scanning.load(Ordering::SeqCst)
    }
}

// ─── Scan leases ────────────────────────────────────────────────────

/// Reference-counts consumers that need the listener running.
///
/// The first lease starts scanning; releasing the last one stops it.
#[derive(Clone)]
pub struct ScanCoordinator {
    source: Arc<dyn LocalSignalSource>,
    holders: Arc<Mutex<usize>>,
}

impl ScanCoordinator {
    pub fn new(source: Arc<dyn LocalSignalSource>) -> Self {
        Self {
            source,
            holders: Arc::new(Mutex::new(0)),
        }
    }

    /// Take a lease and make sure the listener is scanning.
    ///
    /// `start_scanning` is called on every acquire, not only the first, so a
    /// listener stopped out-of-band is brought back.
    pub fn acquire(&self) -> ScanLease {
        let mut holders = self.holders.lock();
        *holders += 1;
        self.source.start_scanning();
        ScanLease {
            source: Arc::clone(&self.source),
            holders: Arc::clone(&self.holders),
            released: false,
        }
    }

    pub fn holders(&self) -> usize {
        *self.holders.lock()
    }

    pub fn source(&self) -> &Arc<dyn LocalSignalSource> {
        &self.source
    }
}

/// A hold on beacon scanning. Released on drop.
pub struct ScanLease {
    source: Arc<dyn LocalSignalSource>,
    holders: Arc<Mutex<usize>>,
    released: bool,
}

impl ScanLease {
    /// Give the lease back. Safe to call more than once.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let mut holders = self.holders.lock();
        *holders = holders.saturating_sub(1);
        if *holders == 0 {
            self.source.stop_scanning();
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Restart the listener if something stopped it while the lease is held.
    /// Returns `true` when scanning had to be restarted.
    pub fn ensure_scanning(&self) -> bool {
        if self.released || self.source.is_scanning_active() {
            return false;
        }
        tracing::warn!("beacon scanning stopped under a live lease, restarting");
        self.source.start_scanning();
        true
    }
}

impl Drop for ScanLease {
    fn drop(&mut self) {
        self.release();
    }
}
