//! UDP relay listener: one beacon frame per datagram.
//!
//! The radio bridge (outside this process) forwards raw frames to a local
//! socket. Malformed datagrams are dropped by [`BeaconSource::ingest_frame`].

use std::time::Duration;

use chrono::Utc;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::source::{BeaconSource, IngestOutcome};

/// Largest datagram accepted from the relay.
pub const MAX_DATAGRAM: usize = 4096;

/// Pause after a failed receive before trying the socket again.
pub const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(250);

/// Receive frames until `cancel` fires. Socket errors are logged and skipped.
pub async fn run_relay(socket: UdpSocket, source: BeaconSource, cancel: CancellationToken) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    match socket.local_addr() {
        Ok(addr) => tracing::info!("beacon relay listening on {addr}"),
        Err(e) => tracing::warn!("beacon relay address unavailable: {e}"),
    }

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, peer)) => {
                    let outcome = source.ingest_frame(&buf[..len], Utc::now());
                    if let IngestOutcome::SignalAccepted { sequence } = outcome {
                        tracing::debug!("beacon signal seq={sequence} from {peer}");
                    }
                }
                Err(e) => {
                    tracing::warn!("beacon relay recv failed: {e}");
                    if !backoff(&cancel).await {
                        break;
                    }
                }
            },
        }
    }

    tracing::debug!("beacon relay stopped");
}

/// Sleep out the error backoff. `false` when cancelled meanwhile.
async fn backoff(cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(RECV_ERROR_BACKOFF) => true,
    }
}
