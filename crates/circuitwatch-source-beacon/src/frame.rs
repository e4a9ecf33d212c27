//! Beacon relay frame codec.
//!
//! Signal frame (big-endian):
//!
//! ```text
//! 0xC5 | ver=0x01 | mode u8 | zone_len u8 | zone utf8[zone_len] | sequence u32 | temp i16
//! ```
//!
//! `temp` is tenths of a degree, `i16::MIN` meaning "not reported".
//!
//! Peer frame: `0xC6 | ver=0x01 | JSON array of {"id", "lat", "lon"}`.

use circuitwatch_core::CircuitMode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SIGNAL_MAGIC: u8 = 0xC5;
pub const PEERS_MAGIC: u8 = 0xC6;
pub const FRAME_VERSION: u8 = 0x01;
pub const MAX_ZONE_LEN: usize = 32;

const TEMP_ABSENT: i16 = i16::MIN;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,
    #[error("unknown frame magic 0x{0:02x}")]
    UnknownMagic(u8),
    #[error("unsupported frame version {0}")]
    UnsupportedVersion(u8),
    #[error("truncated frame: need {need} bytes, got {got}")]
    Truncated { need: usize, got: usize },
    #[error("unknown mode code {0}")]
    UnknownMode(u8),
    #[error("invalid zone id: {0}")]
    InvalidZone(String),
    #[error("trailing bytes after frame: {0}")]
    TrailingBytes(usize),
    #[error("invalid peer payload: {0}")]
    InvalidPeers(String),
}

/// Signal fields as carried on the wire (capture time is added on ingest).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalFrame {
    pub mode: CircuitMode,
    pub zone_id: String,
    pub sequence: u32,
    pub temperature: Option<i16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub id: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Signal(SignalFrame),
    Peers(Vec<PeerRecord>),
}

pub fn decode(bytes: &[u8]) -> Result<Frame, FrameError> {
    let (&magic, rest) = bytes.split_first().ok_or(FrameError::Empty)?;
    let (&version, body) = rest.split_first().ok_or(FrameError::Truncated {
        need: 2,
        got: bytes.len(),
    })?;
    if magic != SIGNAL_MAGIC && magic != PEERS_MAGIC {
        return Err(FrameError::UnknownMagic(magic));
    }
    if version != FRAME_VERSION {
        return Err(FrameError::UnsupportedVersion(version));
    }

    match magic {
        SIGNAL_MAGIC => decode_signal(body, bytes.len()).map(Frame::Signal),
        _ => serde_json::from_slice::<Vec<PeerRecord>>(body)
            .map(Frame::Peers)
            .map_err(|e| FrameError::InvalidPeers(e.to_string())),
    }
}

fn decode_signal(body: &[u8], total: usize) -> Result<SignalFrame, FrameError> {
    let truncated = |need: usize| FrameError::Truncated {
        need: need + 2,
        got: total,
    };

    if body.len() < 2 {
        return Err(truncated(2));
    }
    let mode = CircuitMode::from_code(body[0]).ok_or(FrameError::UnknownMode(body[0]))?;
    let zone_len = usize::from(body[1]);
    if zone_len == 0 || zone_len > MAX_ZONE_LEN {
        return Err(FrameError::InvalidZone(format!("length {zone_len}")));
    }

    let need = 2 + zone_len + 4 + 2;
    if body.len() < need {
        return Err(truncated(need));
    }
    if body.len() > need {
        return Err(FrameError::TrailingBytes(body.len() - need));
    }

    let zone = &body[2..2 + zone_len];
    let zone_id = std::str::from_utf8(zone)
        .map_err(|e| FrameError::InvalidZone(e.to_string()))?
        .to_string();

    let seq_at = 2 + zone_len;
    let sequence = u32::from_be_bytes([
        body[seq_at],
        body[seq_at + 1],
        body[seq_at + 2],
        body[seq_at + 3],
    ]);
    let raw_temp = i16::from_be_bytes([body[seq_at + 4], body[seq_at + 5]]);

    Ok(SignalFrame {
        mode,
        zone_id,
        sequence,
        temperature: (raw_temp != TEMP_ABSENT).then_some(raw_temp),
    })
}

/// Encode a signal frame. Zone ids longer than [`MAX_ZONE_LEN`] bytes are rejected.
pub fn encode_signal(frame: &SignalFrame) -> Result<Vec<u8>, FrameError> {
    let zone = frame.zone_id.as_bytes();
    let zone_len = u8::try_from(zone.len())
        .ok()
        .filter(|len| (1..=MAX_ZONE_LEN).contains(&usize::from(*len)))
        .ok_or_else(|| FrameError::InvalidZone(format!("length {}", zone.len())))?;
    let mut out = Vec::with_capacity(4 + zone.len() + 6);
    out.push(SIGNAL_MAGIC);
    out.push(FRAME_VERSION);
    out.push(frame.mode.code());
    out.push(zone_len);
    out.extend_from_slice(zone);
    out.extend_from_slice(&frame.sequence.to_be_bytes());
    out.extend_from_slice(&frame.temperature.unwrap_or(TEMP_ABSENT).to_be_bytes());
    Ok(out)
}

pub fn encode_peers(peers: &[PeerRecord]) -> Vec<u8> {
    let mut out = vec![PEERS_MAGIC, FRAME_VERSION];
    // Serializing plain structs of strings and floats cannot fail.
    out.extend(serde_json::to_vec(peers).unwrap_or_default());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evac_frame() -> SignalFrame {
        SignalFrame {
            mode: CircuitMode::Evacuation,
            zone_id: "7".into(),
            sequence: 42,
            temperature: Some(235),
        }
    }

    #[test]
    fn signal_frame_layout() {
        let bytes = encode_signal(&evac_frame()).expect("encode");
        assert_eq!(
            bytes,
            vec![0xC5, 0x01, 3, 1, b'7', 0, 0, 0, 42, 0x00, 0xEB]
        );
        assert_eq!(decode(&bytes), Ok(Frame::Signal(evac_frame())));
    }

    #[test]
    fn absent_temperature() {
        let mut frame = evac_frame();
        frame.temperature = None;
        let bytes = encode_signal(&frame).expect("encode");
        assert_eq!(decode(&bytes), Ok(Frame::Signal(frame)));
    }

    #[test]
    fn rejects_malformed_signal_frames() {
        let good = encode_signal(&evac_frame()).expect("encode");

        assert_eq!(decode(&[]), Err(FrameError::Empty));
        assert_eq!(decode(&[0x00, 0x01]), Err(FrameError::UnknownMagic(0)));
        assert_eq!(
            decode(&[SIGNAL_MAGIC, 0x02, 0]),
            Err(FrameError::UnsupportedVersion(2))
        );
        assert!(matches!(
            decode(&good[..good.len() - 1]),
            Err(FrameError::Truncated { .. })
        ));

        let mut trailing = good.clone();
        trailing.push(0);
        assert_eq!(decode(&trailing), Err(FrameError::TrailingBytes(1)));

        let mut bad_mode = good.clone();
        bad_mode[2] = 77;
        assert_eq!(decode(&bad_mode), Err(FrameError::UnknownMode(77)));

        let mut bad_zone = good;
        bad_zone[4] = 0xFF;
        assert!(matches!(decode(&bad_zone), Err(FrameError::InvalidZone(_))));
    }

    #[test]
    fn peer_frame_decodes_json() {
        let peers = vec![
            PeerRecord {
                id: "abc".into(),
                lat: Some(41.57),
                lon: Some(2.26),
            },
            PeerRecord {
                id: "def".into(),
                lat: None,
                lon: None,
            },
        ];
        let bytes = encode_peers(&peers);
        assert_eq!(decode(&bytes), Ok(Frame::Peers(peers)));

        let partial = br#"{"id":"x"}"#;
        let mut bytes = vec![PEERS_MAGIC, FRAME_VERSION, b'['];
        bytes.extend_from_slice(partial);
        bytes.push(b']');
        match decode(&bytes) {
            Ok(Frame::Peers(list)) => assert_eq!(list[0].lat, None),
            other => panic!("unexpected: {other:?}"),
        }

        assert!(matches!(
            decode(&[PEERS_MAGIC, FRAME_VERSION, b'{']),
            Err(FrameError::InvalidPeers(_))
        ));
    }

    #[test]
    fn encode_rejects_oversized_zone() {
        let mut frame = evac_frame();
        frame.zone_id = "z".repeat(MAX_ZONE_LEN + 1);
        assert!(encode_signal(&frame).is_err());
    }
}
