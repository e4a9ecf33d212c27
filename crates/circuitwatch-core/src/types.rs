use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lifetime of a beacon signal after capture (seconds).
pub const SIGNAL_TTL_SECS: i64 = 30;

// ─── Circuit Mode ─────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CircuitMode {
    Normal,
    Congestion,
    Emergency,
    Evacuation,
    RedFlag,
    #[default]
    Unknown,
}

impl CircuitMode {
    pub const ALL: [Self; 6] = [
        Self::Normal,
        Self::Congestion,
        Self::Emergency,
        Self::Evacuation,
        Self::RedFlag,
        Self::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Congestion => "CONGESTION",
            Self::Emergency => "EMERGENCY",
            Self::Evacuation => "EVACUATION",
            Self::RedFlag => "RED_FLAG",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Modes that must override a healthy network reading.
    pub fn is_safety_critical(self) -> bool {
        matches!(self, Self::Evacuation | Self::RedFlag)
    }

    /// Parse any provider spelling, falling back to `Unknown`.
    ///
    /// Accepts mixed case and `-`/space separators (`"red-flag"`, `"Red Flag"`).
    pub fn parse_lossy(s: &str) -> Self {
        s.parse().unwrap_or(Self::Unknown)
    }

    /// Numeric code used on the beacon wire.
    pub fn code(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::Congestion => 1,
            Self::Emergency => 2,
            Self::Evacuation => 3,
            Self::RedFlag => 4,
            Self::Unknown => 5,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.code() == code)
    }
}

impl fmt::Display for CircuitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CircuitMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .map(|c| if c == '-' || c == ' ' { '_' } else { c })
            .collect::<String>()
            .to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == normalized)
            .ok_or_else(|| CoreError::UnknownMode(s.to_string()))
    }
}

impl From<String> for CircuitMode {
    fn from(s: String) -> Self {
        Self::parse_lossy(&s)
    }
}

impl From<CircuitMode> for String {
    fn from(mode: CircuitMode) -> Self {
        mode.as_str().to_string()
    }
}

// ─── Circuit State ────────────────────────────────────────────────

/// Venue-wide safety state as shown to the visitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitState {
    pub mode: CircuitMode,
    pub message: Option<String>,
    /// Formatted temperature, e.g. `"23.5"`.
    pub temperature: Option<String>,
    /// Provenance label (server timestamp, `"BLE #42"`, ...). Opaque to the core.
    pub updated_at: String,
    pub session_info: Option<serde_json::Value>,
}

impl CircuitState {
    pub fn unknown(message: impl Into<String>) -> Self {
        Self {
            mode: CircuitMode::Unknown,
            message: Some(message.into()),
            temperature: None,
            updated_at: String::new(),
            session_info: None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.mode == CircuitMode::Unknown
    }
}

// ─── Beacon Signal ────────────────────────────────────────────────

/// One decoded safety broadcast from a local beacon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BleSignal {
    pub mode: CircuitMode,
    pub zone_id: String,
    /// Monotonic counter maintained by the broadcaster.
    pub sequence: u64,
    /// Raw temperature in tenths of a degree.
    pub temperature: Option<i32>,
    /// Capture time on this device.
    pub timestamp: DateTime<Utc>,
}

impl BleSignal {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.timestamp + TimeDelta::seconds(SIGNAL_TTL_SECS)
    }

    /// A signal stays live up to and including `timestamp + TTL`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at() < now
    }

    /// Temperature in degrees with one decimal, e.g. `235` -> `"23.5"`.
    pub fn formatted_temperature(&self) -> Option<String> {
        self.temperature
            .map(|raw| format!("{:.1}", f64::from(raw) / 10.0))
    }
}

/// Filter a nullable signal down to one that may still influence output.
pub fn live_signal(signal: Option<&BleSignal>, now: DateTime<Utc>) -> Option<&BleSignal> {
    signal.filter(|s| !s.is_expired(now))
}

// ─── Presence ─────────────────────────────────────────────────────

/// An anonymous nearby device reported by the beacon listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPeer {
    pub id: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMemberLocation {
    pub user_id: String,
    pub display_name: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub last_updated: DateTime<Utc>,
    pub sharing: bool,
}

/// Who "me" is, for display name normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalIdentity {
    pub user_id: Option<String>,
    pub display_name: Option<String>,
}

// ─── App Mode ─────────────────────────────────────────────────────

/// Connectivity indicator for the UI. Not a safety-state selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppMode {
    Online,
    OfflineBle,
}

// ─── Error ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("unknown circuit mode: {0}")]
    UnknownMode(String),
}

// ─── Tests ────────────────────────────────────────────────────────
