//! Circuit state arbitration between the cloud reading and the local beacon.
//!
//! Pure functions over already-available values. Precedence (first match wins):
//!
//! 1. live beacon signal in a safety-critical mode (overrides the network)
//! 2. network state whose mode is known
//! 3. any other live beacon signal
//! 4. `UNKNOWN` "searching for signal"
//!
//! [`resolve_app_mode`] uses a different precedence (network before beacon).
//! The two can disagree: the UI may read "online" while the displayed state
//! comes from a beacon override. This is intentional and kept as-is until
//! the venue safety owners decide otherwise.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AppMode, BleSignal, CircuitState, live_signal};

pub const SEARCHING_MESSAGE: &str = "searching for signal";

/// Which rule produced the arbitrated state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateOrigin {
    BeaconOverride,
    Network,
    BeaconFallback,
    Searching,
}

/// Output of one arbitration step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitratedState {
    pub state: CircuitState,
    pub origin: StateOrigin,
    pub app_mode: AppMode,
}

impl ArbitratedState {
    /// Initial value before either source has reported.
    pub fn searching() -> Self {
        Self {
            state: CircuitState::unknown(SEARCHING_MESSAGE),
            origin: StateOrigin::Searching,
            app_mode: AppMode::OfflineBle,
        }
    }
}

/// Pick the authoritative circuit state.
pub fn resolve_circuit_state(
    network: &CircuitState,
    ble: Option<&BleSignal>,
    now: DateTime<Utc>,
) -> (CircuitState, StateOrigin) {
    let live = live_signal(ble, now);

    if let Some(signal) = live
        && signal.mode.is_safety_critical()
    {
        return (from_beacon(signal, true), StateOrigin::BeaconOverride);
    }

    if !network.is_unknown() {
        return (network.clone(), StateOrigin::Network);
    }

    if let Some(signal) = live {
        return (from_beacon(signal, false), StateOrigin::BeaconFallback);
    }

    (CircuitState::unknown(SEARCHING_MESSAGE), StateOrigin::Searching)
}

/// Connectivity indicator. Only the network state decides it; a live
/// beacon never flips it.
pub fn resolve_app_mode(network: &CircuitState) -> AppMode {
    if network.is_unknown() {
        AppMode::OfflineBle
    } else {
        AppMode::Online
    }
}

/// Run both resolutions against the same snapshot of inputs.
pub fn arbitrate(
    network: &CircuitState,
    ble: Option<&BleSignal>,
    now: DateTime<Utc>,
) -> ArbitratedState {
    let (state, origin) = resolve_circuit_state(network, ble, now);
    ArbitratedState {
        state,
        origin,
        app_mode: resolve_app_mode(network),
    }
}

fn from_beacon(signal: &BleSignal, warning: bool) -> CircuitState {
    let message = if warning {
        format!(
            "WARNING: {} broadcast for zone {} by local beacon",
            signal.mode, signal.zone_id
        )
    } else {
        format!(
            "{} reported for zone {} by local beacon",
            signal.mode, signal.zone_id
        )
    };
    CircuitState {
        mode: signal.mode,
        message: Some(message),
        temperature: signal.formatted_temperature(),
        updated_at: format!("BLE #{}", signal.sequence),
        session_info: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CircuitMode, SIGNAL_TTL_SECS};
    use chrono::{TimeDelta, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, 14, 0, 0)
            .single()
            .expect("valid datetime")
    }

    fn network(mode: CircuitMode) -> CircuitState {
        CircuitState {
            mode,
            message: Some("from cloud".into()),
            temperature: Some("21.0".into()),
            updated_at: "2026-05-10T13:59:58Z".into(),
            session_info: Some(serde_json::json!({"session": "race"})),
        }
    }

    fn beacon(mode: CircuitMode, zone: &str, sequence: u64, age_secs: i64) -> BleSignal {
        BleSignal {
            mode,
            zone_id: zone.into(),
            sequence,
            temperature: Some(187),
            timestamp: now() - TimeDelta::seconds(age_secs),
        }
    }

    #[test]
    fn known_network_passes_through_without_beacon() {
        for mode in CircuitMode::ALL.into_iter().filter(|m| *m != CircuitMode::Unknown) {
            let net = network(mode);
            let (out, origin) = resolve_circuit_state(&net, None, now());
            assert_eq!(out, net);
            assert_eq!(origin, StateOrigin::Network);
        }
    }

    #[test]
    fn expired_beacon_is_ignored() {
        for beacon_mode in CircuitMode::ALL {
            let expired = beacon(beacon_mode, "3", 9, SIGNAL_TTL_SECS + 5);
            let net = network(CircuitMode::Normal);
            let (out, _) = resolve_circuit_state(&net, Some(&expired), now());
            assert_eq!(out, net, "expired {beacon_mode} must not influence output");

            let (out, origin) =
                resolve_circuit_state(&CircuitState::unknown("x"), Some(&expired), now());
            assert_eq!(origin, StateOrigin::Searching);
            assert_eq!(out.message.as_deref(), Some(SEARCHING_MESSAGE));
        }
    }

    #[test]
    fn critical_beacon_overrides_any_network_mode() {
        for critical in [CircuitMode::Evacuation, CircuitMode::RedFlag] {
            for net_mode in CircuitMode::ALL {
                let signal = beacon(critical, "12", 5, 0);
                let (out, origin) = resolve_circuit_state(&network(net_mode), Some(&signal), now());
                assert_eq!(out.mode, critical);
                assert_eq!(origin, StateOrigin::BeaconOverride);
            }
        }
    }

    #[test]
    fn scenario_evacuation_beacon_over_normal_network() {
        let signal = beacon(CircuitMode::Evacuation, "7", 42, 0);
        let (out, _) = resolve_circuit_state(&network(CircuitMode::Normal), Some(&signal), now());
        assert_eq!(out.mode, CircuitMode::Evacuation);
        let message = out.message.expect("message");
        assert!(message.contains('7'));
        assert!(message.starts_with("WARNING"));
        assert_eq!(out.updated_at, "BLE #42");
        assert_eq!(out.temperature.as_deref(), Some("18.7"));
    }

    #[test]
    fn non_critical_beacon_only_when_network_unknown() {
        let signal = beacon(CircuitMode::Congestion, "4", 2, 1);
        let (out, origin) =
            resolve_circuit_state(&network(CircuitMode::Normal), Some(&signal), now());
        assert_eq!(out.mode, CircuitMode::Normal);
        assert_eq!(origin, StateOrigin::Network);

        let (out, origin) =
            resolve_circuit_state(&CircuitState::unknown("down"), Some(&signal), now());
        assert_eq!(out.mode, CircuitMode::Congestion);
        assert_eq!(origin, StateOrigin::BeaconFallback);
        let message = out.message.expect("message");
        assert!(message.contains('4'));
        assert!(!message.starts_with("WARNING"));
    }

    #[test]
    fn nothing_available_is_searching() {
        let (out, origin) = resolve_circuit_state(&CircuitState::unknown("down"), None, now());
        assert_eq!(out.mode, CircuitMode::Unknown);
        assert_eq!(out.message.as_deref(), Some(SEARCHING_MESSAGE));
        assert_eq!(origin, StateOrigin::Searching);
    }

    #[test]
    fn app_mode_prefers_network_even_under_override() {
        let signal = beacon(CircuitMode::RedFlag, "1", 3, 0);
        let out = arbitrate(&network(CircuitMode::Normal), Some(&signal), now());
        assert_eq!(out.state.mode, CircuitMode::RedFlag);
        assert_eq!(out.app_mode, AppMode::Online);

        let out = arbitrate(&CircuitState::unknown("down"), Some(&signal), now());
        assert_eq!(out.app_mode, AppMode::OfflineBle);
        assert_eq!(resolve_app_mode(&network(CircuitMode::Congestion)), AppMode::Online);
    }
}
