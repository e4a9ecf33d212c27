//! Group presence arbitration: authenticated roster vs anonymous beacon peers.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::types::{GroupMemberLocation, LocalIdentity, RawPeer};

/// Prefix for pseudo-identities synthesized from beacon peers.
pub const BEACON_ID_PREFIX: &str = "ble_";

/// Label used when no usable display name exists.
pub const PLACEHOLDER_NAME: &str = "Group member";

const PSEUDO_ID_HEX_LEN: usize = 12;

/// Combine the roster and detected peers into one presence list.
///
/// A non-empty roster is authoritative and suppresses every local detection.
/// An empty roster means membership cannot be confirmed, so nearby peers with
/// a full position are shown instead.
pub fn resolve_presence(
    roster: &[GroupMemberLocation],
    detected: &[RawPeer],
    identity: &LocalIdentity,
) -> Vec<GroupMemberLocation> {
    let members: Vec<GroupMemberLocation> = if roster.is_empty() {
        detected.iter().filter_map(synthesize_member).collect()
    } else {
        roster.to_vec()
    };

    dedup_by_user(members)
        .into_iter()
        .map(|mut member| {
            member.display_name = Some(normalize_display_name(&member, identity));
            member
        })
        .collect()
}

/// Map a beacon peer to a member, or `None` when a coordinate is missing.
pub fn synthesize_member(peer: &RawPeer) -> Option<GroupMemberLocation> {
    let (latitude, longitude) = (peer.latitude?, peer.longitude?);
    let digest = peer_digest(&peer.id);
    Some(GroupMemberLocation {
        user_id: format!("{BEACON_ID_PREFIX}{}", &digest[..PSEUDO_ID_HEX_LEN]),
        display_name: Some(format!("Nearby visitor {}", digest[..4].to_ascii_uppercase())),
        latitude,
        longitude,
        last_updated: peer.seen_at,
        sharing: true,
    })
}

/// Collapse rows sharing a `user_id`. The last row wins; the first keeps its slot.
pub fn dedup_by_user(members: Vec<GroupMemberLocation>) -> Vec<GroupMemberLocation> {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<GroupMemberLocation> = Vec::with_capacity(members.len());

    for member in members {
        match slots.get(&member.user_id) {
            Some(&idx) => out[idx] = member,
            None => {
                slots.insert(member.user_id.clone(), out.len());
                out.push(member);
            }
        }
    }

    out
}

/// Pick the name to display for a member.
pub fn normalize_display_name(member: &GroupMemberLocation, identity: &LocalIdentity) -> String {
    if identity.user_id.as_deref() == Some(member.user_id.as_str())
        && let Some(local) = identity.display_name.as_deref()
        && !local.trim().is_empty()
    {
        return local.trim().to_string();
    }

    match member.display_name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() && !is_placeholder_name(name) => name.to_string(),
        _ => PLACEHOLDER_NAME.to_string(),
    }
}

/// Generic names handed out by the backend: `"User"` or `"User <anything>"`.
pub fn is_placeholder_name(name: &str) -> bool {
    name.split_whitespace()
        .next()
        .is_some_and(|first| first.eq_ignore_ascii_case("user"))
}

fn peer_digest(id: &str) -> String {
    hex::encode(Sha256::digest(id.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, 14, 0, 0)
            .single()
            .expect("valid datetime")
    }

    fn member(user_id: &str, name: Option<&str>) -> GroupMemberLocation {
        GroupMemberLocation {
            user_id: user_id.into(),
            display_name: name.map(String::from),
            latitude: 41.57,
            longitude: 2.26,
            last_updated: now(),
            sharing: true,
        }
    }

    fn peer(id: &str, lat: Option<f64>, lon: Option<f64>) -> RawPeer {
        RawPeer {
            id: id.into(),
            latitude: lat,
            longitude: lon,
            seen_at: now(),
        }
    }

    #[test]
    fn empty_roster_uses_detected_peers() {
        let out = resolve_presence(
            &[],
            &[peer("abc", Some(41.57), Some(2.26))],
            &LocalIdentity::default(),
        );
        assert_eq!(out.len(), 1);
        assert!(out[0].user_id.starts_with(BEACON_ID_PREFIX));
        assert!(out[0].sharing);
        assert!(
            out[0]
                .display_name
                .as_deref()
                .expect("name")
                .starts_with("Nearby visitor")
        );
    }

    #[test]
    fn roster_suppresses_detected_peers() {
        let out = resolve_presence(
            &[member("u1", Some("Alex"))],
            &[peer("abc", Some(41.57), Some(2.26))],
            &LocalIdentity::default(),
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].user_id, "u1");
        assert!(out.iter().all(|m| !m.user_id.starts_with(BEACON_ID_PREFIX)));
    }

    #[test]
    fn peers_without_full_position_are_dropped() {
        let out = resolve_presence(
            &[],
            &[
                peer("a", Some(1.0), None),
                peer("b", None, Some(1.0)),
                peer("c", Some(1.0), Some(2.0)),
            ],
            &LocalIdentity::default(),
        );
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn pseudo_identity_is_stable() {
        let a = synthesize_member(&peer("abc", Some(0.0), Some(0.0))).expect("member");
        let b = synthesize_member(&peer("abc", Some(5.0), Some(5.0))).expect("member");
        let c = synthesize_member(&peer("abd", Some(0.0), Some(0.0))).expect("member");
        assert_eq!(a.user_id, b.user_id);
        assert_ne!(a.user_id, c.user_id);
        assert_eq!(a.user_id.len(), BEACON_ID_PREFIX.len() + PSEUDO_ID_HEX_LEN);
    }

    #[test]
    fn pseudo_identity_is_lowercase_sha256_prefix() {
        let member = synthesize_member(&peer("abc", Some(0.0), Some(0.0))).expect("member");
        assert_eq!(member.user_id, "ble_ba7816bf8f01");
    }

    #[test]
    fn dedup_keeps_last_write_in_first_slot() {
        let mut late = member("u1", Some("Later"));
        late.latitude = 10.0;
        let out = dedup_by_user(vec![member("u1", Some("Early")), member("u2", None), late]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].user_id, "u1");
        assert_eq!(out[0].display_name.as_deref(), Some("Later"));
        assert!((out[0].latitude - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn local_user_name_is_forced() {
        let identity = LocalIdentity {
            user_id: Some("me".into()),
            display_name: Some("Sam".into()),
        };
        let out = resolve_presence(&[member("me", Some("User 12"))], &[], &identity);
        assert_eq!(out[0].display_name.as_deref(), Some("Sam"));
    }

    #[test]
    fn placeholder_and_blank_names_are_replaced() {
        let identity = LocalIdentity::default();
        for name in [None, Some(""), Some("   "), Some("User"), Some("user 4821")] {
            let m = member("u9", name);
            assert_eq!(normalize_display_name(&m, &identity), PLACEHOLDER_NAME, "{name:?}");
        }
        let m = member("u9", Some("Username fan"));
        assert_eq!(normalize_display_name(&m, &identity), "Username fan");
    }
}
