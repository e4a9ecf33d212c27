//! Degraded-value policy shared by the offline-first cache.

use serde::{Deserialize, Serialize};

use crate::types::CircuitState;

/// A live value that may carry a "no data" sentinel.
pub trait Degradable: Clone {
    /// `true` for the sentinel a source emits when it has nothing real to say.
    fn is_degraded(&self) -> bool;

    /// Value served when neither the source nor the cache has anything.
    fn degraded_default() -> Self;

    /// Mark a value served from the cache as stale.
    fn annotate_stale(&mut self, age_secs: i64);
}

impl Degradable for CircuitState {
    fn is_degraded(&self) -> bool {
        self.is_unknown()
    }

    fn degraded_default() -> Self {
        CircuitState::unknown("no data available")
    }

    fn annotate_stale(&mut self, age_secs: i64) {
        let marker = format!("(cached {}s ago)", age_secs.max(0));
        self.message = Some(match self.message.take() {
            Some(msg) if !msg.is_empty() => format!("{msg} {marker}"),
            _ => marker,
        });
    }
}

/// Lists (rosters, beacon configs) are degraded when empty. Staleness for a
/// list is carried only by [`Freshness`].
impl<T: Clone> Degradable for Vec<T> {
    fn is_degraded(&self) -> bool {
        self.is_empty()
    }

    fn degraded_default() -> Self {
        Vec::new()
    }

    fn annotate_stale(&mut self, _age_secs: i64) {}
}

/// Where an emitted value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Freshness {
    Live,
    Stale { cached_at_epoch: i64 },
    Default,
}

/// One emission from the offline-first cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cached<T> {
    pub value: T,
    pub freshness: Freshness,
}

impl<T> Cached<T> {
    pub fn is_stale(&self) -> bool {
        matches!(self.freshness, Freshness::Stale { .. })
    }
}
