//! circuitwatch-core: circuit state and group presence arbitration.
//! Pure types and decision logic shared by the sources and the runtime.
//! No IO, no async: every function takes its inputs (including `now`) explicitly.

pub mod arbiter;
pub mod combine;
pub mod degrade;
pub mod presence;
pub mod retry;
pub mod types;

pub use arbiter::{ArbitratedState, StateOrigin, arbitrate, resolve_app_mode, resolve_circuit_state};
pub use combine::CombineLatest2;
pub use degrade::{Cached, Degradable, Freshness};
pub use presence::resolve_presence;
pub use retry::{RetryDecision, RetryPolicy, WriteOutcome};
pub use types::{
    AppMode, BleSignal, CircuitMode, CircuitState, CoreError, GroupMemberLocation, LocalIdentity,
    RawPeer, SIGNAL_TTL_SECS,
};
