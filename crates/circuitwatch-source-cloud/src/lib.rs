//! circuitwatch-source-cloud: cloud-facing sources and write path.
//! Polls the venue circuit state and the group roster, degrading every
//! failure to a sentinel value, and provisions/upserts roster rows with
//! bounded retry.

pub mod api;
pub mod error;
pub mod http;
pub mod roster_poller;
pub mod roster_repo;
pub mod state_poller;

pub use api::{CloudApi, SchemaBackend};
pub use error::{CloudError, WriteError};
pub use http::HttpCloudClient;
pub use roster_poller::NetworkRosterPoller;
pub use roster_repo::RosterRepository;
pub use state_poller::NetworkStatePoller;
