//! circuitwatch-source-beacon: local safety broadcast source.
//! Decodes relayed beacon frames into a latest-signal stream and a
//! detected-peers stream, and manages the scan lifecycle through leases.

pub mod frame;
pub mod relay;
pub mod source;

pub use frame::FrameError;
pub use source::{BeaconSource, IngestOutcome, LocalSignalSource, ScanCoordinator, ScanLease};
