//! circuitwatch-runtime: wires the cloud pollers, the beacon source and the
//! snapshot store into the arbitrated, offline-first output streams.

pub mod offline_cache;
pub mod pipeline;

pub use offline_cache::{CacheSource, OfflineFirstCache, Reading, SourceError, WatchSource};
pub use pipeline::{Pipeline, PipelineConfig, PipelineOutputs};
