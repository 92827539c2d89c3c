//! BALLAST Cache - TTL reference-data cache
//!
//! Per-key-space TTL cache in front of a [`ReferenceFetcher`], with a
//! capacity-bounded characteristics key-space and an owned background
//! expiry sweep.

pub mod bounded;
pub mod cleanup;
pub mod config;
pub mod entry;
pub mod reference;
pub mod stats;

pub use bounded::{BoundedTtlMap, InsertOutcome};
pub use cleanup::{CleanupHandle, CleanupMetrics, CleanupSnapshot};
pub use config::CacheConfig;
pub use entry::{CacheEntry, TtlSlot};
pub use reference::{CleanupReport, KeySpace, ReferenceCache, ReferenceFetcher};
pub use stats::CacheStats;
