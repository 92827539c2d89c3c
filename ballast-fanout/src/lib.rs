//! BALLAST Fan-out - bounded-concurrency batch executor
//!
//! Maps a worker over a batch of [`WorkItem`]s with at most `concurrency`
//! workers in flight and collects a per-id result or failure.

pub mod config;
pub mod executor;
pub mod item;
pub mod outcome;

pub use config::{ExecutorConfig, DEFAULT_CONCURRENCY};
pub use executor::FanOutExecutor;
pub use item::{BatchItem, WorkItem};
pub use outcome::{BatchError, BatchOutcome, ItemFailure};
