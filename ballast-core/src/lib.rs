//! BALLAST Core - Shared Types
//!
//! Error taxonomy, cancellation context, injectable time source and config
//! helpers used by the executor, cache, limiter and client crates.

pub mod clock;
pub mod config;
pub mod context;
pub mod error;

use chrono::{DateTime, Utc};

pub use clock::{deadline_after, elapsed_between, to_chrono, Clock, ManualClock, SystemClock};
pub use config::RetryConfig;
pub use context::{CancelReason, Context};
pub use error::{
    BallastError, BallastResult, CancellationError, ConfigError, ExecutorError, UpstreamError,
};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;
