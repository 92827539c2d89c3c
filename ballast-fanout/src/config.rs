//! Executor configuration.

use ballast_core::config::{env_or, require_at_least_one};
use ballast_core::ConfigError;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

/// Concurrency used when none (or zero) is given.
pub const DEFAULT_CONCURRENCY: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Maximum number of workers in flight at once.
    pub concurrency: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl ExecutorConfig {
    /// Load from `BALLAST_EXECUTOR_CONCURRENCY` (default: 10).
    pub fn from_env() -> Self {
        Self {
            concurrency: env_or("BALLAST_EXECUTOR_CONCURRENCY", DEFAULT_CONCURRENCY),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        require_at_least_one("executor.concurrency", self.concurrency as u64)
    }
}

/// Map a requested concurrency to the one actually used.
///
/// Zero selects the default; anything above the semaphore's permit limit is
/// clamped to it, so `usize::MAX` reads as "unbounded".
pub fn effective_concurrency(requested: usize) -> usize {
    match requested {
        0 => DEFAULT_CONCURRENCY,
        n => n.min(Semaphore::MAX_PERMITS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_concurrency() {
        assert_eq!(effective_concurrency(0), DEFAULT_CONCURRENCY);
        assert_eq!(effective_concurrency(1), 1);
        assert_eq!(effective_concurrency(64), 64);
    }

    #[test]
    fn test_effective_concurrency_clamps_to_permit_limit() {
        assert_eq!(effective_concurrency(usize::MAX), Semaphore::MAX_PERMITS);
        assert_eq!(
            effective_concurrency(Semaphore::MAX_PERMITS),
            Semaphore::MAX_PERMITS
        );
    }

    #[test]
    fn test_validate() {
        assert!(ExecutorConfig::default().validate().is_ok());
        assert!(ExecutorConfig::default().with_concurrency(0).validate().is_err());
    }
}
