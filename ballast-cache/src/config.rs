//! Reference cache configuration.

use ballast_core::config::{
    env_duration_secs, env_or, require_at_least_one, require_positive_duration,
};
use ballast_core::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_PARENTS_TTL_SECS: u64 = 3600;
pub const DEFAULT_SUBJECTS_TTL_SECS: u64 = 3600;
pub const DEFAULT_CHARACTERISTICS_TTL_SECS: u64 = 1800;
pub const DEFAULT_MAX_CHARACTERISTICS: usize = 1000;
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 300;

/// Configuration for the reference cache.
///
/// Fixed at construction; the cache never re-reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL for the parents key-space.
    pub parents_ttl: Duration,
    /// TTL for the subjects key-space.
    pub subjects_ttl: Duration,
    /// TTL for each per-subject characteristics entry.
    pub characteristics_ttl: Duration,
    /// Maximum number of subjects with cached characteristics.
    pub max_characteristics: usize,
    /// How often the background cleanup sweeps expired entries.
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            parents_ttl: Duration::from_secs(DEFAULT_PARENTS_TTL_SECS),
            subjects_ttl: Duration::from_secs(DEFAULT_SUBJECTS_TTL_SECS),
            characteristics_ttl: Duration::from_secs(DEFAULT_CHARACTERISTICS_TTL_SECS),
            max_characteristics: DEFAULT_MAX_CHARACTERISTICS,
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create CacheConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `BALLAST_CACHE_PARENTS_TTL_SECS` (default: 3600)
    /// - `BALLAST_CACHE_SUBJECTS_TTL_SECS` (default: 3600)
    /// - `BALLAST_CACHE_CHARACTERISTICS_TTL_SECS` (default: 1800)
    /// - `BALLAST_CACHE_MAX_CHARACTERISTICS` (default: 1000)
    /// - `BALLAST_CACHE_CLEANUP_INTERVAL_SECS` (default: 300)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            parents_ttl: env_duration_secs("BALLAST_CACHE_PARENTS_TTL_SECS", defaults.parents_ttl),
            subjects_ttl: env_duration_secs(
                "BALLAST_CACHE_SUBJECTS_TTL_SECS",
                defaults.subjects_ttl,
            ),
            characteristics_ttl: env_duration_secs(
                "BALLAST_CACHE_CHARACTERISTICS_TTL_SECS",
                defaults.characteristics_ttl,
            ),
            max_characteristics: env_or(
                "BALLAST_CACHE_MAX_CHARACTERISTICS",
                defaults.max_characteristics,
            ),
            cleanup_interval: env_duration_secs(
                "BALLAST_CACHE_CLEANUP_INTERVAL_SECS",
                defaults.cleanup_interval,
            ),
        }
    }

    /// Set one TTL for all three key-spaces.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.parents_ttl = ttl;
        self.subjects_ttl = ttl;
        self.characteristics_ttl = ttl;
        self
    }

    pub fn with_parents_ttl(mut self, ttl: Duration) -> Self {
        self.parents_ttl = ttl;
        self
    }

    pub fn with_subjects_ttl(mut self, ttl: Duration) -> Self {
        self.subjects_ttl = ttl;
        self
    }

    pub fn with_characteristics_ttl(mut self, ttl: Duration) -> Self {
        self.characteristics_ttl = ttl;
        self
    }

    /// Set the characteristics capacity.
    pub fn with_max_characteristics(mut self, max: usize) -> Self {
        self.max_characteristics = max;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive_duration("cache.parents_ttl", self.parents_ttl)?;
        require_positive_duration("cache.subjects_ttl", self.subjects_ttl)?;
        require_positive_duration("cache.characteristics_ttl", self.characteristics_ttl)?;
        require_at_least_one("cache.max_characteristics", self.max_characteristics as u64)?;
        require_positive_duration("cache.cleanup_interval", self.cleanup_interval)?;
        Ok(())
    }
}
