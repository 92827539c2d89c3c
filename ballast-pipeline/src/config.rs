//! Aggregated configuration for the `ballast` binary.

use ballast_cache::CacheConfig;
use ballast_client::RateLimitConfig;
use ballast_core::config::{env_or, require_at_least_one};
use ballast_core::{BallastResult, RetryConfig};
use ballast_fanout::ExecutorConfig;
use serde::{Deserialize, Serialize};

use crate::telemetry::TelemetryConfig;

pub const DEFAULT_BATCH_SIZE: usize = 25;
pub const DEFAULT_MODEL_ENDPOINT: &str = "v1/complete";

/// Everything the binary needs, loaded once at startup.
///
/// Secrets such as the model API key are read separately and never stored
/// here, since this struct is printable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub executor: ExecutorConfig,
    pub cache: CacheConfig,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
    pub telemetry: TelemetryConfig,
    /// Catalog API base URL; the synthetic catalog is used when unset.
    pub catalog_url: Option<String>,
    /// Model API base URL; the synthetic model is used when unset.
    pub model_url: Option<String>,
    pub model_endpoint: String,
    /// Size of the synthetic batch to enrich.
    pub batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            executor: ExecutorConfig::default(),
            cache: CacheConfig::default(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            telemetry: TelemetryConfig::default(),
            catalog_url: None,
            model_url: None,
            model_endpoint: DEFAULT_MODEL_ENDPOINT.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl PipelineConfig {
    /// Load every section from its `BALLAST_*` variables.
    ///
    /// Pipeline-level variables:
    /// - `BALLAST_CATALOG_URL` (optional)
    /// - `BALLAST_MODEL_URL` (optional)
    /// - `BALLAST_MODEL_ENDPOINT` (default: "v1/complete")
    /// - `BALLAST_BATCH_SIZE` (default: 25)
    ///
    /// Fails when a variable that cannot fall back, such as
    /// `BALLAST_LOG_FORMAT`, holds an unrecognised value.
    pub fn from_env() -> BallastResult<Self> {
        Ok(Self {
            executor: ExecutorConfig::from_env(),
            cache: CacheConfig::from_env(),
            rate_limit: RateLimitConfig::from_env(),
            retry: RetryConfig::from_env(),
            telemetry: TelemetryConfig::from_env()?,
            catalog_url: non_empty_env("BALLAST_CATALOG_URL"),
            model_url: non_empty_env("BALLAST_MODEL_URL"),
            model_endpoint: env_or("BALLAST_MODEL_ENDPOINT", DEFAULT_MODEL_ENDPOINT.to_string()),
            batch_size: env_or("BALLAST_BATCH_SIZE", DEFAULT_BATCH_SIZE),
        })
    }

    pub fn validate(&self) -> BallastResult<()> {
        self.executor.validate()?;
        self.cache.validate()?;
        self.rate_limit.validate()?;
        self.retry.validate()?;
        require_at_least_one("batch_size", self.batch_size as u64)?;
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
