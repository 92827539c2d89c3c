//! Configuration helpers shared by every BALLAST crate.
//!
//! Each crate owns its config struct and loads it with `from_env()`; these
//! helpers keep the parsing rules identical across crates. Unparseable
//! values fall back to the default, just like an unset variable.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Parse an environment variable, `None` when unset or unparseable.
pub fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

/// Parse an environment variable or fall back to `default`.
pub fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env_parse(key).unwrap_or(default)
}

/// Read a duration given in milliseconds.
pub fn env_duration_ms(key: &str, default: Duration) -> Duration {
    env_parse::<u64>(key)
        .map(Duration::from_millis)
        .unwrap_or(default)
}

/// Read a duration given in whole seconds.
pub fn env_duration_secs(key: &str, default: Duration) -> Duration {
    env_parse::<u64>(key)
        .map(Duration::from_secs)
        .unwrap_or(default)
}

/// Read a boolean; anything other than "false"/"0" counts as true.
pub fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| {
            let s = s.trim().to_lowercase();
            s != "false" && s != "0"
        })
        .unwrap_or(default)
}

/// Reject a zero duration.
pub fn require_positive_duration(field: &str, value: Duration) -> Result<(), ConfigError> {
    if value.is_zero() {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: format!("{:?}", value),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}

/// Reject a count below one.
pub fn require_at_least_one(field: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(())
}

/// Retry configuration for outbound API clients.
///
/// Only the client layer retries; the cache, limiter and executor never do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// No retries at all.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Load from `BALLAST_RETRY_*` environment variables.
    ///
    /// - `BALLAST_RETRY_MAX_RETRIES` (default: 3)
    /// - `BALLAST_RETRY_INITIAL_BACKOFF_MS` (default: 200)
    /// - `BALLAST_RETRY_MAX_BACKOFF_MS` (default: 10000)
    /// - `BALLAST_RETRY_BACKOFF_MULTIPLIER` (default: 2.0)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_retries: env_or("BALLAST_RETRY_MAX_RETRIES", defaults.max_retries),
            initial_backoff: env_duration_ms(
                "BALLAST_RETRY_INITIAL_BACKOFF_MS",
                defaults.initial_backoff,
            ),
            max_backoff: env_duration_ms("BALLAST_RETRY_MAX_BACKOFF_MS", defaults.max_backoff),
            backoff_multiplier: env_or(
                "BALLAST_RETRY_BACKOFF_MULTIPLIER",
                defaults.backoff_multiplier,
            ),
        }
    }

    /// Backoff before retry number `attempt` (1-based), capped at `max_backoff`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = self.backoff_multiplier.max(1.0).powi(attempt as i32 - 1);
        let millis = self.initial_backoff.as_millis() as f64 * factor;
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "backoff_multiplier".to_string(),
                value: self.backoff_multiplier.to_string(),
                reason: "must be a finite value >= 1.0".to_string(),
            });
        }
        if self.max_backoff < self.initial_backoff {
            return Err(ConfigError::InvalidValue {
                field: "max_backoff".to_string(),
                value: format!("{:?}", self.max_backoff),
                reason: "must not be shorter than initial_backoff".to_string(),
            });
        }
        Ok(())
    }
}
