//! Token bucket rate limiting for quota-constrained upstreams.
//!
//! Tokens accumulate at one per `refill_interval` up to `max_tokens`; each
//! outbound request consumes one. Refill is lazy: it happens inside the same
//! critical section as the decrement, so two callers can never spend the same
//! freshly refilled token.
//!
//! ## Drift
//!
//! `last_refill` advances by whole intervals only, so a partial interval
//! that has already elapsed still counts toward the next token. The one
//! exception is a full bucket: there `last_refill` is pinned to `now`, since
//! the bucket cannot bank tokens past its capacity.
//!
//! ## Fairness
//!
//! Waiters are not queued. Whoever retries first after a token appears wins;
//! with a finite refill interval every waiter eventually succeeds.

use ballast_core::{
    config::{env_duration_ms, env_or, require_at_least_one, require_positive_duration},
    deadline_after, elapsed_between, BallastResult, Clock, ConfigError, Context, SystemClock,
    Timestamp,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

const ACQUIRE_OPERATION: &str = "rate_limiter.acquire";

/// Rate limit configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Bucket capacity (tokens available immediately)
    pub max_tokens: u32,
    /// Time to accrue one token
    pub refill_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_tokens: 10,
            refill_interval: Duration::from_millis(100),
        }
    }
}

impl RateLimitConfig {
    /// `requests` per second, bursting up to `requests.min(5)`.
    pub fn per_second(requests: u32) -> Self {
        let requests = requests.max(1);
        Self {
            max_tokens: requests.min(5),
            refill_interval: Duration::from_secs(1) / requests,
        }
    }

    /// `requests` per minute, bursting up to `requests.min(10)`.
    pub fn per_minute(requests: u32) -> Self {
        let requests = requests.max(1);
        Self {
            max_tokens: requests.min(10),
            refill_interval: Duration::from_secs(60) / requests,
        }
    }

    /// Set burst size.
    pub fn with_burst(mut self, burst: u32) -> Self {
        self.max_tokens = burst;
        self
    }

    /// Load from environment variables.
    ///
    /// - `BALLAST_RATE_LIMIT_MAX_TOKENS` (default: 10)
    /// - `BALLAST_RATE_LIMIT_REFILL_INTERVAL_MS` (default: 100)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_tokens: env_or("BALLAST_RATE_LIMIT_MAX_TOKENS", defaults.max_tokens),
            refill_interval: env_duration_ms(
                "BALLAST_RATE_LIMIT_REFILL_INTERVAL_MS",
                defaults.refill_interval,
            ),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        require_at_least_one("rate_limit.max_tokens", self.max_tokens as u64)?;
        require_positive_duration("rate_limit.refill_interval", self.refill_interval)
    }
}

/// The mutable bucket record. Only ever touched under the limiter's lock.
#[derive(Debug)]
struct RateBucket {
    tokens: u32,
    max_tokens: u32,
    refill_interval: Duration,
    last_refill: Timestamp,
}

impl RateBucket {
    fn refill(&mut self, now: Timestamp) {
        let elapsed = elapsed_between(self.last_refill, now);
        let whole = elapsed.as_nanos() / self.refill_interval.as_nanos();
        if whole == 0 {
            return;
        }

        let room = (self.max_tokens - self.tokens) as u128;
        if whole >= room {
            self.tokens = self.max_tokens;
            self.last_refill = now;
        } else {
            // whole < room <= max_tokens, so it fits in u32
            let added = whole as u32;
            self.tokens += added;
            self.last_refill =
                deadline_after(self.last_refill, self.refill_interval.saturating_mul(added));
        }
    }

    /// Take a token, or report how long until the next one accrues.
    fn take(&mut self, now: Timestamp) -> Result<(), Duration> {
        self.refill(now);
        if self.tokens > 0 {
            self.tokens -= 1;
            return Ok(());
        }
        let next = deadline_after(self.last_refill, self.refill_interval);
        let wait = elapsed_between(now, next);
        Err(if wait.is_zero() { self.refill_interval } else { wait })
    }
}

/// Token bucket rate limiter.
pub struct RateLimiter {
    bucket: Mutex<RateBucket>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a limiter on the system clock, starting with a full bucket.
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a limiter on an injected clock, starting with a full bucket.
    pub fn with_clock(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        let max_tokens = config.max_tokens.max(1);
        let refill_interval = if config.refill_interval.is_zero() {
            Duration::from_nanos(1)
        } else {
            config.refill_interval
        };
        let now = clock.now();
        Self {
            bucket: Mutex::new(RateBucket {
                tokens: max_tokens,
                max_tokens,
                refill_interval,
                last_refill: now,
            }),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RateBucket> {
        // The bucket is updated with plain integer writes, so a panic elsewhere
        // cannot leave it half-written.
        self.bucket.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for a token.
    ///
    /// Returns a cancellation error, without consuming a token, if `ctx`
    /// stops first.
    pub async fn acquire(&self, ctx: &Context) -> BallastResult<()> {
        ctx.check(ACQUIRE_OPERATION)?;

        loop {
            let now = self.clock.now();
            let wait = match self.lock().take(now) {
                Ok(()) => return Ok(()),
                Err(wait) => wait,
            };

            tracing::trace!(wait_ms = wait.as_millis() as u64, "Rate limiter waiting for token");

            tokio::select! {
                biased;
                reason = ctx.cancelled() => {
                    return Err(reason.into_error(ACQUIRE_OPERATION).into());
                }
                _ = self.clock.sleep(wait) => {}
            }
        }
    }

    /// Take a token if one is available right now.
    pub fn try_acquire(&self) -> bool {
        let now = self.clock.now();
        self.lock().take(now).is_ok()
    }

    /// Tokens available right now, after refill.
    pub fn available_tokens(&self) -> u32 {
        let now = self.clock.now();
        let mut bucket = self.lock();
        bucket.refill(now);
        bucket.tokens
    }

    /// Bucket capacity.
    pub fn max_tokens(&self) -> u32 {
        self.lock().max_tokens
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bucket = self.lock();
        f.debug_struct("RateLimiter")
            .field("tokens", &bucket.tokens)
            .field("max_tokens", &bucket.max_tokens)
            .field("refill_interval", &bucket.refill_interval)
            .finish()
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use ballast_core::ManualClock;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Tokens stay within [0, max] and total grants never exceed
        /// the initial burst plus one token per elapsed interval.
        #[test]
        fn prop_tokens_bounded_and_rate_respected(
            max_tokens in 1u32..20,
            refill_ms in 1u64..500,
            steps in prop::collection::vec((0u64..1_000, 0u32..5), 1..50),
        ) {
            let clock = Arc::new(ManualClock::at_epoch());
            let limiter = RateLimiter::with_clock(
                &RateLimitConfig {
                    max_tokens,
                    refill_interval: Duration::from_millis(refill_ms),
                },
                clock.clone(),
            );

            let mut granted = 0u64;
            let mut elapsed_ms = 0u64;
            for (advance_ms, attempts) in steps {
                clock.advance(Duration::from_millis(advance_ms));
                elapsed_ms += advance_ms;
                for _ in 0..attempts {
                    if limiter.try_acquire() {
                        granted += 1;
                    }
                }
                let available = limiter.available_tokens();
                prop_assert!(available <= max_tokens);
                prop_assert!(granted <= max_tokens as u64 + elapsed_ms / refill_ms);
            }
        }
    }
}
