//! BALLAST Client - Outbound Call Governance
//!
//! A token-bucket [`RateLimiter`] for quota-constrained upstreams and an
//! [`ApiClient`] that takes one token per outbound request.

pub mod client;
pub mod rate_limiter;

pub use client::ApiClient;
pub use rate_limiter::{RateLimitConfig, RateLimiter};
