//! Error types for BALLAST operations

use thiserror::Error;

/// A blocking wait observed cancellation or an expired deadline.
///
/// Kept separate from upstream failures so callers can tell "aborted"
/// apart from "some work failed".
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CancellationError {
    #[error("{operation} cancelled")]
    Cancelled { operation: String },

    #[error("{operation} deadline exceeded")]
    DeadlineExceeded { operation: String },
}

impl CancellationError {
    /// The operation that was waiting when cancellation fired.
    pub fn operation(&self) -> &str {
        match self {
            Self::Cancelled { operation } | Self::DeadlineExceeded { operation } => operation,
        }
    }
}

/// Failures reported by upstream collaborators (fetchers, API clients).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("Fetch of {key_space} failed: {reason}")]
    FetchFailed { key_space: String, reason: String },

    #[error("Request to {service} failed with status {status}: {message}")]
    RequestFailed {
        service: String,
        status: u16,
        message: String,
    },

    #[error("Rate limited by {service}, retry after {retry_after_ms}ms")]
    RateLimited {
        service: String,
        retry_after_ms: u64,
    },

    #[error("Transport error talking to {service}: {reason}")]
    Transport { service: String, reason: String },

    #[error("Invalid response from {service}: {reason}")]
    InvalidResponse { service: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Batch-level executor errors. Per-item failures are not errors here;
/// they are collected into the batch outcome.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("Batch contains duplicate item ids: {ids:?}")]
    DuplicateItemIds { ids: Vec<String> },
}

/// Master error type for all BALLAST errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BallastError {
    #[error("Cancellation: {0}")]
    Cancelled(#[from] CancellationError),

    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),
}

impl BallastError {
    /// True when this error came from a cancelled or timed-out wait.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// True when the failure is transient and a retry may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Upstream(UpstreamError::RateLimited { .. })
            | Self::Upstream(UpstreamError::Transport { .. }) => true,
            Self::Upstream(UpstreamError::RequestFailed { status, .. }) => *status >= 500,
            _ => false,
        }
    }
}

/// Result type alias for BALLAST operations.
pub type BallastResult<T> = Result<T, BallastError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_error_display() {
        let err = CancellationError::Cancelled {
            operation: "rate_limiter.acquire".to_string(),
        };
        assert_eq!(err.to_string(), "rate_limiter.acquire cancelled");
        assert_eq!(err.operation(), "rate_limiter.acquire");

        let err = CancellationError::DeadlineExceeded {
            operation: "fanout.dispatch".to_string(),
        };
        assert!(err.to_string().contains("deadline exceeded"));
    }

    #[test]
    fn test_upstream_error_display_rate_limited() {
        let err = UpstreamError::RateLimited {
            service: "catalog".to_string(),
            retry_after_ms: 1500,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Rate limited"));
        assert!(msg.contains("catalog"));
        assert!(msg.contains("1500"));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "max_tokens".to_string(),
            value: "0".to_string(),
            reason: "must be at least 1".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("max_tokens"));
        assert!(msg.contains("must be at least 1"));
    }

    #[test]
    fn test_ballast_error_from_variants() {
        let cancelled = BallastError::from(CancellationError::Cancelled {
            operation: "x".to_string(),
        });
        assert!(cancelled.is_cancellation());

        let upstream = BallastError::from(UpstreamError::FetchFailed {
            key_space: "parents".to_string(),
            reason: "boom".to_string(),
        });
        assert!(matches!(upstream, BallastError::Upstream(_)));
        assert!(!upstream.is_cancellation());

        let config = BallastError::from(ConfigError::MissingRequired {
            field: "api_key".to_string(),
        });
        assert!(matches!(config, BallastError::Config(_)));

        let executor = BallastError::from(ExecutorError::DuplicateItemIds {
            ids: vec!["img1".to_string()],
        });
        assert!(matches!(executor, BallastError::Executor(_)));
    }

    #[test]
    fn test_retryable_classification() {
        let server = BallastError::from(UpstreamError::RequestFailed {
            service: "catalog".to_string(),
            status: 503,
            message: "unavailable".to_string(),
        });
        assert!(server.is_retryable());

        let client = BallastError::from(UpstreamError::RequestFailed {
            service: "catalog".to_string(),
            status: 400,
            message: "bad request".to_string(),
        });
        assert!(!client.is_retryable());

        let limited = BallastError::from(UpstreamError::RateLimited {
            service: "catalog".to_string(),
            retry_after_ms: 10,
        });
        assert!(limited.is_retryable());

        let cancelled = BallastError::from(CancellationError::Cancelled {
            operation: "x".to_string(),
        });
        assert!(!cancelled.is_retryable());
    }
}
