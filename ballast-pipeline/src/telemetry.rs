//! Tracing subscriber initialization.

use ballast_core::config::env_or;
use ballast_core::{BallastResult, ConfigError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(ConfigError::InvalidValue {
                field: "telemetry.log_format".to_string(),
                value: other.to_string(),
                reason: "expected 'pretty' or 'json'".to_string(),
            }),
        }
    }
}

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Service name attached to the startup event
    pub service_name: String,
    pub log_format: LogFormat,
    /// Filter used when `RUST_LOG` is unset
    pub default_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "ballast".to_string(),
            log_format: LogFormat::Pretty,
            default_filter: "ballast=info,ballast_pipeline=info,warn".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Create TelemetryConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `BALLAST_SERVICE_NAME` (default: "ballast")
    /// - `BALLAST_LOG_FORMAT`: `pretty` or `json` (default: pretty)
    /// - `RUST_LOG` is read by the subscriber itself
    ///
    /// An unrecognised `BALLAST_LOG_FORMAT` is an error rather than a silent
    /// fallback.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            service_name: env_or("BALLAST_SERVICE_NAME", defaults.service_name),
            log_format: parse_log_format(
                std::env::var("BALLAST_LOG_FORMAT").ok().as_deref(),
                defaults.log_format,
            )?,
            default_filter: defaults.default_filter,
        })
    }

    pub fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }
}

/// Parse a raw log format setting; unset or blank selects `default`.
fn parse_log_format(raw: Option<&str>, default: LogFormat) -> Result<LogFormat, ConfigError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(default),
        Some(value) => value.parse(),
    }
}

/// Install the global tracing subscriber.
///
/// Call once at startup; a second call fails because a global subscriber is
/// already set.
pub fn init_tracing(config: &TelemetryConfig) -> BallastResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));
    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };
    result.map_err(|e| ConfigError::InvalidValue {
        field: "telemetry".to_string(),
        value: config.service_name.clone(),
        reason: format!("Failed to init subscriber: {}", e),
    })?;

    tracing::info!(
        service_name = %config.service_name,
        log_format = ?config.log_format,
        "Telemetry initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(" text ".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_unknown_log_format_is_rejected() {
        assert_eq!(
            parse_log_format(None, LogFormat::Pretty).unwrap(),
            LogFormat::Pretty
        );
        assert_eq!(
            parse_log_format(Some("  "), LogFormat::Json).unwrap(),
            LogFormat::Json
        );
        assert_eq!(
            parse_log_format(Some("json"), LogFormat::Pretty).unwrap(),
            LogFormat::Json
        );
        match parse_log_format(Some("jsno"), LogFormat::Pretty) {
            Err(ConfigError::InvalidValue { field, value, .. }) => {
                assert_eq!(field, "telemetry.log_format");
                assert_eq!(value, "jsno");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_telemetry_config_default() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "ballast");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(
            config.with_log_format(LogFormat::Json).log_format,
            LogFormat::Json
        );
    }

    #[test]
    fn test_second_init_fails() {
        let config = TelemetryConfig::default();
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}
