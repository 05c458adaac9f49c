//! Telemetry and logging initialization
//!
//! TigerStyle: Explicit telemetry configuration, initialized once per process.

use crate::error::{Error, Result};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Plain,
    /// One JSON object per event
    Json,
}

impl LogFormat {
    fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Plain
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to the startup event
    pub service_name: String,
    /// Log level filter used when `RUST_LOG` is unset
    pub log_level: String,
    /// Output format
    pub format: LogFormat,
    /// Whether to write events to stdout at all
    pub stdout_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "beacon".to_string(),
            log_level: "info".to_string(),
            format: LogFormat::Plain,
            stdout_enabled: true,
        }
    }
}

impl TelemetryConfig {
    /// Create a new configuration with the given service name
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Set the log level filter
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Set the output format
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Disable stdout output
    pub fn without_stdout(mut self) -> Self {
        self.stdout_enabled = false;
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - `RUST_LOG`: Log level filter (default: "info")
    /// - `BEACON_LOG_FORMAT`: `json` or `plain` (default: plain)
    pub fn from_env(service_name: impl Into<String>) -> Self {
        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let format = std::env::var("BEACON_LOG_FORMAT")
            .map(|v| LogFormat::parse(&v))
            .unwrap_or_default();

        Self {
            service_name: service_name.into(),
            log_level,
            format,
            stdout_enabled: true,
        }
    }
}

/// Guard returned by [`init_telemetry`]
///
/// Held by `main` for the process lifetime.
#[derive(Debug)]
pub struct TelemetryGuard {}

/// Initialize the global tracing subscriber
///
/// # Errors
/// Returns `Error::Internal` if a global subscriber is already installed.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let plain_layer = (config.stdout_enabled && config.format == LogFormat::Plain)
        .then(|| tracing_subscriber::fmt::layer().with_target(true));
    let json_layer = (config.stdout_enabled && config.format == LogFormat::Json)
        .then(|| tracing_subscriber::fmt::layer().json().with_current_span(true));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(plain_layer)
        .with(json_layer)
        .try_init()
        .map_err(|e| Error::internal(format!("failed to initialize tracing subscriber: {}", e)))?;

    tracing::info!(
        service = %config.service_name,
        format = ?config.format,
        "Telemetry initialized"
    );

    Ok(TelemetryGuard {})
}
