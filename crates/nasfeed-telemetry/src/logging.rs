//! Structured logging initialization.
//!
//! Filter precedence: `RUST_LOG`, then `[logging] filter`, then the built-in
//! default. `RUST_ENV=production` forces JSON output regardless of the
//! configured format.

use crate::error::{TelemetryError, TelemetryResult};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_FILTER: &str =
    "info,nasfeed_rpc=debug,nasfeed_feed=debug,nasfeed_hub=debug,nasfeed_server=debug";

/// Log line layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, human readable.
    #[default]
    Pretty,
    /// One line per event.
    Compact,
    /// One JSON object per event, with span context.
    Json,
}

/// `[logging]` section of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// `EnvFilter` directives, e.g. `"info,nasfeed_hub=trace"`.
    #[serde(default)]
    pub filter: Option<String>,
}

impl LoggingConfig {
    /// Format after applying the `RUST_ENV` override.
    pub fn effective_format(&self) -> LogFormat {
        let production = std::env::var("RUST_ENV")
            .map(|v| v == "production")
            .unwrap_or(false);
        self.format_for(production)
    }

    fn format_for(&self, production: bool) -> LogFormat {
        if production {
            LogFormat::Json
        } else {
            self.format
        }
    }

    /// Filter from `RUST_LOG` if set, otherwise from this config.
    pub fn env_filter(&self) -> TelemetryResult<EnvFilter> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => self.configured_filter(),
        }
    }

    fn configured_filter(&self) -> TelemetryResult<EnvFilter> {
        let directives = self.filter.as_deref().unwrap_or(DEFAULT_FILTER);
        EnvFilter::try_new(directives).map_err(|e| TelemetryError::InvalidFilter {
            directives: directives.to_string(),
            message: e.to_string(),
        })
    }

    /// Reject filter directives that would fail at startup.
    pub fn validate(&self) -> TelemetryResult<()> {
        self.configured_filter().map(|_| ())
    }
}

/// Install the global tracing subscriber.
///
/// Fails if a subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> TelemetryResult<()> {
    let filter = config.env_filter()?;

    let output = match config.effective_format() {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
        LogFormat::Pretty => fmt::layer().pretty().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}
