//! Application configuration.

use crate::error::{AppError, AppResult};
use nasfeed_core::DataKind;
use nasfeed_feed::PollerConfig;
use nasfeed_hub::HubConfig;
use nasfeed_rpc::{BreakerConfig, RpcConfig};
use nasfeed_telemetry::LoggingConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

/// Where poll data comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// Backend JSON-RPC endpoint.
    #[default]
    Live,
    /// Static payloads from the `[fixtures]` table (offline mode).
    Fixture,
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub source: SourceMode,
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Payload per data kind for fixture mode.
    #[serde(default)]
    pub fixtures: HashMap<DataKind, Value>,
}

impl AppConfig {
    /// Load and validate a TOML file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config {path}: {e}")))?;

        Self::parse(&content)
    }

    /// Parse and validate TOML text.
    pub fn parse(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.source == SourceMode::Live && self.rpc.url.trim().is_empty() {
            return Err(AppError::Config("rpc.url is required in live mode".to_string()));
        }
        if self.breaker.failure_threshold == 0 {
            return Err(AppError::Config(
                "breaker.failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.poller.kinds.is_empty() {
            return Err(AppError::Config("poller.kinds must not be empty".to_string()));
        }
        self.poller.validate()?;
        self.hub.validate()?;
        self.logging.validate()?;

        if self.source == SourceMode::Fixture {
            for kind in self.poller.kind_names() {
                if !self.fixtures.contains_key(&kind) {
                    warn!(kind = %kind, "No fixture payload, kind will report errors");
                }
            }
        }
        Ok(())
    }
}
