//! Poller configuration.

use crate::error::{FeedError, FeedResult};
use nasfeed_core::DataKind;
use nasfeed_rpc::KindRoute;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// One polled data kind and the backend method that produces it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindConfig {
    pub kind: DataKind,
    /// Backend JSON-RPC method.
    pub method: String,
    #[serde(default = "default_params")]
    pub params: Value,
    /// Per-kind override of the poll interval (ms).
    #[serde(default)]
    pub interval_ms: Option<u64>,
}

fn default_params() -> Value {
    Value::Object(Default::default())
}

impl KindConfig {
    pub fn new(kind: DataKind, method: impl Into<String>) -> Self {
        Self {
            kind,
            method: method.into(),
            params: default_params(),
            interval_ms: None,
        }
    }
}

/// Polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Default interval between poll cycles (ms).
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Capacity of the shared event intake channel.
    #[serde(default = "default_intake_capacity")]
    pub intake_capacity: usize,
    #[serde(default = "default_kinds")]
    pub kinds: Vec<KindConfig>,
}

fn default_interval_ms() -> u64 {
    5_000
}

fn default_intake_capacity() -> usize {
    256
}

fn default_kinds() -> Vec<KindConfig> {
    vec![
        KindConfig::new(DataKind::system_status(), "system.status"),
        KindConfig::new(DataKind::agents_status(), "agents.status"),
        KindConfig::new(DataKind::compression_update(), "compression.jobs.list"),
    ]
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            intake_capacity: default_intake_capacity(),
            kinds: default_kinds(),
        }
    }
}

impl PollerConfig {
    pub fn interval_for(&self, kind: &KindConfig) -> Duration {
        Duration::from_millis(kind.interval_ms.unwrap_or(self.interval_ms))
    }

    /// Backend routes for a live data source.
    pub fn routes(&self) -> HashMap<DataKind, KindRoute> {
        self.kinds
            .iter()
            .map(|k| {
                (
                    k.kind.clone(),
                    KindRoute {
                        method: k.method.clone(),
                        params: k.params.clone(),
                    },
                )
            })
            .collect()
    }

    pub fn kind_names(&self) -> Vec<DataKind> {
        self.kinds.iter().map(|k| k.kind.clone()).collect()
    }

    pub fn validate(&self) -> FeedResult<()> {
        if self.intake_capacity == 0 {
            return Err(FeedError::InvalidConfig(
                "intake_capacity must be at least 1".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for kind in &self.kinds {
            if kind.method.is_empty() {
                return Err(FeedError::InvalidConfig(format!(
                    "kind {} has an empty method",
                    kind.kind
                )));
            }
            if self.interval_for(kind).is_zero() {
                return Err(FeedError::InvalidConfig(format!(
                    "kind {} has a zero poll interval",
                    kind.kind
                )));
            }
            if !seen.insert(&kind.kind) {
                return Err(FeedError::DuplicateKind(kind.kind.to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_kinds() {
        let config = PollerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.kinds.len(), 3);

        let routes = config.routes();
        assert_eq!(
            routes[&DataKind::compression_update()].method,
            "compression.jobs.list"
        );
    }

    #[test]
    fn test_interval_override() {
        let mut kind = KindConfig::new(DataKind::system_status(), "system.status");
        let config = PollerConfig::default();
        assert_eq!(config.interval_for(&kind), Duration::from_secs(5));

        kind.interval_ms = Some(1_000);
        assert_eq!(config.interval_for(&kind), Duration::from_secs(1));
    }

    #[test]
    fn test_duplicate_kind_rejected() {
        let config = PollerConfig {
            kinds: vec![
                KindConfig::new(DataKind::system_status(), "system.status"),
                KindConfig::new(DataKind::system_status(), "system.status.v2"),
            ],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(FeedError::DuplicateKind(_))));
    }

    #[test]
    fn test_empty_method_rejected() {
        let config = PollerConfig {
            kinds: vec![KindConfig::new(DataKind::system_status(), "")],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
