//! Hub configuration.

use crate::error::{HubError, HubResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What to do when a connection's outbound queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlowConsumerPolicy {
    /// Discard the oldest queued message to make room.
    #[default]
    DropOldest,
    /// Close the connection.
    Disconnect,
}

/// WebSocket hub and HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Address to bind.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// WebSocket endpoint path.
    #[serde(default = "default_ws_path")]
    pub ws_path: String,
    /// Maximum concurrent WebSocket connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Outbound queue capacity per connection.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default)]
    pub slow_consumer: SlowConsumerPolicy,
    /// Send a heartbeat after this long without outbound traffic (ms).
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Close a connection after this long without inbound frames (ms).
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    /// Give up on a single frame write after this long (ms).
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_max_connections() -> usize {
    64
}

fn default_queue_capacity() -> usize {
    64
}

fn default_heartbeat_interval_ms() -> u64 {
    15_000
}

fn default_idle_timeout_ms() -> u64 {
    45_000
}

fn default_write_timeout_ms() -> u64 {
    10_000
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            ws_path: default_ws_path(),
            max_connections: default_max_connections(),
            queue_capacity: default_queue_capacity(),
            slow_consumer: SlowConsumerPolicy::default(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

impl HubConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn validate(&self) -> HubResult<()> {
        if !self.ws_path.starts_with('/') {
            return Err(HubError::InvalidConfig(format!(
                "ws_path must start with '/': {}",
                self.ws_path
            )));
        }
        if self.max_connections == 0 || self.queue_capacity == 0 {
            return Err(HubError::InvalidConfig(
                "max_connections and queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.heartbeat_interval_ms == 0 || self.write_timeout_ms == 0 {
            return Err(HubError::InvalidConfig(
                "heartbeat_interval_ms and write_timeout_ms must be positive".to_string(),
            ));
        }
        if self.idle_timeout_ms <= self.heartbeat_interval_ms {
            return Err(HubError::InvalidConfig(format!(
                "idle_timeout_ms ({}) must exceed heartbeat_interval_ms ({})",
                self.idle_timeout_ms, self.heartbeat_interval_ms
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = HubConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.listen_addr(), "0.0.0.0:8080");
        assert_eq!(config.slow_consumer, SlowConsumerPolicy::DropOldest);
    }

    #[test]
    fn test_policy_deserialize() {
        let policy: SlowConsumerPolicy = serde_json::from_str("\"disconnect\"").unwrap();
        assert_eq!(policy, SlowConsumerPolicy::Disconnect);
    }

    #[test]
    fn test_idle_timeout_must_exceed_heartbeat() {
        let config = HubConfig {
            heartbeat_interval_ms: 10_000,
            idle_timeout_ms: 5_000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_write_timeout_rejected() {
        let config = HubConfig {
            write_timeout_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ws_path_validation() {
        let config = HubConfig {
            ws_path: "ws".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
