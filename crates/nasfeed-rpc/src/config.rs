//! RPC client configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delay growth between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// Same delay before every retry.
    Fixed,
    /// `retry_delay * 2^(n-1)`, capped at `max_retry_delay_ms`.
    #[default]
    Exponential,
}

/// Backend JSON-RPC client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// JSON-RPC endpoint (e.g. "http://127.0.0.1:9090/rpc").
    pub url: String,
    /// Default per-attempt timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Total attempts per call, including the first. 0 is treated as 1.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay between attempts in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default)]
    pub backoff: BackoffStrategy,
    /// Upper bound for exponential backoff in milliseconds.
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_max_retry_delay_ms() -> u64 {
    5_000
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:9090/rpc".to_string(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            backoff: BackoffStrategy::default(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
        }
    }
}

impl RpcConfig {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Delay to wait after the `failed`-th failed attempt (1-based).
    pub fn retry_delay(&self, failed: u32) -> Duration {
        let base = self.retry_delay_ms;
        let delay = match self.backoff {
            BackoffStrategy::Fixed => base,
            BackoffStrategy::Exponential => {
                // failed=1 -> base, failed=2 -> 2*base, failed=3 -> 4*base
                let exponent = failed.saturating_sub(1).min(10);
                base.saturating_mul(1u64 << exponent)
                    .min(self.max_retry_delay_ms.max(base))
            }
        };
        Duration::from_millis(delay)
    }

    /// Upper bound on how long a single call can block.
    pub fn worst_case_duration(&self, timeout: Duration) -> Duration {
        let attempts = self.attempts();
        let waits: Duration = (1..attempts).map(|n| self.retry_delay(n)).sum();
        timeout * attempts + waits
    }
}
