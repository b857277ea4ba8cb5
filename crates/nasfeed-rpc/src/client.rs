//! JSON-RPC 2.0 client for the telemetry backend.
//!
//! Each call is bounded: at most `attempts` tries of at most `timeout` each,
//! separated by the configured backoff. Only transport failures are retried;
//! a well-formed error reply from the peer is returned on the first attempt.

use crate::config::RpcConfig;
use crate::error::{RpcError, RpcResult};
use crate::protocol::{parse_response, JsonRpcRequest};
use nasfeed_telemetry::Metrics;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Client for the backend JSON-RPC endpoint.
#[derive(Debug)]
pub struct RpcClient {
    client: Client,
    config: RpcConfig,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(config: RpcConfig) -> RpcResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.timeout())
            .build()
            .map_err(|e| RpcError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    /// Call `method` with `params`.
    ///
    /// `timeout` overrides the configured per-attempt timeout.
    pub async fn call<P>(
        &self,
        method: &str,
        params: &P,
        timeout: Option<Duration>,
    ) -> RpcResult<Value>
    where
        P: Serialize + ?Sized,
    {
        if method.is_empty() {
            return Err(RpcError::InvalidRequest("method name is empty".to_string()));
        }
        let params = serde_json::to_value(params)
            .map_err(|e| RpcError::InvalidRequest(format!("params not serializable: {e}")))?;

        let timeout = timeout.unwrap_or_else(|| self.config.timeout());
        let attempts = self.config.attempts();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let err = match self.call_once(method, &params, timeout).await {
                Ok(result) => {
                    Metrics::rpc_attempt(method, "ok");
                    if attempt > 1 {
                        debug!(method, attempt, "RPC call succeeded after retry");
                    }
                    return Ok(result);
                }
                Err(err) => err,
            };

            Metrics::rpc_attempt(method, err.metric_label());

            if !err.is_retryable() || attempt >= attempts {
                if err.is_retryable() {
                    warn!(method, attempts, error = %err, "RPC retries exhausted");
                }
                return Err(err);
            }

            let delay = self.config.retry_delay(attempt);
            warn!(
                method,
                attempt,
                attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "RPC transport failure, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn call_once(&self, method: &str, params: &Value, timeout: Duration) -> RpcResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(method, params, id);

        let response = self
            .client
            .post(&self.config.url)
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| RpcError::transport(method, &e))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| RpcError::transport(method, &e))?;

        if !status.is_success() {
            // Some servers pair JSON-RPC error objects with non-2xx codes.
            if let Err(remote @ RpcError::Remote { .. }) = parse_response(method, id, &body) {
                return Err(remote);
            }
            return Err(RpcError::HttpStatus {
                method: method.to_string(),
                status: status.as_u16(),
            });
        }

        parse_response(method, id, &body)
    }
}
