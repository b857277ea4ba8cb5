//! Breaker-protected fetch path.
//!
//! [`GuardedSource`] is the one call path to the backend: pollers use it once
//! per cycle, and request/response handlers use the same instance so both
//! share each kind's breaker.

use crate::breaker::{Admission, BreakerRegistry, CircuitBreaker};
use crate::error::RpcError;
use crate::source::DataSource;
use nasfeed_core::{DataKind, ErrorCode};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum GuardedError {
    /// The breaker refused the call; nothing was sent.
    #[error("Circuit breaker open for {kind} (retry in {retry_in:?})")]
    CircuitOpen {
        kind: DataKind,
        retry_in: Duration,
        consecutive_failures: u32,
    },

    /// The call was attempted and failed; the failure has been recorded.
    #[error("Fetch failed for {kind}: {source}")]
    Fetch {
        kind: DataKind,
        #[source]
        source: RpcError,
        consecutive_failures: u32,
    },
}

impl GuardedError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::CircuitOpen { .. } => ErrorCode::CircuitBreakerOpen,
            Self::Fetch { source, .. } => source.error_code(),
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        match self {
            Self::CircuitOpen {
                consecutive_failures,
                ..
            }
            | Self::Fetch {
                consecutive_failures,
                ..
            } => *consecutive_failures,
        }
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }
}

/// Releases the half-open probe slot if the call future is dropped before it
/// reports a result.
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl<'a> ProbeGuard<'a> {
    fn new(breaker: &'a CircuitBreaker, admission: Admission) -> Self {
        Self {
            breaker,
            armed: admission == Admission::Probe,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.abandon_probe();
        }
    }
}

/// A data source gated by per-kind circuit breakers.
#[derive(Debug)]
pub struct GuardedSource<S> {
    source: S,
    breakers: BreakerRegistry,
}

impl<S: DataSource> GuardedSource<S> {
    pub fn new(source: S, breakers: BreakerRegistry) -> Self {
        Self { source, breakers }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    /// Fetch `kind` if its breaker admits the call, recording the outcome.
    pub async fn fetch(&self, kind: &DataKind) -> Result<Value, GuardedError> {
        let breaker = self.breakers.get(kind.as_str());

        let admission = breaker.admit();
        if let Admission::Rejected { retry_in } = admission {
            debug!(
                kind = %kind,
                retry_in_ms = retry_in.as_millis() as u64,
                "Breaker open, skipping live call"
            );
            return Err(GuardedError::CircuitOpen {
                kind: kind.clone(),
                retry_in,
                consecutive_failures: breaker.consecutive_failures(),
            });
        }

        let mut probe = ProbeGuard::new(&breaker, admission);
        let result = self.source.fetch(kind).await;
        probe.disarm();

        match result {
            Ok(payload) => {
                breaker.record_success();
                Ok(payload)
            }
            Err(source) => {
                let consecutive_failures = breaker.record_failure();
                Err(GuardedError::Fetch {
                    kind: kind.clone(),
                    source,
                    consecutive_failures,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::{BreakerConfig, BreakerState};
    use crate::source::{FixtureFailure, FixtureSource};
    use serde_json::json;
    use std::sync::Arc;

    fn guarded(
        threshold: u32,
        cooldown_ms: u64,
    ) -> (Arc<FixtureSource>, GuardedSource<Arc<FixtureSource>>) {
        let fixture = Arc::new(
            FixtureSource::new()
                .with_payload(DataKind::system_status(), json!({"hostname": "nas01"}))
                .with_payload(DataKind::compression_update(), json!({"jobs": []})),
        );
        let breakers = BreakerRegistry::new(BreakerConfig {
            failure_threshold: threshold,
            cooldown_ms,
        });
        (fixture.clone(), GuardedSource::new(fixture, breakers))
    }

    #[tokio::test]
    async fn test_open_breaker_skips_call() {
        let (fixture, source) = guarded(2, 60_000);
        let kind = DataKind::system_status();
        fixture.fail(kind.clone(), FixtureFailure::Transport);

        for _ in 0..2 {
            let err = source.fetch(&kind).await.unwrap_err();
            assert_eq!(err.error_code(), ErrorCode::TransportError);
        }
        assert_eq!(source.breakers().get(kind.as_str()).state(), BreakerState::Open);

        let err = source.fetch(&kind).await.unwrap_err();
        assert!(err.is_circuit_open());
        assert_eq!(err.error_code(), ErrorCode::CircuitBreakerOpen);
        assert_eq!(err.consecutive_failures(), 2);
        assert_eq!(fixture.call_count(&kind), 2, "open breaker must not call the source");
    }

    #[tokio::test]
    async fn test_failing_kind_does_not_gate_other_kinds() {
        let (fixture, source) = guarded(1, 60_000);
        fixture.fail(DataKind::compression_update(), FixtureFailure::Transport);

        assert!(source.fetch(&DataKind::compression_update()).await.is_err());
        assert!(source
            .fetch(&DataKind::compression_update())
            .await
            .unwrap_err()
            .is_circuit_open());

        let ok = source.fetch(&DataKind::system_status()).await.unwrap();
        assert_eq!(ok["hostname"], "nas01");
    }

    #[tokio::test]
    async fn test_probe_success_closes_breaker() {
        let (fixture, source) = guarded(1, 0);
        let kind = DataKind::system_status();

        fixture.fail(kind.clone(), FixtureFailure::Transport);
        assert!(source.fetch(&kind).await.is_err());

        fixture.recover(&kind);
        let payload = source.fetch(&kind).await.unwrap();

        assert_eq!(payload["hostname"], "nas01");
        let breaker = source.breakers().get(kind.as_str());
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.consecutive_failures(), 0);
    }
}
