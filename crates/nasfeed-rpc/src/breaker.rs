//! Per-kind circuit breaker.
//!
//! ```text
//!            failures >= threshold
//!   CLOSED ─────────────────────────▶ OPEN
//!     ▲                               │  cooldown elapsed
//!     │ probe ok                      ▼
//!     └──────────────────────────── HALF_OPEN ──probe failed──▶ OPEN (cooldown restarts)
//! ```
//!
//! One breaker exists per data kind, so a failing compression fetch never
//! gates system-status fetches. Time is read from `tokio::time::Instant` so
//! paused-clock tests can drive cooldowns.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use nasfeed_telemetry::Metrics;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Breaker thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures that trip the breaker. 0 is treated as 1.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// How long the breaker stays open before allowing a probe (ms).
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_cooldown_ms() -> u64 {
    60_000
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_ms: default_cooldown_ms(),
        }
    }
}

impl BreakerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    fn threshold(&self) -> u32 {
        self.failure_threshold.max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Outcome of asking the breaker whether a live call may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Breaker closed; call normally.
    Allowed,
    /// The single half-open probe. Its result decides the next state.
    Probe,
    /// Do not call; serve cached data instead.
    Rejected { retry_in: Duration },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }
}

/// Point-in-time view of a breaker, for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub opened_at: Option<DateTime<Utc>>,
    pub retry_in_ms: Option<u64>,
    pub total_opens: u64,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    opened_at_wall: Option<DateTime<Utc>>,
    probe_in_flight: bool,
    total_opens: u64,
}

/// Consecutive-failure circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                opened_at_wall: None,
                probe_in_flight: false,
                total_opens: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    pub fn admit(&self) -> Admission {
        self.admit_at(Instant::now())
    }

    /// Decide whether a call may proceed at `now`.
    ///
    /// An OPEN breaker whose cooldown has elapsed moves to HALF_OPEN and
    /// hands out exactly one probe; further callers are rejected until the
    /// probe's result is recorded.
    pub fn admit_at(&self, now: Instant) -> Admission {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => Admission::Allowed,
            BreakerState::Open => {
                let cooldown = self.config.cooldown();
                let elapsed = inner
                    .opened_at
                    .map(|t| now.saturating_duration_since(t))
                    .unwrap_or(cooldown);
                if elapsed >= cooldown {
                    inner.state = BreakerState::HalfOpen;
                    inner.probe_in_flight = true;
                    info!(breaker = %self.name, "Circuit breaker half-open, sending probe");
                    Metrics::breaker_state(&self.name, BreakerState::HalfOpen.as_str());
                    Admission::Probe
                } else {
                    Admission::Rejected {
                        retry_in: cooldown - elapsed,
                    }
                }
            }
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    Admission::Rejected {
                        retry_in: Duration::ZERO,
                    }
                } else {
                    inner.probe_in_flight = true;
                    Admission::Probe
                }
            }
        }
    }

    /// Record a successful call.
    ///
    /// Resets the failure counter; a successful probe closes the breaker.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        if inner.state == BreakerState::HalfOpen {
            inner.state = BreakerState::Closed;
            inner.opened_at = None;
            inner.opened_at_wall = None;
            inner.probe_in_flight = false;
            info!(breaker = %self.name, "Circuit breaker closed");
            Metrics::breaker_state(&self.name, BreakerState::Closed.as_str());
        }
    }

    pub fn record_failure(&self) -> u32 {
        self.record_failure_at(Instant::now())
    }

    /// Record a failed call at `now`; returns the consecutive failure count.
    pub fn record_failure_at(&self, now: Instant) -> u32 {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        let failures = inner.consecutive_failures;

        match inner.state {
            BreakerState::Closed if failures >= self.config.threshold() => {
                self.trip(&mut inner, now);
            }
            BreakerState::HalfOpen => {
                self.trip(&mut inner, now);
            }
            BreakerState::Closed | BreakerState::Open => {}
        }
        failures
    }

    /// Release a probe slot whose call never completed (caller dropped).
    pub fn abandon_probe(&self) {
        let mut inner = self.inner.lock();
        if inner.state == BreakerState::HalfOpen {
            inner.probe_in_flight = false;
        }
    }

    fn trip(&self, inner: &mut BreakerInner, now: Instant) {
        inner.state = BreakerState::Open;
        inner.opened_at = Some(now);
        inner.opened_at_wall = Some(Utc::now());
        inner.probe_in_flight = false;
        inner.total_opens += 1;
        warn!(
            breaker = %self.name,
            consecutive_failures = inner.consecutive_failures,
            cooldown_ms = self.config.cooldown_ms,
            "Circuit breaker opened"
        );
        Metrics::breaker_opened(&self.name);
        Metrics::breaker_state(&self.name, BreakerState::Open.as_str());
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        let retry_in_ms = match (inner.state, inner.opened_at) {
            (BreakerState::Open, Some(opened_at)) => Some(
                self.config
                    .cooldown()
                    .saturating_sub(opened_at.elapsed())
                    .as_millis() as u64,
            ),
            _ => None,
        };
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            opened_at: inner.opened_at_wall,
            retry_in_ms,
            total_opens: inner.total_opens,
        }
    }
}

/// Lazily created breakers keyed by name (data kind or method).
#[derive(Debug, Clone)]
pub struct BreakerRegistry {
    config: BreakerConfig,
    breakers: Arc<DashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: Arc::new(DashMap::new()),
        }
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Get the breaker for `name`, creating a CLOSED one on first use.
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.get(name) {
            return breaker.clone();
        }
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, self.config.clone())))
            .clone()
    }

    /// Snapshots of every breaker, sorted by name.
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots: Vec<_> = self.breakers.iter().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }
}
