//! Prometheus metrics for nasfeed.
//!
//! Covers:
//! - Backend RPC attempts and poll outcomes
//! - Circuit breaker state per data kind
//! - Viewer connections and fan-out
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration failure
//! means duplicate metric names, which is a startup-fatal programming error.
//! These panics only occur on first access of each static.

use crate::error::TelemetryResult;
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, register_int_gauge,
    CounterVec, Encoder, GaugeVec, HistogramVec, IntGauge, TextEncoder,
};

/// Backend RPC attempts.
/// Labels: method, result (ok/transport_error/protocol_error)
pub static RPC_ATTEMPTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "nasfeed_rpc_attempts_total",
        "Total backend RPC attempts (including retries)",
        &["method", "result"]
    )
    .unwrap()
});

/// Poll cycle outcomes.
/// Labels: kind, outcome (fresh/stale/failure)
pub static POLL_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "nasfeed_poll_total",
        "Total poll cycles by outcome",
        &["kind", "outcome"]
    )
    .unwrap()
});

/// Fetch latency in milliseconds (successful fetches only).
pub static FETCH_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "nasfeed_fetch_latency_ms",
        "Latency of successful backend fetches in milliseconds",
        &["kind"],
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0]
    )
    .unwrap()
});

/// Breaker state per kind (0 = closed, 1 = half-open, 2 = open).
pub static BREAKER_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "nasfeed_breaker_state",
        "Circuit breaker state (0=closed, 1=half_open, 2=open)",
        &["kind"]
    )
    .unwrap()
});

/// Times a breaker tripped open.
pub static BREAKER_OPEN_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "nasfeed_breaker_open_total",
        "Total transitions to the open state",
        &["kind"]
    )
    .unwrap()
});

/// Currently connected viewers.
pub static WS_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("nasfeed_ws_connections", "Connected WebSocket viewers").unwrap()
});

/// Events enqueued to viewers.
pub static EVENTS_BROADCAST_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "nasfeed_events_broadcast_total",
        "Total events enqueued to viewers",
        &["kind"]
    )
    .unwrap()
});

/// Events dropped before delivery.
/// Labels: reason (queue_full/disconnect)
pub static EVENTS_DROPPED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "nasfeed_events_dropped_total",
        "Total events dropped before delivery",
        &["reason"]
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    /// Record one RPC attempt.
    pub fn rpc_attempt(method: &str, result: &str) {
        RPC_ATTEMPTS_TOTAL.with_label_values(&[method, result]).inc();
    }

    /// Record a poll cycle outcome.
    pub fn poll_outcome(kind: &str, outcome: &str) {
        POLL_TOTAL.with_label_values(&[kind, outcome]).inc();
    }

    /// Record latency of a successful fetch.
    pub fn fetch_latency(kind: &str, latency_ms: f64) {
        FETCH_LATENCY_MS.with_label_values(&[kind]).observe(latency_ms);
    }

    /// Set the breaker state gauge.
    pub fn breaker_state(kind: &str, state: &str) {
        let value = match state {
            "closed" => 0.0,
            "half_open" => 1.0,
            _ => 2.0,
        };
        BREAKER_STATE.with_label_values(&[kind]).set(value);
    }

    /// Record a breaker trip.
    pub fn breaker_opened(kind: &str) {
        BREAKER_OPEN_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn ws_connection_opened() {
        WS_CONNECTIONS.inc();
    }

    pub fn ws_connection_closed() {
        WS_CONNECTIONS.dec();
    }

    /// Record events enqueued for a kind.
    pub fn events_broadcast(kind: &str, recipients: usize) {
        EVENTS_BROADCAST_TOTAL
            .with_label_values(&[kind])
            .inc_by(recipients as f64);
    }

    /// Record a dropped event.
    pub fn event_dropped(reason: &str) {
        EVENTS_DROPPED_TOTAL.with_label_values(&[reason]).inc();
    }
}

/// Render all registered metrics in the Prometheus text format.
pub fn encode_metrics() -> TelemetryResult<String> {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
