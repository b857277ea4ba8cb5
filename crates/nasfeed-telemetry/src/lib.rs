//! Prometheus metrics and structured logging for nasfeed.
//!
//! - Prometheus metrics for RPC attempts, poll outcomes, breaker state and
//!   viewer fan-out
//! - Structured logging with tracing, configurable format and filter

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use metrics::{encode_metrics, Metrics};
