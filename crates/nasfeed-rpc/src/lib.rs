//! Breaker-protected access to the telemetry backend.
//!
//! - [`RpcClient`]: JSON-RPC 2.0 over HTTP with per-call timeout and bounded
//!   retry with backoff on transport failures
//! - [`CircuitBreaker`]: per-kind CLOSED/OPEN/HALF_OPEN failure gate
//! - [`DataSource`]: fetch capability with a live (RPC) and a fixture
//!   implementation
//! - [`GuardedSource`]: a data source behind the breaker registry; the single
//!   call path shared by pollers and request/response handlers

pub mod breaker;
pub mod client;
pub mod config;
pub mod error;
pub mod guarded;
pub mod protocol;
pub mod source;

pub use breaker::{
    Admission, BreakerConfig, BreakerRegistry, BreakerSnapshot, BreakerState, CircuitBreaker,
};
pub use client::RpcClient;
pub use config::{BackoffStrategy, RpcConfig};
pub use error::{RpcError, RpcResult};
pub use guarded::{GuardedError, GuardedSource};
pub use source::{DataSource, FixtureFailure, FixtureSource, KindRoute, LiveSource};
