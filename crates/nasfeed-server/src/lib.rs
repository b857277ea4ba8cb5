//! nasfeed service.
//!
//! Wires the pipeline together:
//! - a live (JSON-RPC) or fixture data source behind per-kind circuit breakers
//! - one poller per configured data kind feeding the hub's intake channel
//! - the broadcast hub and its HTTP/WebSocket server

pub mod app;
pub mod config;
pub mod error;

pub use app::Application;
pub use config::{AppConfig, SourceMode};
pub use error::{AppError, AppResult};
