//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("RPC error: {0}")]
    Rpc(#[from] nasfeed_rpc::RpcError),

    #[error("Feed error: {0}")]
    Feed(#[from] nasfeed_feed::FeedError),

    #[error("Hub error: {0}")]
    Hub(#[from] nasfeed_hub::HubError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] nasfeed_telemetry::TelemetryError),

    #[error("Task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
