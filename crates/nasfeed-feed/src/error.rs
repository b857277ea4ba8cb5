//! Feed error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Invalid poller configuration: {0}")]
    InvalidConfig(String),

    #[error("Duplicate data kind: {0}")]
    DuplicateKind(String),

    #[error("Poller task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type FeedResult<T> = Result<T, FeedError>;
