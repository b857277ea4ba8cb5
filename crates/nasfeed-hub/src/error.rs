//! Hub error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("Invalid hub configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

pub type HubResult<T> = Result<T, HubError>;
