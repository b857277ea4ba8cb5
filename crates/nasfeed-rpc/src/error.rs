//! RPC error taxonomy.
//!
//! Every error is either transport-class (retryable, `TRANSPORT_ERROR`) or
//! protocol-class (returned immediately, `PROTOCOL_ERROR`).

use nasfeed_core::ErrorCode;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Transport error calling {method}: {message}")]
    Transport {
        method: String,
        message: String,
        timed_out: bool,
    },

    #[error("Backend returned HTTP {status} for {method}")]
    HttpStatus { method: String, status: u16 },

    #[error("RPC error {code} from {method}: {message}")]
    Remote {
        method: String,
        code: i64,
        message: String,
        data: Option<Value>,
    },

    #[error("Malformed response from {method}: {message}")]
    MalformedResponse { method: String, message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

impl RpcError {
    pub(crate) fn transport(method: &str, err: &reqwest::Error) -> Self {
        Self::Transport {
            method: method.to_string(),
            message: err.to_string(),
            timed_out: err.is_timeout(),
        }
    }

    pub(crate) fn malformed(method: &str, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            method: method.to_string(),
            message: message.into(),
        }
    }

    /// Whether another attempt could succeed.
    ///
    /// Only transport failures qualify; a well-formed rejection from the peer
    /// will not change on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::HttpStatus { status, .. } => *status >= 500,
            Self::InvalidRequest(_)
            | Self::Remote { .. }
            | Self::MalformedResponse { .. }
            | Self::HttpClient(_) => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport { timed_out: true, .. })
    }

    pub fn error_code(&self) -> ErrorCode {
        if self.is_retryable() {
            ErrorCode::TransportError
        } else {
            ErrorCode::ProtocolError
        }
    }

    /// Peer-supplied JSON-RPC error code, if the backend sent one.
    pub fn peer_code(&self) -> Option<i64> {
        match self {
            Self::Remote { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Label used for the attempts metric.
    pub(crate) fn metric_label(&self) -> &'static str {
        if self.is_retryable() {
            "transport_error"
        } else {
            "protocol_error"
        }
    }
}

pub type RpcResult<T> = Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let transport = RpcError::Transport {
            method: "system.status".to_string(),
            message: "connection refused".to_string(),
            timed_out: false,
        };
        assert!(transport.is_retryable());
        assert_eq!(transport.error_code(), ErrorCode::TransportError);

        let remote = RpcError::Remote {
            method: "system.status".to_string(),
            code: -32601,
            message: "Method not found".to_string(),
            data: None,
        };
        assert!(!remote.is_retryable());
        assert_eq!(remote.error_code(), ErrorCode::ProtocolError);
        assert_eq!(remote.peer_code(), Some(-32601));

        let unavailable = RpcError::HttpStatus {
            method: "system.status".to_string(),
            status: 503,
        };
        assert!(unavailable.is_retryable());

        let bad_request = RpcError::HttpStatus {
            method: "system.status".to_string(),
            status: 400,
        };
        assert!(!bad_request.is_retryable());
    }
}
