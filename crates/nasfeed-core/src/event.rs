//! Poll-cycle events.
//!
//! One `Event` is produced per poll cycle per data kind. Events are immutable
//! once built and are shared read-only (behind `Arc`) across every subscriber
//! that receives them.

use crate::kind::DataKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Classified failure reason carried by stale and failure events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Connection refused/reset or timeout. Retryable.
    TransportError,
    /// Request rejected by the backend (unknown method, bad params, malformed reply).
    ProtocolError,
    /// Live call intentionally skipped because the breaker is open.
    CircuitBreakerOpen,
    /// Earlier fetch re-sent to a new subscriber.
    Replayed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransportError => "TRANSPORT_ERROR",
            Self::ProtocolError => "PROTOCOL_ERROR",
            Self::CircuitBreakerOpen => "CIRCUIT_BREAKER_OPEN",
            Self::Replayed => "REPLAYED",
        }
    }

    /// Wire event type used when there is no cached payload to fall back to.
    pub fn failure_class(&self) -> FailureClass {
        match self {
            Self::TransportError => FailureClass::ConnectionError,
            Self::ProtocolError | Self::CircuitBreakerOpen | Self::Replayed => {
                FailureClass::RpcError
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire type of an error-only event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// Backend answered but the call could not produce data.
    RpcError,
    /// Backend could not be reached.
    ConnectionError,
}

impl FailureClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RpcError => "rpc_error",
            Self::ConnectionError => "connection_error",
        }
    }
}

/// What a poll cycle produced.
#[derive(Debug, Clone, PartialEq)]
pub enum EventBody {
    /// Direct result of a successful fetch in this cycle.
    Fresh { payload: Value },
    /// Last good payload served in place of a failed or skipped fetch.
    Stale {
        payload: Value,
        error_code: ErrorCode,
        last_update: DateTime<Utc>,
        consecutive_failures: u32,
    },
    /// Fetch failed and nothing was cached yet.
    Failure {
        error_code: ErrorCode,
        reason: String,
        consecutive_failures: u32,
    },
}

/// Immutable result of one poll cycle for one data kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    kind: DataKind,
    timestamp: DateTime<Utc>,
    body: EventBody,
}

impl Event {
    /// Event for a payload fetched in this cycle, stamped with the current time.
    pub fn fresh(kind: DataKind, payload: Value) -> Self {
        Self::fresh_at(kind, payload, Utc::now())
    }

    pub fn fresh_at(kind: DataKind, payload: Value, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            timestamp,
            body: EventBody::Fresh { payload },
        }
    }

    /// Event serving a cached payload.
    ///
    /// The event timestamp is the cache entry's `last_update`, never the
    /// current time, so viewers cannot mistake it for fresh data.
    pub fn stale(
        kind: DataKind,
        payload: Value,
        last_update: DateTime<Utc>,
        error_code: ErrorCode,
        consecutive_failures: u32,
    ) -> Self {
        Self {
            kind,
            timestamp: last_update,
            body: EventBody::Stale {
                payload,
                error_code,
                last_update,
                consecutive_failures,
            },
        }
    }

    /// Error-only event for a kind with no cached payload.
    pub fn failure(
        kind: DataKind,
        error_code: ErrorCode,
        reason: impl Into<String>,
        consecutive_failures: u32,
    ) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            body: EventBody::Failure {
                error_code,
                reason: reason.into(),
                consecutive_failures,
            },
        }
    }

    /// Copy of this event for delivery outside the cycle that produced it.
    ///
    /// A fresh event becomes stale with its fetch time as `last_update`;
    /// stale and failure events are already honest about their age.
    pub fn replayed(self: &Arc<Self>) -> Arc<Self> {
        match &self.body {
            EventBody::Fresh { payload } => Arc::new(Self::stale(
                self.kind.clone(),
                payload.clone(),
                self.timestamp,
                ErrorCode::Replayed,
                0,
            )),
            _ => Arc::clone(self),
        }
    }

    pub fn kind(&self) -> &DataKind {
        &self.kind
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn body(&self) -> &EventBody {
        &self.body
    }

    /// Whether the event carries data that is not from this cycle.
    ///
    /// Failure events have no data at all and are not considered stale.
    pub fn is_stale(&self) -> bool {
        matches!(self.body, EventBody::Stale { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.body, EventBody::Failure { .. })
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        match &self.body {
            EventBody::Fresh { .. } => None,
            EventBody::Stale { error_code, .. } | EventBody::Failure { error_code, .. } => {
                Some(*error_code)
            }
        }
    }

    pub fn payload(&self) -> Option<&Value> {
        match &self.body {
            EventBody::Fresh { payload } | EventBody::Stale { payload, .. } => Some(payload),
            EventBody::Failure { .. } => None,
        }
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        match &self.body {
            EventBody::Stale { last_update, .. } => Some(*last_update),
            _ => None,
        }
    }

    /// Wire `type` field: the data kind for data events, `rpc_error` or
    /// `connection_error` for failure events.
    pub fn wire_type(&self) -> &str {
        match &self.body {
            EventBody::Failure { error_code, .. } => error_code.failure_class().as_str(),
            _ => self.kind.as_str(),
        }
    }
}
