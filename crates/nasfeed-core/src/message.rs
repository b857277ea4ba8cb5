//! WebSocket wire formats.
//!
//! Server → client messages are JSON objects with a `type` field. Data events
//! use the data kind itself as the type:
//!
//! ```text
//! {"type":"system.status","timestamp":"2024-01-28T00:00:00.000Z",
//!  "data":{"hostname":"nas01","stale":true,"error_code":"CIRCUIT_BREAKER_OPEN",
//!          "last_update":"2024-01-28T00:00:00.000Z","consecutive_failures":3}}
//! ```
//!
//! Client → server messages are tagged the same way (`subscribe`, `ping`).

use crate::error::{CoreError, Result};
use crate::event::{Event, EventBody};
use crate::kind::DataKind;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Messages sent from the hub to a viewer.
#[derive(Debug, Clone)]
pub enum ServerMessage {
    /// A poll-cycle event (shared with every other recipient).
    Event(Arc<Event>),
    /// First message after the handshake.
    Welcome {
        client_id: String,
        kinds: Vec<DataKind>,
    },
    /// Acknowledges a subscription change.
    Subscribed { types: Vec<DataKind> },
    /// Keep-alive for idle connections.
    Heartbeat { timestamp: DateTime<Utc> },
    /// Reply to a client ping.
    Pong { timestamp: DateTime<Utc> },
    /// The client sent something the hub could not use.
    Error { message: String },
}

impl ServerMessage {
    /// Wire `type` field.
    pub fn message_type(&self) -> &str {
        match self {
            Self::Event(event) => event.wire_type(),
            Self::Welcome { .. } => "welcome",
            Self::Subscribed { .. } => "subscribed",
            Self::Heartbeat { .. } => "heartbeat",
            Self::Pong { .. } => "pong",
            Self::Error { .. } => "error",
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Event(event) => event_to_json(event),
            Self::Welcome { client_id, kinds } => json!({
                "type": "welcome",
                "client_id": client_id,
                "kinds": kinds,
            }),
            Self::Subscribed { types } => json!({
                "type": "subscribed",
                "types": types,
            }),
            Self::Heartbeat { timestamp } => json!({
                "type": "heartbeat",
                "timestamp": rfc3339(timestamp),
            }),
            Self::Pong { timestamp } => json!({
                "type": "pong",
                "timestamp": rfc3339(timestamp),
            }),
            Self::Error { message } => json!({
                "type": "error",
                "message": message,
            }),
        }
    }

    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_json())?)
    }
}

/// Render an event in its wire shape.
pub fn event_to_json(event: &Event) -> Value {
    let data = match event.body() {
        EventBody::Fresh { payload } => {
            let mut data = payload_fields(payload);
            data.insert("stale".to_string(), Value::Bool(false));
            data
        }
        EventBody::Stale {
            payload,
            error_code,
            last_update,
            consecutive_failures,
        } => {
            let mut data = payload_fields(payload);
            data.insert("stale".to_string(), Value::Bool(true));
            data.insert("error_code".to_string(), json!(error_code));
            data.insert("last_update".to_string(), json!(rfc3339(last_update)));
            data.insert(
                "consecutive_failures".to_string(),
                json!(consecutive_failures),
            );
            data
        }
        EventBody::Failure {
            error_code,
            reason,
            consecutive_failures,
        } => {
            let mut data = Map::new();
            data.insert("kind".to_string(), json!(event.kind()));
            data.insert("reason".to_string(), json!(reason));
            data.insert("error_code".to_string(), json!(error_code));
            data.insert(
                "consecutive_failures".to_string(),
                json!(consecutive_failures),
            );
            data
        }
    };

    json!({
        "type": event.wire_type(),
        "timestamp": rfc3339(&event.timestamp()),
        "data": Value::Object(data),
    })
}

/// Object payloads are flattened into `data`; anything else is wrapped as `value`.
fn payload_fields(payload: &Value) -> Map<String, Value> {
    match payload {
        Value::Object(map) => map.clone(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other.clone());
            map
        }
    }
}

fn rfc3339(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Messages sent from a viewer to the hub.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Replace the subscription filter. An empty list means "all kinds".
    Subscribe {
        #[serde(default)]
        types: Vec<DataKind>,
    },
    Ping,
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| CoreError::InvalidMessage(e.to_string()))
    }
}
