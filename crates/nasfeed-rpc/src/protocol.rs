//! JSON-RPC 2.0 envelopes.

use crate::error::{RpcError, RpcResult};
use serde::Serialize;
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

/// Outgoing request envelope.
#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: &'a Value,
    id: u64,
}

impl<'a> JsonRpcRequest<'a> {
    pub fn new(method: &'a str, params: &'a Value, id: u64) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method,
            params,
            id,
        }
    }
}

/// Decode a response body into the call result.
///
/// `result: null` is a valid success. A response carrying an `error` object
/// becomes [`RpcError::Remote`] with the peer's code and message.
pub fn parse_response(method: &str, expected_id: u64, body: &[u8]) -> RpcResult<Value> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| RpcError::malformed(method, format!("invalid JSON: {e}")))?;

    let obj = value
        .as_object()
        .ok_or_else(|| RpcError::malformed(method, "response is not an object"))?;

    if let Some(error) = obj.get("error").filter(|e| !e.is_null()) {
        let code = error
            .get("code")
            .and_then(Value::as_i64)
            .unwrap_or(INTERNAL_ERROR);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Err(RpcError::Remote {
            method: method.to_string(),
            code,
            message,
            data: error.get("data").cloned(),
        });
    }

    // A null id is allowed when the peer could not read ours (parse errors);
    // those arrive as error objects above.
    match obj.get("id") {
        Some(Value::Number(n)) if n.as_u64() == Some(expected_id) => {}
        other => {
            return Err(RpcError::malformed(
                method,
                format!("response id {other:?} does not match request id {expected_id}"),
            ))
        }
    }

    obj.get("result")
        .cloned()
        .ok_or_else(|| RpcError::malformed(method, "response has neither result nor error"))
}
