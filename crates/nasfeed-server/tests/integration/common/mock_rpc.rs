//! Mock JSON-RPC backend for integration tests.
//!
//! Provides a backend that can:
//! - Answer configured methods with fixed results
//! - Answer with a JSON-RPC error object
//! - Go down (HTTP 503, no body) and come back
//! - Count calls per method

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::post;
use axum::Router;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

#[derive(Clone)]
enum Reply {
    Result(Value),
    Error { code: i64, message: String },
}

#[derive(Default)]
struct Backend {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<HashMap<String, u64>>,
    down: AtomicBool,
}

/// A mock JSON-RPC backend for testing.
pub struct MockRpcServer {
    addr: SocketAddr,
    backend: Arc<Backend>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockRpcServer {
    /// Start a new mock backend on an available port.
    pub async fn start() -> Self {
        let backend = Arc::new(Backend::default());
        let app = Router::new()
            .route("/rpc", post(handle_rpc))
            .with_state(backend.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        Self {
            addr,
            backend,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// JSON-RPC endpoint URL.
    pub fn url(&self) -> String {
        format!("http://{}/rpc", self.addr)
    }

    pub fn set_result(&self, method: &str, result: Value) {
        self.backend
            .replies
            .lock()
            .unwrap()
            .insert(method.to_string(), Reply::Result(result));
    }

    pub fn set_error(&self, method: &str, code: i64, message: &str) {
        self.backend.replies.lock().unwrap().insert(
            method.to_string(),
            Reply::Error {
                code,
                message: message.to_string(),
            },
        );
    }

    /// Fail every call at the HTTP level until [`MockRpcServer::set_up`].
    pub fn set_down(&self) {
        self.backend.down.store(true, Ordering::SeqCst);
    }

    pub fn set_up(&self) {
        self.backend.down.store(false, Ordering::SeqCst);
    }

    /// Calls received for `method`, including failed ones.
    pub fn calls(&self, method: &str) -> u64 {
        self.backend
            .calls
            .lock()
            .unwrap()
            .get(method)
            .copied()
            .unwrap_or(0)
    }

    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn handle_rpc(State(backend): State<Arc<Backend>>, Json(request): Json<Value>) -> Response {
    let method = request["method"].as_str().unwrap_or_default().to_string();
    let id = request["id"].clone();
    *backend.calls.lock().unwrap().entry(method.clone()).or_default() += 1;

    if backend.down.load(Ordering::SeqCst) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let reply = backend.replies.lock().unwrap().get(&method).cloned();
    let body = match reply {
        Some(Reply::Result(result)) => json!({"jsonrpc": "2.0", "result": result, "id": id}),
        Some(Reply::Error { code, message }) => {
            json!({"jsonrpc": "2.0", "error": {"code": code, "message": message}, "id": id})
        }
        None => json!({
            "jsonrpc": "2.0",
            "error": {"code": -32601, "message": "Method not found"},
            "id": id
        }),
    };
    Json(body).into_response()
}
