//! HTTP server implementation using axum.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use nasfeed_core::message::event_to_json;
use nasfeed_core::{DataKind, ErrorCode};
use nasfeed_rpc::{BreakerSnapshot, DataSource, GuardedError, GuardedSource};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::config::HubConfig;
use crate::connection::serve_connection;
use crate::error::{HubError, HubResult};
use crate::hub::Hub;

/// Connection limiter to prevent too many concurrent WebSocket connections.
#[derive(Debug)]
pub struct ConnectionLimiter {
    current: AtomicUsize,
    max: usize,
}

impl ConnectionLimiter {
    pub fn new(max: usize) -> Self {
        Self {
            current: AtomicUsize::new(0),
            max,
        }
    }

    /// Reserve a slot. The guard owns the limiter so it can outlive the
    /// upgrade handler and be held for the connection's lifetime.
    pub fn try_acquire(self: &Arc<Self>) -> Option<ConnectionGuard> {
        loop {
            let current = self.current.load(Ordering::Acquire);
            if current >= self.max {
                return None;
            }
            if self
                .current
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(ConnectionGuard {
                    limiter: self.clone(),
                });
            }
        }
    }

    pub fn current_count(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }

    pub fn max(&self) -> usize {
        self.max
    }
}

#[derive(Debug)]
pub struct ConnectionGuard {
    limiter: Arc<ConnectionLimiter>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.limiter.current.fetch_sub(1, Ordering::Release);
    }
}

/// Shared application state for axum handlers.
pub struct AppState<S> {
    hub: Arc<Hub>,
    source: Arc<GuardedSource<S>>,
    connection_limiter: Arc<ConnectionLimiter>,
    config: Arc<HubConfig>,
    shutdown: CancellationToken,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            hub: self.hub.clone(),
            source: self.source.clone(),
            connection_limiter: self.connection_limiter.clone(),
            config: self.config.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<S: DataSource> AppState<S> {
    pub fn new(
        hub: Arc<Hub>,
        source: Arc<GuardedSource<S>>,
        config: HubConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            hub,
            source,
            connection_limiter: Arc::new(ConnectionLimiter::new(config.max_connections)),
            config: Arc::new(config),
            shutdown,
        }
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    pub fn connection_limiter(&self) -> &Arc<ConnectionLimiter> {
        &self.connection_limiter
    }
}

/// Create the axum router.
pub fn create_router<S: DataSource>(state: AppState<S>) -> Router {
    Router::new()
        .route(&state.config.ws_path, get(ws_handler::<S>))
        .route("/api/health", get(get_health::<S>))
        .route("/api/snapshot", get(get_snapshot::<S>))
        .route("/api/kinds/{kind}", get(get_kind::<S>))
        .route("/metrics", get(get_metrics))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    connections: usize,
    max_connections: usize,
    kinds: Vec<DataKind>,
    breakers: Vec<BreakerSnapshot>,
}

/// Breaker state per kind plus connection count.
async fn get_health<S: DataSource>(State(state): State<AppState<S>>) -> Json<HealthResponse> {
    let breakers = state.source.breakers().snapshots();
    let degraded = breakers
        .iter()
        .any(|b| b.state != nasfeed_rpc::BreakerState::Closed);

    Json(HealthResponse {
        status: if degraded { "degraded" } else { "ok" },
        connections: state.hub.connection_count(),
        max_connections: state.connection_limiter.max(),
        kinds: state.hub.kinds().to_vec(),
        breakers,
    })
}

/// Latest broadcast event per kind, in wire shape.
async fn get_snapshot<S: DataSource>(State(state): State<AppState<S>>) -> Json<Value> {
    let events: Vec<Value> = state
        .hub
        .latest_events()
        .iter()
        .map(|event| event_to_json(event))
        .collect();
    Json(Value::Array(events))
}

/// Synchronous fetch through the same breaker-protected path the pollers use.
async fn get_kind<S: DataSource>(
    State(state): State<AppState<S>>,
    Path(kind): Path<String>,
) -> Response {
    let kind = match DataKind::new(kind) {
        Ok(kind) if state.hub.knows(&kind) => kind,
        Ok(kind) => {
            return error_response(StatusCode::NOT_FOUND, None, format!("unknown kind {kind}"))
        }
        Err(e) => return error_response(StatusCode::NOT_FOUND, None, e.to_string()),
    };

    match state.source.fetch(&kind).await {
        Ok(payload) => Json(json!({ "kind": kind, "data": payload })).into_response(),
        Err(err) => {
            let status = match &err {
                GuardedError::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
                GuardedError::Fetch { .. } if err.error_code() == ErrorCode::TransportError => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                GuardedError::Fetch { .. } => StatusCode::BAD_GATEWAY,
            };
            warn!(kind = %kind, error = %err, "Live fetch failed");
            error_response(status, Some(err.error_code()), err.to_string())
        }
    }
}

fn error_response(status: StatusCode, code: Option<ErrorCode>, message: String) -> Response {
    (
        status,
        Json(json!({ "error_code": code, "message": message })),
    )
        .into_response()
}

async fn get_metrics() -> Response {
    match nasfeed_telemetry::encode_metrics() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// WebSocket upgrade handler.
async fn ws_handler<S: DataSource>(
    State(state): State<AppState<S>>,
    ws: WebSocketUpgrade,
) -> Response {
    let guard = match state.connection_limiter.try_acquire() {
        Some(guard) => guard,
        None => {
            warn!(
                current = state.connection_limiter.current_count(),
                max = state.config.max_connections,
                "WebSocket connection limit reached"
            );
            return (StatusCode::SERVICE_UNAVAILABLE, "Too many connections").into_response();
        }
    };

    let hub = state.hub.clone();
    let config = state.config.clone();
    let shutdown = state.shutdown.clone();
    ws.on_upgrade(move |socket| async move {
        let _guard = guard;
        serve_connection(socket, hub, config, shutdown).await;
    })
}

/// Bind the configured listen address.
pub async fn bind(config: &HubConfig) -> HubResult<TcpListener> {
    let addr = config.listen_addr();
    TcpListener::bind(&addr)
        .await
        .map_err(|source| HubError::Bind { addr, source })
}

/// Serve HTTP and WebSocket traffic until `shutdown` fires.
pub async fn run_server<S: DataSource>(listener: TcpListener, state: AppState<S>) -> HubResult<()> {
    let shutdown = state.shutdown.clone();
    let app = create_router(state);

    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Starting hub server");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    info!("Hub server stopped");
    Ok(())
}
