//! Data source capability.
//!
//! Pollers and request handlers only depend on [`DataSource`]. Two
//! implementations exist: [`LiveSource`] maps each data kind to a backend
//! JSON-RPC method, and [`FixtureSource`] serves in-memory payloads for
//! offline mode and tests.

use crate::client::RpcClient;
use crate::error::{RpcError, RpcResult};
use crate::protocol::METHOD_NOT_FOUND;
use dashmap::DashMap;
use nasfeed_core::DataKind;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Something that can fetch the current payload for a data kind.
pub trait DataSource: Send + Sync + 'static {
    fn fetch(&self, kind: &DataKind) -> impl Future<Output = RpcResult<Value>> + Send;
}

impl<S: DataSource> DataSource for Arc<S> {
    fn fetch(&self, kind: &DataKind) -> impl Future<Output = RpcResult<Value>> + Send {
        (**self).fetch(kind)
    }
}

/// Backend method used to fetch one data kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindRoute {
    pub method: String,
    #[serde(default = "default_params")]
    pub params: Value,
}

fn default_params() -> Value {
    Value::Object(Default::default())
}

impl KindRoute {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: default_params(),
        }
    }
}

/// Data source backed by the JSON-RPC client.
#[derive(Debug)]
pub struct LiveSource {
    client: Arc<RpcClient>,
    routes: HashMap<DataKind, KindRoute>,
}

impl LiveSource {
    pub fn new(client: Arc<RpcClient>, routes: HashMap<DataKind, KindRoute>) -> Self {
        Self { client, routes }
    }

    pub fn client(&self) -> &Arc<RpcClient> {
        &self.client
    }

    pub fn route(&self, kind: &DataKind) -> Option<&KindRoute> {
        self.routes.get(kind)
    }
}

impl DataSource for LiveSource {
    async fn fetch(&self, kind: &DataKind) -> RpcResult<Value> {
        let route = self.routes.get(kind).ok_or_else(|| {
            RpcError::InvalidRequest(format!("no backend method configured for kind {kind}"))
        })?;
        self.client.call(&route.method, &route.params, None).await
    }
}

/// Failure injected into a [`FixtureSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixtureFailure {
    /// Behave like an unreachable backend.
    Transport,
    /// Behave like a backend that rejects the call.
    Remote { code: i64, message: String },
}

impl FixtureFailure {
    fn to_error(&self, kind: &DataKind) -> RpcError {
        match self {
            Self::Transport => RpcError::Transport {
                method: kind.to_string(),
                message: "fixture transport failure".to_string(),
                timed_out: false,
            },
            Self::Remote { code, message } => RpcError::Remote {
                method: kind.to_string(),
                code: *code,
                message: message.clone(),
                data: None,
            },
        }
    }
}

/// In-memory data source.
///
/// Payloads and failures can be changed at runtime, so one instance can play
/// a backend that goes down and comes back.
#[derive(Debug, Default)]
pub struct FixtureSource {
    payloads: RwLock<HashMap<DataKind, Value>>,
    failures: RwLock<HashMap<DataKind, FixtureFailure>>,
    calls: DashMap<DataKind, AtomicU64>,
}

impl FixtureSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_payloads(payloads: HashMap<DataKind, Value>) -> Self {
        Self {
            payloads: RwLock::new(payloads),
            ..Default::default()
        }
    }

    pub fn with_payload(self, kind: DataKind, payload: Value) -> Self {
        self.set_payload(kind, payload);
        self
    }

    pub fn set_payload(&self, kind: DataKind, payload: Value) {
        self.payloads.write().insert(kind, payload);
    }

    /// Make every fetch of `kind` fail until [`FixtureSource::recover`].
    pub fn fail(&self, kind: DataKind, failure: FixtureFailure) {
        self.failures.write().insert(kind, failure);
    }

    pub fn recover(&self, kind: &DataKind) {
        self.failures.write().remove(kind);
    }

    /// Number of fetches attempted for `kind`.
    pub fn call_count(&self, kind: &DataKind) -> u64 {
        self.calls
            .get(kind)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    pub fn kinds(&self) -> Vec<DataKind> {
        let mut kinds: Vec<_> = self.payloads.read().keys().cloned().collect();
        kinds.sort();
        kinds
    }

    fn fetch_now(&self, kind: &DataKind) -> RpcResult<Value> {
        self.calls
            .entry(kind.clone())
            .or_default()
            .fetch_add(1, Ordering::SeqCst);

        if let Some(failure) = self.failures.read().get(kind) {
            return Err(failure.to_error(kind));
        }

        self.payloads
            .read()
            .get(kind)
            .cloned()
            .ok_or_else(|| RpcError::Remote {
                method: kind.to_string(),
                code: METHOD_NOT_FOUND,
                message: "Method not found".to_string(),
                data: None,
            })
    }
}

impl DataSource for FixtureSource {
    async fn fetch(&self, kind: &DataKind) -> RpcResult<Value> {
        self.fetch_now(kind)
    }
}
