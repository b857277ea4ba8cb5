//! Subscriber registry.
//!
//! Connection handles live in one map keyed by [`ConnectionId`], guarded by a
//! single lock. Broadcast takes a read-side snapshot of the handles and never
//! holds the lock while queueing.

use crate::config::SlowConsumerPolicy;
use crate::queue::{OutboundQueue, PushOutcome};
use chrono::{DateTime, Utc};
use nasfeed_core::{DataKind, ServerMessage};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connection lifecycle: `Connecting → Active → Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Active = 1,
    Closed = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Active,
            _ => Self::Closed,
        }
    }
}

/// The data kinds a connection wants. Empty means all kinds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subscription {
    wanted: HashSet<DataKind>,
}

impl Subscription {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn matches(&self, kind: &DataKind) -> bool {
        self.wanted.is_empty() || self.wanted.contains(kind)
    }

    pub fn is_all(&self) -> bool {
        self.wanted.is_empty()
    }

    /// Wanted kinds, sorted.
    pub fn kinds(&self) -> Vec<DataKind> {
        let mut kinds: Vec<_> = self.wanted.iter().cloned().collect();
        kinds.sort();
        kinds
    }
}

impl FromIterator<DataKind> for Subscription {
    fn from_iter<I: IntoIterator<Item = DataKind>>(iter: I) -> Self {
        Self {
            wanted: iter.into_iter().collect(),
        }
    }
}

/// Hub-side state of one client connection.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    connected_at: DateTime<Utc>,
    state: AtomicU8,
    subscription: RwLock<Subscription>,
    queue: OutboundQueue,
    closed: CancellationToken,
}

impl ConnectionHandle {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            id: ConnectionId::new(),
            connected_at: Utc::now(),
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            subscription: RwLock::new(Subscription::all()),
            queue: OutboundQueue::new(queue_capacity),
            closed: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move to `Active`. Has no effect once closed.
    pub fn activate(&self) {
        let _ = self.state.compare_exchange(
            ConnectionState::Connecting as u8,
            ConnectionState::Active as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub fn subscription(&self) -> Subscription {
        self.subscription.read().clone()
    }

    pub fn set_subscription(&self, subscription: Subscription) {
        *self.subscription.write() = subscription;
    }

    pub fn wants(&self, kind: &DataKind) -> bool {
        self.subscription.read().matches(kind)
    }

    pub fn queue(&self) -> &OutboundQueue {
        &self.queue
    }

    pub fn push(&self, message: ServerMessage, policy: SlowConsumerPolicy) -> PushOutcome {
        self.queue.push(message, policy)
    }

    /// Close the connection. Wakes the writer and the reader.
    pub fn close(&self) {
        self.state
            .store(ConnectionState::Closed as u8, Ordering::Release);
        self.queue.close();
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once [`ConnectionHandle::close`] has been called.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }
}

/// Registry of connected clients.
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<ConnectionHandle>>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, handle: Arc<ConnectionHandle>) {
        self.connections.write().insert(handle.id(), handle);
    }

    pub fn unregister(&self, id: ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.connections.write().remove(&id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.connections.read().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Current handles, cloned out of the lock.
    pub fn handles(&self) -> Vec<Arc<ConnectionHandle>> {
        self.connections.read().values().cloned().collect()
    }

    /// Close and remove every connection.
    pub fn close_all(&self) -> usize {
        let drained: Vec<_> = self.connections.write().drain().map(|(_, h)| h).collect();
        for handle in &drained {
            handle.close();
        }
        drained.len()
    }
}
