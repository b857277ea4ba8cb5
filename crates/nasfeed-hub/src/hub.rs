//! Event fan-out.

use crate::config::{HubConfig, SlowConsumerPolicy};
use crate::queue::PushOutcome;
use crate::registry::{ConnectionHandle, ConnectionId, SubscriberRegistry, Subscription};
use dashmap::DashMap;
use nasfeed_core::{DataKind, Event, ServerMessage};
use nasfeed_telemetry::Metrics;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Owner of the subscriber registry and the latest event per kind.
///
/// [`Hub::publish`] is only called from the intake loop, so events of one
/// kind reach every queue in the order the poller produced them.
#[derive(Debug)]
pub struct Hub {
    registry: SubscriberRegistry,
    latest: DashMap<DataKind, Arc<Event>>,
    // Serializes fan-out with subscription replay so a subscriber never
    // gets the same event from both.
    fanout: Mutex<()>,
    kinds: Vec<DataKind>,
    queue_capacity: usize,
    policy: SlowConsumerPolicy,
}

impl Hub {
    /// `kinds` is the set of polled kinds advertised to clients.
    pub fn new(config: &HubConfig, kinds: Vec<DataKind>) -> Self {
        Self {
            registry: SubscriberRegistry::new(),
            latest: DashMap::new(),
            fanout: Mutex::new(()),
            kinds,
            queue_capacity: config.queue_capacity,
            policy: config.slow_consumer,
        }
    }

    pub fn registry(&self) -> &SubscriberRegistry {
        &self.registry
    }

    pub fn kinds(&self) -> &[DataKind] {
        &self.kinds
    }

    pub fn knows(&self, kind: &DataKind) -> bool {
        self.kinds.contains(kind)
    }

    pub fn policy(&self) -> SlowConsumerPolicy {
        self.policy
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Register a new connection in the `Connecting` state.
    pub fn connect(&self) -> Arc<ConnectionHandle> {
        let handle = Arc::new(ConnectionHandle::new(self.queue_capacity));
        self.registry.register(handle.clone());
        Metrics::ws_connection_opened();
        debug!(client_id = %handle.id(), "Connection registered");
        handle
    }

    /// Unregister and close a connection. Safe to call more than once.
    pub fn disconnect(&self, id: ConnectionId) {
        if let Some(handle) = self.registry.unregister(id) {
            handle.close();
            Metrics::ws_connection_closed();
            debug!(client_id = %id, "Connection unregistered");
        }
    }

    /// Queue a message on one connection, applying the slow-consumer policy.
    pub fn send_to(&self, handle: &ConnectionHandle, message: ServerMessage) -> bool {
        match handle.push(message, self.policy) {
            PushOutcome::Queued => true,
            PushOutcome::DroppedOldest => {
                Metrics::event_dropped("queue_full");
                trace!(client_id = %handle.id(), "Outbound queue full, dropped oldest");
                true
            }
            PushOutcome::Rejected => {
                if !handle.is_closed() {
                    warn!(client_id = %handle.id(), "Slow consumer, disconnecting");
                    Metrics::event_dropped("slow_consumer");
                    handle.close();
                }
                false
            }
        }
    }

    /// Replace a connection's filter, acknowledge it, then queue the latest
    /// event of each wanted kind.
    ///
    /// Replayed data is always marked stale: it comes from an earlier cycle.
    pub fn subscribe(&self, handle: &ConnectionHandle, types: Vec<DataKind>) {
        let subscription: Subscription = types.into_iter().collect();
        let ack = ServerMessage::Subscribed {
            types: subscription.kinds(),
        };
        let _fanout = self.fanout.lock();
        handle.set_subscription(subscription.clone());
        debug!(client_id = %handle.id(), kinds = ?subscription.kinds(), "Subscription updated");

        if !self.send_to(handle, ack) {
            return;
        }
        for event in self.latest_events() {
            if !subscription.matches(event.kind()) {
                continue;
            }
            if !self.send_to(handle, ServerMessage::Event(event.replayed())) {
                return;
            }
        }
    }

    /// Fan one event out to every open connection that wants its kind.
    ///
    /// Returns the number of connections it was queued on.
    pub fn publish(&self, event: Arc<Event>) -> usize {
        let kind = event.kind().clone();
        let _fanout = self.fanout.lock();
        self.latest.insert(kind.clone(), event.clone());

        let mut delivered = 0;
        for handle in self.registry.handles() {
            if handle.is_closed() || !handle.wants(&kind) {
                continue;
            }
            if self.send_to(&handle, ServerMessage::Event(event.clone())) {
                delivered += 1;
            }
        }

        Metrics::events_broadcast(kind.as_str(), delivered);
        trace!(kind = %kind, recipients = delivered, "Event broadcast");
        delivered
    }

    /// Latest event of every kind seen so far, sorted by kind.
    pub fn latest_events(&self) -> Vec<Arc<Event>> {
        let mut events: Vec<_> = self.latest.iter().map(|e| e.value().clone()).collect();
        events.sort_by(|a, b| a.kind().cmp(b.kind()));
        events
    }

    pub fn latest(&self, kind: &DataKind) -> Option<Arc<Event>> {
        self.latest.get(kind).map(|e| e.value().clone())
    }

    /// Drain the intake channel until cancelled or every poller is gone,
    /// then close all connections.
    pub async fn run(
        self: Arc<Self>,
        mut intake: mpsc::Receiver<Arc<Event>>,
        cancel: CancellationToken,
    ) {
        info!(kinds = self.kinds.len(), "Hub started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = intake.recv() => match event {
                    Some(event) => {
                        self.publish(event);
                    }
                    None => {
                        info!("Event intake closed");
                        break;
                    }
                },
            }
        }

        let closed = self.close_all();
        info!(closed, "Hub stopped");
    }

    /// Close and unregister every connection.
    pub fn close_all(&self) -> usize {
        let closed = self.registry.close_all();
        for _ in 0..closed {
            Metrics::ws_connection_closed();
        }
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nasfeed_core::ErrorCode;
    use serde_json::json;

    fn hub(queue_capacity: usize, policy: SlowConsumerPolicy) -> Hub {
        let config = HubConfig {
            queue_capacity,
            slow_consumer: policy,
            ..Default::default()
        };
        Hub::new(
            &config,
            vec![
                DataKind::system_status(),
                DataKind::agents_status(),
                DataKind::compression_update(),
            ],
        )
    }

    fn active(hub: &Hub) -> Arc<ConnectionHandle> {
        let handle = hub.connect();
        handle.activate();
        handle
    }

    fn status_event() -> Arc<Event> {
        Arc::new(Event::fresh(
            DataKind::system_status(),
            json!({"hostname": "nas01"}),
        ))
    }

    fn compression_event() -> Arc<Event> {
        Arc::new(Event::fresh(DataKind::compression_update(), json!({"jobs": []})))
    }

    fn drain(handle: &ConnectionHandle) -> Vec<ServerMessage> {
        std::iter::from_fn(|| handle.queue().try_pop()).collect()
    }

    fn event_kinds(messages: &[ServerMessage]) -> Vec<String> {
        messages
            .iter()
            .filter_map(|m| match m {
                ServerMessage::Event(e) => Some(e.kind().to_string()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_filtering_by_kind() {
        let hub = hub(16, SlowConsumerPolicy::DropOldest);
        let a = active(&hub);
        let b = active(&hub);
        hub.subscribe(&a, vec![DataKind::system_status()]);
        hub.subscribe(&b, vec![DataKind::compression_update()]);
        drain(&a);
        drain(&b);

        hub.publish(status_event());
        hub.publish(compression_event());

        assert_eq!(event_kinds(&drain(&a)), vec!["system.status"]);
        assert_eq!(event_kinds(&drain(&b)), vec!["compression.update"]);
    }

    #[test]
    fn test_each_client_gets_one_copy() {
        let hub = hub(16, SlowConsumerPolicy::DropOldest);
        let clients: Vec<_> = (0..10).map(|_| active(&hub)).collect();

        assert_eq!(hub.publish(status_event()), 10);

        for client in &clients {
            assert_eq!(event_kinds(&drain(client)), vec!["system.status"]);
        }
    }

    #[test]
    fn test_error_events_follow_kind_filter() {
        let hub = hub(16, SlowConsumerPolicy::DropOldest);
        let a = active(&hub);
        hub.subscribe(&a, vec![DataKind::system_status()]);
        drain(&a);

        hub.publish(Arc::new(Event::failure(
            DataKind::compression_update(),
            ErrorCode::TransportError,
            "connection refused",
            1,
        )));

        assert!(drain(&a).is_empty());
    }

    #[test]
    fn test_subscribe_replays_latest() {
        let hub = hub(16, SlowConsumerPolicy::DropOldest);
        hub.publish(status_event());
        hub.publish(compression_event());

        let a = active(&hub);
        hub.subscribe(&a, vec![DataKind::compression_update()]);

        let messages = drain(&a);
        assert!(matches!(messages[0], ServerMessage::Subscribed { .. }));
        assert_eq!(event_kinds(&messages), vec!["compression.update"]);
    }

    #[test]
    fn test_late_subscriber_never_gets_fresh_replay() {
        let hub = hub(16, SlowConsumerPolicy::DropOldest);
        let published = status_event();
        hub.publish(published.clone());

        let late = active(&hub);
        hub.subscribe(&late, vec![DataKind::system_status()]);

        let replayed = drain(&late)
            .into_iter()
            .find_map(|m| match m {
                ServerMessage::Event(e) => Some(e),
                _ => None,
            })
            .unwrap();
        assert!(replayed.is_stale());
        assert_eq!(replayed.error_code(), Some(ErrorCode::Replayed));
        assert_eq!(replayed.last_update(), Some(published.timestamp()));
        assert_eq!(replayed.payload(), published.payload());

        // Subscribers connected during the cycle still get the fresh event.
        hub.publish(status_event());
        match drain(&late).pop() {
            Some(ServerMessage::Event(e)) => assert!(!e.is_stale()),
            other => panic!("expected live event, got {other:?}"),
        }
    }

    #[test]
    fn test_replay_keeps_failure_events() {
        let hub = hub(16, SlowConsumerPolicy::DropOldest);
        let failure = Arc::new(Event::failure(
            DataKind::agents_status(),
            ErrorCode::TransportError,
            "connection refused",
            2,
        ));
        hub.publish(failure.clone());

        let late = active(&hub);
        hub.subscribe(&late, vec![DataKind::agents_status()]);

        let replayed = drain(&late)
            .into_iter()
            .find_map(|m| match m {
                ServerMessage::Event(e) => Some(e),
                _ => None,
            })
            .unwrap();
        assert!(Arc::ptr_eq(&replayed, &failure));
    }

    #[test]
    fn test_slow_consumer_drops_oldest() {
        let hub = hub(2, SlowConsumerPolicy::DropOldest);
        let slow = active(&hub);

        for _ in 0..5 {
            hub.publish(status_event());
        }

        assert_eq!(slow.queue().len(), 2);
        assert_eq!(slow.queue().dropped(), 3);
        assert!(!slow.is_closed());
    }

    #[test]
    fn test_slow_consumer_disconnect_policy() {
        let hub = hub(2, SlowConsumerPolicy::Disconnect);
        let slow = active(&hub);
        let fast = active(&hub);

        hub.publish(status_event());
        hub.publish(status_event());
        drain(&fast);
        let delivered = hub.publish(status_event());

        assert!(slow.is_closed());
        assert!(!fast.is_closed());
        assert_eq!(delivered, 1);
    }

    #[test]
    fn test_disconnect_removes_connection() {
        let hub = hub(16, SlowConsumerPolicy::DropOldest);
        let a = active(&hub);
        let b = active(&hub);

        hub.disconnect(a.id());
        hub.disconnect(a.id());

        assert_eq!(hub.connection_count(), 1);
        assert!(a.is_closed());
        assert_eq!(hub.publish(status_event()), 1);
        assert_eq!(event_kinds(&drain(&b)), vec!["system.status"]);
    }

    #[tokio::test]
    async fn test_run_fans_out_and_closes_on_cancel() {
        let hub = Arc::new(hub(16, SlowConsumerPolicy::DropOldest));
        let client = active(&hub);
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(hub.clone().run(rx, cancel.clone()));

        tx.send(status_event()).await.unwrap();
        let message = tokio::time::timeout(std::time::Duration::from_secs(1), client.queue().pop())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.message_type(), "system.status");

        cancel.cancel();
        task.await.unwrap();
        assert!(client.is_closed());
        assert_eq!(hub.connection_count(), 0);
    }
}
