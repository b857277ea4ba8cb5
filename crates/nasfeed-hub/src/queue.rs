//! Bounded per-connection outbound queue.
//!
//! Producers (the hub loop and the connection's reader) never wait: a push
//! either queues, evicts the oldest entry, or is rejected. The connection's
//! writer is the only consumer.

use crate::config::SlowConsumerPolicy;
use nasfeed_core::ServerMessage;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queued after evicting the oldest entry.
    DroppedOldest,
    /// Not queued: the queue is full under `Disconnect`, or closed.
    Rejected,
}

#[derive(Debug)]
pub struct OutboundQueue {
    capacity: usize,
    items: Mutex<VecDeque<ServerMessage>>,
    notify: Notify,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn push(&self, message: ServerMessage, policy: SlowConsumerPolicy) -> PushOutcome {
        if self.closed.load(Ordering::Acquire) {
            return PushOutcome::Rejected;
        }

        let outcome = {
            let mut items = self.items.lock();
            if items.len() < self.capacity {
                items.push_back(message);
                PushOutcome::Queued
            } else {
                match policy {
                    SlowConsumerPolicy::DropOldest => {
                        items.pop_front();
                        items.push_back(message);
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        PushOutcome::DroppedOldest
                    }
                    SlowConsumerPolicy::Disconnect => PushOutcome::Rejected,
                }
            }
        };

        if outcome != PushOutcome::Rejected {
            self.notify.notify_one();
        }
        outcome
    }

    pub fn try_pop(&self) -> Option<ServerMessage> {
        self.items.lock().pop_front()
    }

    /// Wait for the next message. Returns `None` once the queue is closed.
    pub async fn pop(&self) -> Option<ServerMessage> {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            if let Some(message) = self.try_pop() {
                return Some(message);
            }
            self.notify.notified().await;
        }
    }

    /// Stop accepting messages and wake the consumer.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.items.lock().clear();
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Messages evicted under `DropOldest` so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    fn error(n: usize) -> ServerMessage {
        ServerMessage::Error {
            message: n.to_string(),
        }
    }

    fn text(message: ServerMessage) -> String {
        match message {
            ServerMessage::Error { message } => message,
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_drop_oldest_when_full() {
        let queue = OutboundQueue::new(2);
        assert_eq!(queue.push(error(1), SlowConsumerPolicy::DropOldest), PushOutcome::Queued);
        assert_eq!(queue.push(error(2), SlowConsumerPolicy::DropOldest), PushOutcome::Queued);
        assert_eq!(
            queue.push(error(3), SlowConsumerPolicy::DropOldest),
            PushOutcome::DroppedOldest
        );

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped(), 1);
        assert_eq!(text(queue.try_pop().unwrap()), "2");
        assert_eq!(text(queue.try_pop().unwrap()), "3");
    }

    #[test]
    fn test_disconnect_policy_rejects_when_full() {
        let queue = OutboundQueue::new(1);
        queue.push(error(1), SlowConsumerPolicy::Disconnect);

        assert_eq!(
            queue.push(error(2), SlowConsumerPolicy::Disconnect),
            PushOutcome::Rejected
        );
        assert_eq!(text(queue.try_pop().unwrap()), "1");
    }

    #[test]
    fn test_closed_queue_rejects() {
        let queue = OutboundQueue::new(4);
        queue.push(error(1), SlowConsumerPolicy::DropOldest);
        queue.close();

        assert!(queue.is_empty());
        assert_eq!(
            queue.push(error(2), SlowConsumerPolicy::DropOldest),
            PushOutcome::Rejected
        );
    }

    #[test]
    fn test_pop_waits_for_push() {
        let queue = OutboundQueue::new(4);
        let mut pop = task::spawn(queue.pop());
        assert_pending!(pop.poll());

        queue.push(error(7), SlowConsumerPolicy::DropOldest);

        assert!(pop.is_woken());
        let message = assert_ready!(pop.poll()).unwrap();
        assert_eq!(text(message), "7");
    }

    #[test]
    fn test_close_wakes_consumer() {
        let queue = OutboundQueue::new(4);
        let mut pop = task::spawn(queue.pop());
        assert_pending!(pop.poll());

        queue.close();

        assert!(pop.is_woken());
        assert!(assert_ready!(pop.poll()).is_none());
    }

    #[test]
    fn test_pop_drains_before_waiting() {
        let queue = OutboundQueue::new(4);
        queue.push(error(1), SlowConsumerPolicy::DropOldest);

        let mut pop = task::spawn(queue.pop());
        assert_eq!(text(assert_ready!(pop.poll()).unwrap()), "1");

        let mut next = task::spawn(queue.pop());
        assert_pending!(next.poll());
    }
}
