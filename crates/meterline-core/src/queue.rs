//! Bounded message queue with flush tracking.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use tokio::sync::Notify;

use crate::message::Message;

/// A capacity-bounded, thread-safe FIFO of pending messages.
///
/// Producers enqueue without blocking and are rejected when the queue is
/// full. Consumers dequeue in insertion order. A pending-work counter tracks
/// every accepted message until a consumer reports it processed via
/// [`task_done`](Self::task_done), which is what [`join`](Self::join) waits
/// on: a message counts as processed whether it was delivered, dropped as
/// oversize, or discarded after a fatal delivery error.
#[derive(Debug)]
pub struct MessageQueue {
    items: Mutex<VecDeque<Message>>,
    capacity: usize,
    pending: AtomicUsize,
    /// Signaled on every successful push.
    pushed: Notify,
    /// Signaled when the pending count drops to zero.
    drained: Notify,
}

impl MessageQueue {
    /// Create a queue holding at most `capacity` messages.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            capacity,
            pending: AtomicUsize::new(0),
            pushed: Notify::new(),
            drained: Notify::new(),
        }
    }

    /// Enqueue a message without blocking.
    ///
    /// Returns `false` (and does not take the message) when the queue is at
    /// capacity; the caller decides whether to drop or retry.
    pub fn try_push(&self, message: Message) -> bool {
        {
            let mut items = self.items.lock().expect("queue lock poisoned");
            if items.len() >= self.capacity {
                return false;
            }
            items.push_back(message);
        }
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.pushed.notify_one();
        true
    }

    /// Dequeue the oldest message, if any.
    pub fn try_pop(&self) -> Option<Message> {
        self.items.lock().expect("queue lock poisoned").pop_front()
    }

    /// Remove and return up to `max_count` oldest messages in insertion
    /// order. Returns an empty vector when the queue is empty.
    pub fn drain_up_to(&self, max_count: usize) -> Vec<Message> {
        let mut items = self.items.lock().expect("queue lock poisoned");
        let n = max_count.min(items.len());
        items.drain(..n).collect()
    }

    /// Number of messages currently queued (not yet dequeued).
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().expect("queue lock poisoned").len()
    }

    /// Whether the queue is currently empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of accepted messages not yet reported processed.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Report one dequeued message as fully processed.
    ///
    /// Must be called exactly once per dequeued message, whatever its
    /// outcome. Wakes [`join`](Self::join) waiters once the count reaches
    /// zero.
    pub fn task_done(&self) {
        let previous = self.pending.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "task_done without matching push");
        if previous == 1 {
            self.drained.notify_waiters();
        }
    }

    /// Wait until a push occurs.
    ///
    /// Consumers pair this with a timer; a wakeup does not guarantee an item
    /// is still available, so callers re-check with
    /// [`try_pop`](Self::try_pop).
    pub async fn pushed(&self) {
        self.pushed.notified().await;
    }

    /// Wait until every message accepted before this call has been
    /// processed.
    ///
    /// Returns immediately when nothing is pending, so flushing an idle
    /// queue with no consumer attached cannot deadlock.
    pub async fn join(&self) {
        loop {
            let drained = self.drained.notified();
            if self.pending.load(Ordering::Acquire) == 0 {
                return;
            }
            drained.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn msg(i: usize) -> Message {
        Message::new("track_event").with("n", json!(i))
    }

    #[test]
    fn push_pop_preserves_order() {
        let queue = MessageQueue::new(10);
        for i in 0..5 {
            assert!(queue.try_push(msg(i)));
        }
        for i in 0..5 {
            assert_eq!(queue.try_pop().unwrap().get("n"), Some(&json!(i)));
        }
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn rejects_when_full() {
        let queue = MessageQueue::new(1);
        assert!(queue.try_push(msg(0)));
        assert!(!queue.try_push(msg(1)));
        assert_eq!(queue.len(), 1);
        // The rejected message must not affect the pending count.
        assert_eq!(queue.pending(), 1);
    }

    #[test]
    fn drain_up_to_limits_and_orders() {
        let queue = MessageQueue::new(100);
        for i in 0..7 {
            assert!(queue.try_push(msg(i)));
        }
        let first = queue.drain_up_to(5);
        assert_eq!(first.len(), 5);
        assert_eq!(first[0].get("n"), Some(&json!(0)));
        assert_eq!(first[4].get("n"), Some(&json!(4)));
        assert_eq!(queue.drain_up_to(5).len(), 2);
        assert!(queue.drain_up_to(5).is_empty());
    }

    #[test]
    fn pending_tracks_pushes_not_pops() {
        let queue = MessageQueue::new(10);
        queue.try_push(msg(0));
        queue.try_push(msg(1));
        assert_eq!(queue.pending(), 2);

        queue.try_pop();
        assert_eq!(queue.pending(), 2);

        queue.task_done();
        assert_eq!(queue.pending(), 1);
    }

    #[tokio::test]
    async fn join_returns_immediately_when_idle() {
        let queue = MessageQueue::new(10);
        tokio::time::timeout(Duration::from_millis(100), queue.join())
            .await
            .expect("join on idle queue must not block");
    }

    #[tokio::test]
    async fn join_waits_for_task_done() {
        let queue = Arc::new(MessageQueue::new(10));
        queue.try_push(msg(0));
        queue.try_push(msg(1));

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.join().await })
        };

        queue.try_pop();
        queue.task_done();
        assert!(!waiter.is_finished());

        queue.try_pop();
        queue.task_done();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("join must complete once pending reaches zero")
            .unwrap();
    }

    #[tokio::test]
    async fn pushed_wakes_a_waiter() {
        let queue = Arc::new(MessageQueue::new(10));
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pushed().await })
        };
        // Give the waiter a chance to register.
        tokio::task::yield_now().await;
        queue.try_push(msg(0));
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("push must wake the waiter")
            .unwrap();
    }
}
