//! Background consumer draining the queue into delivered batches.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use meterline_core::{Batch, BatchPush, Message, MessageQueue, RetryPolicy};

use crate::delivery::Delivery;
use crate::error::ClientError;

/// Callback invoked with the error and the failed batch when a delivery
/// fails fatally (non-retryable status, or retries exhausted).
pub type ErrorCallback = Arc<dyn Fn(&ClientError, &[Message]) + Send + Sync>;

const STATE_STOPPED: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_PAUSING: u8 = 2;

/// Consumer lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Not running: either never started or fully drained after a pause.
    Stopped,
    /// Draining the queue on the threshold-or-timer loop.
    Running,
    /// Pause requested: finishing in-flight work and draining the queue.
    Pausing,
}

impl State {
    fn from_u8(raw: u8) -> Self {
        match raw {
            STATE_RUNNING => Self::Running,
            STATE_PAUSING => Self::Pausing,
            _ => Self::Stopped,
        }
    }
}

/// A background worker bound to one queue and one delivery endpoint.
///
/// Constructed stopped; [`start`](Self::start) spawns the task. While
/// running, each loop iteration waits until the queue holds `flush_at`
/// messages, the flush interval elapses, or a pause is requested, then
/// assembles and delivers at most one batch. [`pause`](Self::pause) lets the
/// in-flight delivery finish, drains the rest of the queue, and stops.
pub(crate) struct Consumer {
    queue: Arc<MessageQueue>,
    delivery: Arc<Delivery>,
    endpoint: String,
    flush_at: usize,
    flush_interval: Duration,
    retry: RetryPolicy,
    on_error: Option<ErrorCallback>,
    state: AtomicU8,
    pause_requested: Notify,
    stopped: Notify,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Consumer {
    pub(crate) fn new(
        queue: Arc<MessageQueue>,
        delivery: Arc<Delivery>,
        endpoint: String,
        flush_at: usize,
        flush_interval: Duration,
        retry: RetryPolicy,
        on_error: Option<ErrorCallback>,
    ) -> Self {
        Self {
            queue,
            delivery,
            endpoint,
            flush_at,
            flush_interval,
            retry,
            on_error,
            state: AtomicU8::new(STATE_STOPPED),
            pause_requested: Notify::new(),
            stopped: Notify::new(),
            handle: Mutex::new(None),
        }
    }

    /// Spawn the background task. Starting twice is a no-op.
    pub(crate) fn start(self: &Arc<Self>) {
        if self
            .state
            .compare_exchange(
                STATE_STOPPED,
                STATE_RUNNING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }
        let task = tokio::spawn(Arc::clone(self).run());
        *self.handle.lock().expect("consumer lock poisoned") = Some(task);
    }

    /// Request a graceful stop. The consumer finishes its in-flight
    /// delivery, drains the queue, and transitions to stopped. Pausing a
    /// consumer that never started is a no-op.
    pub(crate) fn pause(&self) {
        if self
            .state
            .compare_exchange(
                STATE_RUNNING,
                STATE_PAUSING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            self.pause_requested.notify_waiters();
        }
    }

    /// Wait until the consumer reaches the stopped state.
    ///
    /// Joining a consumer that never started returns immediately.
    pub(crate) async fn join(&self) {
        let handle = self.handle.lock().expect("consumer lock poisoned").take();
        if let Some(handle) = handle {
            if handle.await.is_err() {
                tracing::warn!("consumer task panicked");
            }
            return;
        }
        // No handle: never started, or another caller is already awaiting
        // the task. Wait on the state instead.
        loop {
            let stopped = self.stopped.notified();
            if self.state() == State::Stopped {
                return;
            }
            stopped.await;
        }
    }

    fn state(&self) -> State {
        State::from_u8(self.state.load(Ordering::Acquire))
    }

    async fn run(self: Arc<Self>) {
        tracing::debug!(endpoint = %self.endpoint, "consumer started");
        let mut carry: Option<Message> = None;

        while self.state() == State::Running {
            let batch = self.next_batch(&mut carry).await;
            if !batch.is_empty() {
                self.deliver(batch).await;
            }
        }

        // Pausing: deliver everything still queued, then stop.
        loop {
            let batch = self.gather_ready(&mut carry);
            if batch.is_empty() {
                break;
            }
            self.deliver(batch).await;
        }

        self.state.store(STATE_STOPPED, Ordering::Release);
        self.stopped.notify_waiters();
        tracing::debug!("consumer stopped");
    }

    /// Assemble the next batch, waiting up to the flush interval for input.
    ///
    /// Returns early when the batch reaches `flush_at`, a message is
    /// deferred for byte overflow, or a pause is requested. May return an
    /// empty batch when the interval elapses on an idle queue.
    async fn next_batch(&self, carry: &mut Option<Message>) -> Batch {
        let deadline = Instant::now() + self.flush_interval;
        let mut batch = Batch::new(self.flush_at);

        if let Some(message) = carry.take() {
            self.offer(&mut batch, message, carry);
        }

        loop {
            if batch.is_full() || carry.is_some() {
                break;
            }
            match self.queue.try_pop() {
                Some(message) => self.offer(&mut batch, message, carry),
                None => {
                    if self.state() != State::Running || Instant::now() >= deadline {
                        break;
                    }
                    tokio::select! {
                        () = self.queue.pushed() => {}
                        () = self.pause_requested.notified() => {}
                        () = sleep_until(deadline) => break,
                    }
                }
            }
        }
        batch
    }

    /// Assemble a batch from already-queued messages without waiting.
    fn gather_ready(&self, carry: &mut Option<Message>) -> Batch {
        let mut batch = Batch::new(self.flush_at);
        if let Some(message) = carry.take() {
            self.offer(&mut batch, message, carry);
        }
        while !batch.is_full() && carry.is_none() {
            let Some(message) = self.queue.try_pop() else {
                break;
            };
            self.offer(&mut batch, message, carry);
        }
        batch
    }

    fn offer(&self, batch: &mut Batch, message: Message, carry: &mut Option<Message>) {
        match batch.push(message) {
            BatchPush::Added => {}
            BatchPush::Oversize(message) => self.drop_oversize(&message),
            BatchPush::Deferred(message) => *carry = Some(message),
        }
    }

    /// A message too large to ever deliver: warn, drop, and count it as
    /// processed so flush() does not hang on it.
    fn drop_oversize(&self, message: &Message) {
        tracing::warn!(
            operation = message.operation().unwrap_or("unknown"),
            bytes = message.encoded_len(),
            "dropping message over the per-message size cap"
        );
        self.queue.task_done();
    }

    async fn deliver(&self, batch: Batch) {
        let messages = batch.into_messages();
        let result = self
            .delivery
            .send_batch(&self.endpoint, &messages, &self.retry)
            .await;

        if let Err(err) = result {
            tracing::warn!(
                count = messages.len(),
                error = %err,
                "discarding batch after delivery failure"
            );
            if let Some(callback) = &self.on_error {
                callback(&err, &messages);
            }
        }

        // Success, fatal drop, and everything in between all count as
        // processed exactly once.
        for _ in 0..messages.len() {
            self.queue.task_done();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meterline_core::MAX_MESSAGE_BYTES;
    use serde_json::json;

    fn consumer(queue: Arc<MessageQueue>, flush_at: usize) -> Arc<Consumer> {
        let delivery =
            Delivery::new("testsecret", Duration::from_secs(15), false, false).unwrap();
        Arc::new(Consumer::new(
            queue,
            Arc::new(delivery),
            "http://localhost:9/api/track/".to_string(),
            flush_at,
            Duration::from_millis(500),
            RetryPolicy::default(),
            None,
        ))
    }

    fn msg(i: usize) -> Message {
        Message::new("track_event").with("n", json!(i))
    }

    #[tokio::test]
    async fn join_before_start_is_noop() {
        let queue = Arc::new(MessageQueue::new(10));
        let consumer = consumer(queue, 10);
        tokio::time::timeout(Duration::from_millis(100), consumer.join())
            .await
            .expect("join before start must not block");
    }

    #[tokio::test]
    async fn pause_before_start_keeps_stopped() {
        let queue = Arc::new(MessageQueue::new(10));
        let consumer = consumer(queue, 10);
        consumer.pause();
        assert_eq!(consumer.state(), State::Stopped);
    }

    #[tokio::test]
    async fn gather_ready_respects_flush_at() {
        let queue = Arc::new(MessageQueue::new(100));
        for i in 0..25 {
            assert!(queue.try_push(msg(i)));
        }
        let consumer = consumer(Arc::clone(&queue), 10);
        let mut carry = None;

        let sizes: Vec<usize> = std::iter::from_fn(|| {
            let batch = consumer.gather_ready(&mut carry);
            (!batch.is_empty()).then(|| batch.len())
        })
        .collect();
        assert_eq!(sizes, vec![10, 10, 5]);
    }

    #[tokio::test]
    async fn gather_ready_drops_oversize_and_counts_it_processed() {
        let queue = Arc::new(MessageQueue::new(10));
        assert!(queue.try_push(msg(0)));
        assert!(queue.try_push(
            Message::new("track_event").with("pad", json!("x".repeat(MAX_MESSAGE_BYTES)))
        ));
        assert!(queue.try_push(msg(1)));
        assert_eq!(queue.pending(), 3);

        let consumer = consumer(Arc::clone(&queue), 10);
        let mut carry = None;
        let batch = consumer.gather_ready(&mut carry);

        assert_eq!(batch.len(), 2);
        // The oversize drop already counted as processed.
        assert_eq!(queue.pending(), 2);
    }

    #[tokio::test]
    async fn next_batch_returns_at_deadline_when_idle() {
        let queue = Arc::new(MessageQueue::new(10));
        let consumer = consumer(queue, 10);
        // Force the running state so next_batch actually waits.
        consumer.state.store(STATE_RUNNING, Ordering::Release);
        let mut carry = None;

        let start = Instant::now();
        let batch = tokio::time::timeout(
            Duration::from_secs(2),
            consumer.next_batch(&mut carry),
        )
        .await
        .expect("next_batch must respect its deadline");
        assert!(batch.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(400));
    }
}
