//! Count- and byte-bounded batch assembly.

use crate::message::{Message, MAX_MESSAGE_BYTES};

/// Upper bound on the serialized size of a delivered batch body, in bytes.
pub const MAX_BATCH_BYTES: usize = 500_000;

/// Byte budget used while assembling a batch.
///
/// Counts raw message sizes only; the headroom below [`MAX_BATCH_BYTES`]
/// absorbs the wire envelope (`batch` array syntax, separators, `sentAt`).
pub const BATCH_BYTES_BUDGET: usize = 475_000;

/// Default maximum number of messages per batch.
pub const DEFAULT_FLUSH_AT: usize = 100;

/// Result of offering a message to a batch.
#[derive(Debug)]
pub enum BatchPush {
    /// The message was added to the batch.
    Added,
    /// The message alone exceeds the per-message cap. It is handed back so
    /// the caller can drop it and account for it; it must never be
    /// delivered.
    Oversize(Message),
    /// Adding the message would overflow a batch bound. It is handed back
    /// for deferral to the following batch.
    Deferred(Message),
}

/// An ordered group of messages bounded by count and serialized size.
///
/// Messages are offered one at a time via [`push`](Self::push); the batch
/// enforces the per-message cap, the count bound, and the byte budget, and
/// hands back any message it cannot take.
#[derive(Debug)]
pub struct Batch {
    messages: Vec<Message>,
    bytes: usize,
    max_count: usize,
}

impl Batch {
    /// Create an empty batch bounded by `max_count` messages.
    #[must_use]
    pub fn new(max_count: usize) -> Self {
        Self {
            messages: Vec::new(),
            bytes: 0,
            max_count,
        }
    }

    /// Offer a message to the batch.
    pub fn push(&mut self, message: Message) -> BatchPush {
        let len = message.encoded_len();
        if len > MAX_MESSAGE_BYTES {
            return BatchPush::Oversize(message);
        }
        if self.messages.len() >= self.max_count || self.bytes + len > BATCH_BYTES_BUDGET {
            return BatchPush::Deferred(message);
        }
        self.bytes += len;
        self.messages.push(message);
        BatchPush::Added
    }

    /// Whether the count bound has been reached.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.messages.len() >= self.max_count
    }

    /// Number of messages in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the batch holds no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Accounted serialized size of the batched messages, in bytes.
    #[must_use]
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// The batched messages, in enqueue order.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Consume the batch, yielding its messages in enqueue order.
    #[must_use]
    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn msg(i: usize) -> Message {
        Message::new("track_event").with("n", json!(i))
    }

    fn sized_msg(bytes: usize) -> Message {
        // Payload padding dominates; the fixed fields are a few dozen bytes.
        Message::new("track_event").with("pad", json!("x".repeat(bytes)))
    }

    #[test]
    fn respects_count_bound() {
        let mut batch = Batch::new(3);
        for i in 0..3 {
            assert!(matches!(batch.push(msg(i)), BatchPush::Added));
        }
        assert!(batch.is_full());
        assert!(matches!(batch.push(msg(3)), BatchPush::Deferred(_)));
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn defers_message_that_would_overflow_bytes() {
        let mut batch = Batch::new(1000);
        // Each message is ~30 KB; 16 of them stay under the budget, the
        // 17th would cross it and must come back for the next batch.
        for _ in 0..15 {
            assert!(matches!(batch.push(sized_msg(30_000)), BatchPush::Added));
        }
        let overflow = sized_msg(30_000);
        let expected = overflow.get("pad").cloned();
        match batch.push(overflow) {
            BatchPush::Deferred(returned) => {
                assert_eq!(returned.get("pad").cloned(), expected);
            }
            other => panic!("expected deferral, got {other:?}"),
        }
        assert!(batch.bytes() <= BATCH_BYTES_BUDGET);
    }

    #[test]
    fn rejects_oversize_message_without_accounting() {
        let mut batch = Batch::new(10);
        let before = batch.bytes();
        match batch.push(sized_msg(MAX_MESSAGE_BYTES)) {
            BatchPush::Oversize(_) => {}
            other => panic!("expected oversize rejection, got {other:?}"),
        }
        assert_eq!(batch.bytes(), before);
        assert!(batch.is_empty());
    }

    #[test]
    fn preserves_insertion_order() {
        let mut batch = Batch::new(10);
        for i in 0..5 {
            let _ = batch.push(msg(i));
        }
        let messages = batch.into_messages();
        for (i, m) in messages.iter().enumerate() {
            assert_eq!(m.get("n"), Some(&json!(i)));
        }
    }

    #[test]
    fn assembled_batch_fits_wire_bound() {
        let mut batch = Batch::new(usize::MAX);
        loop {
            match batch.push(sized_msg(20_000)) {
                BatchPush::Added => {}
                _ => break,
            }
        }
        let body = serde_json::json!({
            "batch": batch.messages(),
            "sentAt": "2026-01-01T00:00:00+00:00",
        });
        let encoded = serde_json::to_vec(&body).unwrap();
        assert!(encoded.len() <= MAX_BATCH_BYTES);
    }
}
