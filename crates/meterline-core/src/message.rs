//! The message unit that flows through the queue.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Hard cap on the serialized size of a single message, in bytes.
///
/// Messages larger than this are dropped by the batcher: they are never
/// delivered and never retried.
pub const MAX_MESSAGE_BYTES: usize = 32 * 1024;

/// Field carrying the logical operation discriminator.
pub const KEY_TYPE: &str = "$type";

/// Field carrying the library name, injected at enqueue time.
pub const KEY_LIBRARY: &str = "library";

/// Field carrying the library version, injected at enqueue time.
pub const KEY_LIBRARY_VERSION: &str = "library_version";

/// One unit of trackable data bound for the metering API.
///
/// A message is an opaque mapping of string keys to JSON values. It always
/// carries the [`KEY_TYPE`] discriminator naming its logical operation; the
/// client injects library identity metadata when it enqueues the message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message {
    fields: Map<String, Value>,
}

impl Message {
    /// Create a message for the given operation name.
    #[must_use]
    pub fn new(operation: &str) -> Self {
        let mut fields = Map::new();
        fields.insert(KEY_TYPE.to_string(), Value::String(operation.to_string()));
        Self { fields }
    }

    /// The logical operation this message belongs to, if present.
    #[must_use]
    pub fn operation(&self) -> Option<&str> {
        self.fields.get(KEY_TYPE).and_then(Value::as_str)
    }

    /// Insert a field, replacing any previous value under the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    /// Insert a field and return the message, for builder-style use.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    /// Read a field by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// The underlying field map.
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Serialized size of this message in bytes.
    ///
    /// Used for batch size accounting and the per-message cap. Serialization
    /// of a `Map<String, Value>` cannot fail, so a length of zero is only
    /// returned for a message that could not be encoded at all.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        serde_json::to_vec(&self.fields).map_or(0, |v| v.len())
    }

    /// Whether this message exceeds [`MAX_MESSAGE_BYTES`] on its own.
    #[must_use]
    pub fn is_oversize(&self) -> bool {
        self.encoded_len() > MAX_MESSAGE_BYTES
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn carries_operation_discriminator() {
        let msg = Message::new("track_event");
        assert_eq!(msg.operation(), Some("track_event"));
    }

    #[test]
    fn builder_inserts_fields() {
        let msg = Message::new("track_event")
            .with("customer_id", json!("cust_1"))
            .with("properties", json!({"region": "US"}));

        assert_eq!(msg.get("customer_id"), Some(&json!("cust_1")));
        assert_eq!(msg.fields().len(), 3);
    }

    #[test]
    fn serializes_as_flat_object() {
        let msg = Message::new("track_event").with("a", json!(1));
        let encoded = serde_json::to_value(&msg).unwrap();
        assert_eq!(encoded, json!({"$type": "track_event", "a": 1}));
    }

    #[test]
    fn oversize_detection() {
        let small = Message::new("track_event");
        assert!(!small.is_oversize());

        let big = Message::new("track_event").with("m", json!("x".repeat(MAX_MESSAGE_BYTES)));
        assert!(big.is_oversize());
    }

    #[test]
    fn encoded_len_matches_serialization() {
        let msg = Message::new("track_event").with("b", json!("x"));
        let bytes = serde_json::to_vec(&msg).unwrap();
        assert_eq!(msg.encoded_len(), bytes.len());
    }
}
