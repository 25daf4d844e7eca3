//! Message envelope for Relay.

use crate::topic::Topic;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A unique message identifier.
pub type MessageId = String;

/// Generate a unique identifier.
///
/// 8 random bytes rendered as 16 lowercase hex characters. Used for both
/// message and subscription ids.
#[must_use]
pub fn generate_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}

/// An immutable message published to a topic.
///
/// The payload is shared between every subscriber the message is fanned out to,
/// so cloning a message never copies it.
pub struct Message<T = Bytes> {
    id: MessageId,
    topic: Topic,
    payload: Arc<T>,
    created_at: SystemTime,
}

impl<T> Message<T> {
    /// Create a new message.
    #[must_use]
    pub fn new(topic: Topic, payload: T) -> Self {
        Self {
            id: generate_id(),
            topic,
            payload: Arc::new(payload),
            created_at: SystemTime::now(),
        }
    }

    /// Get the message id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the topic the message was published to.
    #[must_use]
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Get the payload.
    #[must_use]
    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Get a shared handle to the payload.
    #[must_use]
    pub fn shared_payload(&self) -> Arc<T> {
        Arc::clone(&self.payload)
    }

    /// When the message was created.
    #[must_use]
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    fn created_at_millis(&self) -> u128 {
        self.created_at
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis()
    }
}

impl Message<Bytes> {
    /// Create a message from raw bytes.
    #[must_use]
    pub fn from_bytes(topic: Topic, payload: impl Into<Bytes>) -> Self {
        Self::new(topic, payload.into())
    }

    /// Get the payload size in bytes.
    #[must_use]
    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }
}

impl<T> Clone for Message<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            topic: self.topic.clone(),
            payload: Arc::clone(&self.payload),
            created_at: self.created_at,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Message<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("payload", &self.payload)
            .field("created_at", &self.created_at)
            .finish()
    }
}

impl<T> fmt::Display for Message<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Message[{}] on topic[{}] at {}",
            self.id,
            self.topic,
            self.created_at_millis()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn topic(name: &str) -> Topic {
        Topic::new(name).unwrap()
    }

    #[test]
    fn test_message_creation() {
        let msg = Message::from_bytes(topic("users"), b"hello".to_vec());
        assert_eq!(msg.topic().as_str(), "users");
        assert_eq!(&msg.payload()[..], b"hello");
        assert_eq!(msg.payload_size(), 5);

        let age = SystemTime::now()
            .duration_since(msg.created_at())
            .unwrap_or_default();
        assert!(age < Duration::from_secs(1));
    }

    #[test]
    fn test_message_with_typed_payload() {
        let msg = Message::new(topic("events"), vec![("id", 123)]);
        assert_eq!(msg.payload(), &vec![("id", 123)]);

        let empty = Message::new(topic("events"), ());
        assert_eq!(empty.payload(), &());
    }

    #[test]
    fn test_message_id_format() {
        let msg = Message::new(topic("users"), ());
        assert_eq!(msg.id().len(), 16);
        assert!(msg.id().bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
    }

    #[test]
    fn test_unique_message_ids() {
        let id1 = generate_id();
        let id2 = generate_id();
        // IDs should be different (with high probability)
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_clone_shares_payload() {
        let msg = Message::new(topic("users"), String::from("shared"));
        let copy = msg.clone();
        assert_eq!(copy.id(), msg.id());
        assert!(Arc::ptr_eq(&msg.shared_payload(), &copy.shared_payload()));
    }

    #[test]
    fn test_message_display() {
        let msg = Message::new(topic("users"), "test data");
        let rendered = msg.to_string();
        assert!(rendered.starts_with("Message["));
        assert!(rendered.contains(msg.id()));
        assert!(rendered.contains("topic[users]"));
    }
}
