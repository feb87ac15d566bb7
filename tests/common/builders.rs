//! Test data builders for creating test objects

use chrono::{DateTime, TimeZone, Utc};
use topic_tree::{IncomingMessage, Message};

/// Builder for incoming and stored messages
pub struct MessageBuilder {
    topic: String,
    payload: Option<Vec<u8>>,
    received_at: DateTime<Utc>,
}

impl MessageBuilder {
    pub fn new(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            payload: None,
            received_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    pub fn text(mut self, text: &str) -> Self {
        self.payload = Some(text.as_bytes().to_vec());
        self
    }

    pub fn bytes(mut self, bytes: Vec<u8>) -> Self {
        self.payload = Some(bytes);
        self
    }

    pub fn received_at_secs(mut self, secs: i64) -> Self {
        self.received_at = Utc.timestamp_opt(secs, 0).unwrap();
        self
    }

    pub fn incoming(self) -> IncomingMessage {
        IncomingMessage::new(self.topic, self.payload).with_received_at(self.received_at)
    }

    pub fn build(self) -> Message {
        Message::from(self.incoming())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_builder() {
        let msg = MessageBuilder::new("a/b")
            .text("hello")
            .received_at_secs(42)
            .build();

        assert_eq!(msg.topic, "a/b");
        assert_eq!(msg.payload_text(), Some("hello"));
        assert_eq!(msg.received_at.timestamp(), 42);
    }
}
