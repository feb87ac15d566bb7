//! Core message types
//!
//! - [`IncomingMessage`] - what the connection layer hands to the engine
//! - [`Message`] - a normalized message as stored in the topic tree
//! - [`TopicPath`] - a topic split into its non-empty segments
//!
//! Metadata keys written by the namespace-expanding preprocessor are exposed
//! as constants so consumers don't have to repeat string literals.

use crate::payload::PayloadValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Metadata key for the Sparkplug message type (`BIRTH`, `DATA`, ...).
pub const META_MESSAGE_TYPE: &str = "messageType";
/// Metadata key for the edge node id.
pub const META_NODE_ID: &str = "nodeId";
/// Metadata key for the device id (device-level topics only).
pub const META_DEVICE_ID: &str = "deviceId";

/// Free-form annotations attached during preprocessing.
pub type MessageMetadata = BTreeMap<String, String>;

/// Raw message as delivered by the connection/event-bus collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    pub topic: String,
    pub payload: Option<Vec<u8>>,
    pub received_at: DateTime<Utc>,
}

impl IncomingMessage {
    pub fn new(topic: impl Into<String>, payload: Option<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload,
            received_at: Utc::now(),
        }
    }

    pub fn with_received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = received_at;
        self
    }
}

/// A message as seen by the preprocessor and the topic tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<PayloadValue>,
    pub received_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: MessageMetadata,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: Option<PayloadValue>) -> Self {
        Self {
            topic: topic.into(),
            payload,
            received_at: Utc::now(),
            metadata: MessageMetadata::new(),
        }
    }

    /// Message with a UTF-8 text payload.
    pub fn text(topic: impl Into<String>, text: &str) -> Self {
        Self::new(topic, Some(PayloadValue::from_text(text)))
    }

    pub fn with_received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = received_at;
        self
    }

    pub fn with_metadata(mut self, metadata: MessageMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Decoded text of the payload, if any.
    pub fn payload_text(&self) -> Option<&str> {
        self.payload.as_ref().map(PayloadValue::to_text)
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn path(&self) -> TopicPath {
        TopicPath::parse(&self.topic)
    }
}

impl From<IncomingMessage> for Message {
    fn from(incoming: IncomingMessage) -> Self {
        Self {
            topic: incoming.topic,
            payload: incoming.payload.map(PayloadValue::from_bytes),
            received_at: incoming.received_at,
            metadata: MessageMetadata::new(),
        }
    }
}

/// A topic split on `/` into non-empty, case-sensitive segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TopicPath(Vec<String>);

impl TopicPath {
    pub fn parse(topic: &str) -> Self {
        Self(
            topic
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl fmt::Display for TopicPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

impl From<Vec<String>> for TopicPath {
    fn from(segments: Vec<String>) -> Self {
        Self(segments.into_iter().filter(|s| !s.is_empty()).collect())
    }
}
