//! Message preprocessing ahead of tree insertion.
//!
//! A preprocessor maps one incoming message to zero, one or many messages.
//! It runs at intake time, before the message is buffered.
//!
//! ## Namespace expansion
//!
//! Sparkplug B packs many metrics into one protobuf blob published under a
//! compact topic. [`NamespaceExpander`] unpacks it so each metric lands on its
//! own topic, the same shape a plain per-topic publisher would produce:
//!
//! ```text
//! spBv1.0/plant:line1/NDATA/edge7   { metrics: [ {name: "motor:rpm"}, {name: "temp"} ] }
//!   -> plant/line1/motor/rpm        { name: "motor:rpm", ... }
//!   -> plant/line1/temp             { name: "temp", ... }
//! ```
//!
//! Group ids and metric names use `:` as a namespace separator; empty parts are
//! dropped.

use crate::payload::PayloadValue;
use crate::pipeline::decoder::SparkplugDecoder;
use crate::pipeline::sparkplug::SparkplugTopic;
use crate::types::{Message, MessageMetadata, META_DEVICE_ID, META_MESSAGE_TYPE, META_NODE_ID};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Selects a preprocessor by tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PreprocessorKind {
    #[default]
    None,
    NamespaceExpanding,
}

/// Enum dispatch over the built-in preprocessors.
#[derive(Debug, Clone, Default)]
pub enum Preprocessor {
    /// Identity: every message passes through unchanged.
    #[default]
    None,
    NamespaceExpanding(NamespaceExpander),
}

impl Preprocessor {
    pub fn from_kind(kind: PreprocessorKind) -> Self {
        match kind {
            PreprocessorKind::None => Preprocessor::None,
            PreprocessorKind::NamespaceExpanding => {
                Preprocessor::NamespaceExpanding(NamespaceExpander::default())
            }
        }
    }

    pub fn kind(&self) -> PreprocessorKind {
        match self {
            Preprocessor::None => PreprocessorKind::None,
            Preprocessor::NamespaceExpanding(_) => PreprocessorKind::NamespaceExpanding,
        }
    }

    pub fn can_preprocess(&self, message: &Message) -> bool {
        match self {
            Preprocessor::None => true,
            Preprocessor::NamespaceExpanding(p) => p.can_preprocess(message),
        }
    }

    pub fn preprocess(&self, message: Message) -> Vec<Message> {
        match self {
            Preprocessor::None => vec![message],
            Preprocessor::NamespaceExpanding(p) => p.preprocess(message),
        }
    }

    /// Preprocess when applicable, otherwise pass the message through.
    pub fn apply(&self, message: Message) -> Vec<Message> {
        if self.can_preprocess(&message) {
            self.preprocess(message)
        } else {
            vec![message]
        }
    }
}

/// Rewrites Sparkplug B topics into plain topic paths and fans out metrics.
#[derive(Debug, Clone, Default)]
pub struct NamespaceExpander {
    decoder: SparkplugDecoder,
}

impl NamespaceExpander {
    pub fn new(decoder: SparkplugDecoder) -> Self {
        Self { decoder }
    }

    pub fn can_preprocess(&self, message: &Message) -> bool {
        SparkplugTopic::parse(&message.topic).is_some()
    }

    pub fn preprocess(&self, message: Message) -> Vec<Message> {
        let parsed = SparkplugTopic::parse(&message.topic)
            .map(|topic| (expand_namespace(topic.group_id), capture_metadata(&topic)));
        let Some((base, captured)) = parsed else {
            return vec![message];
        };

        let mut metadata = message.metadata.clone();
        metadata.extend(captured);

        let Some(payload) = &message.payload else {
            return vec![Message {
                topic: base,
                metadata,
                ..message
            }];
        };

        match self.metrics(payload) {
            Ok(metrics) => metrics
                .iter()
                .map(|metric| {
                    let name = metric.get("name").and_then(Value::as_str).unwrap_or("");
                    Message {
                        topic: join_topic(&base, &expand_namespace(name)),
                        payload: Some(PayloadValue::from_text(&metric.to_string())),
                        received_at: message.received_at,
                        metadata: metadata.clone(),
                    }
                })
                .collect(),
            Err(error) => {
                tracing::error!(topic = %message.topic, "Failed to decode Sparkplug payload: {}", error);
                vec![Message {
                    topic: base,
                    metadata,
                    ..message
                }]
            }
        }
    }

    /// Decode and pull out the `metrics` array from the decoded JSON text.
    fn metrics(&self, payload: &PayloadValue) -> Result<Vec<Value>, String> {
        let decoded = self
            .decoder
            .decode(payload.as_bytes())
            .map_err(|e| e.to_string())?;
        let mut json: Value =
            serde_json::from_str(decoded.payload.to_text()).map_err(|e| e.to_string())?;
        match json.get_mut("metrics").map(Value::take) {
            Some(Value::Array(metrics)) => Ok(metrics),
            _ => Err("decoded payload has no metrics array".to_string()),
        }
    }
}

fn capture_metadata(topic: &SparkplugTopic<'_>) -> MessageMetadata {
    let mut metadata = MessageMetadata::new();
    metadata.insert(META_MESSAGE_TYPE.to_string(), topic.message_type.to_string());
    metadata.insert(META_NODE_ID.to_string(), topic.node_id.to_string());
    if let Some(device_id) = topic.device_id {
        metadata.insert(META_DEVICE_ID.to_string(), device_id.to_string());
    }
    metadata
}

/// `a::b:` -> `a/b`
pub fn expand_namespace(compact: &str) -> String {
    compact
        .split(':')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

fn join_topic(base: &str, suffix: &str) -> String {
    match (base.is_empty(), suffix.is_empty()) {
        (_, true) => base.to_string(),
        (true, false) => suffix.to_string(),
        (false, false) => format!("{}/{}", base, suffix),
    }
}
