//! Topic-addressed payload decoders.
//!
//! Decoders are selected by matching the topic, never by sniffing the payload.
//! The registry consults its decoders in registration order and falls back to
//! [`PassthroughDecoder`], which wraps the bytes verbatim.
//!
//! Like the pipeline's node dispatch, the set of decoders is closed:
//! [`BuiltinDecoder`] is an enum and every call is a plain `match`.

use crate::payload::PayloadValue;
use crate::pipeline::error::{DecodeError, DecodeResult};
use crate::pipeline::sparkplug::{self, SparkplugTopic};
use crate::types::Message;
use prost::Message as _;
use serde::{Deserialize, Serialize};

/// Tag identifying which decoder produced a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DecoderKind {
    /// No interpretation (passthrough, or a failed decode).
    #[default]
    None,
    Sparkplug,
}

/// Successful decode output.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPayload {
    pub payload: PayloadValue,
    pub decoder: DecoderKind,
}

/// Decodes Sparkplug B protobuf payloads into their JSON rendering.
#[derive(Debug, Clone, Copy, Default)]
pub struct SparkplugDecoder;

impl SparkplugDecoder {
    pub fn formats(&self) -> &'static [&'static str] {
        &["Sparkplug"]
    }

    pub fn can_decode_topic(&self, topic: &str) -> bool {
        SparkplugTopic::parse_loose(topic).is_some()
    }

    /// Decode into the structured protobuf model.
    pub fn decode_payload(&self, bytes: &[u8]) -> DecodeResult<sparkplug::Payload> {
        sparkplug::Payload::decode(bytes).map_err(|e| {
            tracing::error!("Failed to decode Sparkplug payload: {}", e);
            DecodeError::new("Failed to decode Sparkplug payload")
        })
    }

    pub fn decode(&self, bytes: &[u8]) -> DecodeResult<DecodedPayload> {
        let payload = self.decode_payload(bytes)?;
        let text = serde_json::to_string(&payload.to_json())
            .map_err(|e| DecodeError::new(format!("Failed to render Sparkplug payload: {}", e)))?;
        Ok(DecodedPayload {
            payload: PayloadValue::from_text(&text),
            decoder: DecoderKind::Sparkplug,
        })
    }
}

/// Wraps bytes without interpretation. Matches every topic.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughDecoder;

impl PassthroughDecoder {
    pub fn formats(&self) -> &'static [&'static str] {
        &[]
    }

    pub fn can_decode_topic(&self, _topic: &str) -> bool {
        true
    }

    pub fn decode(&self, bytes: &[u8]) -> DecodeResult<DecodedPayload> {
        Ok(DecodedPayload {
            payload: PayloadValue::from_bytes(bytes.to_vec()),
            decoder: DecoderKind::None,
        })
    }
}

/// Enum dispatch over the built-in decoders.
#[derive(Debug, Clone, Copy)]
pub enum BuiltinDecoder {
    Sparkplug(SparkplugDecoder),
    Passthrough(PassthroughDecoder),
}

impl BuiltinDecoder {
    pub fn formats(&self) -> &'static [&'static str] {
        match self {
            BuiltinDecoder::Sparkplug(d) => d.formats(),
            BuiltinDecoder::Passthrough(d) => d.formats(),
        }
    }

    pub fn can_decode_topic(&self, topic: &str) -> bool {
        match self {
            BuiltinDecoder::Sparkplug(d) => d.can_decode_topic(topic),
            BuiltinDecoder::Passthrough(d) => d.can_decode_topic(topic),
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> DecodeResult<DecodedPayload> {
        match self {
            BuiltinDecoder::Sparkplug(d) => d.decode(bytes),
            BuiltinDecoder::Passthrough(d) => d.decode(bytes),
        }
    }

    pub fn kind(&self) -> DecoderKind {
        match self {
            BuiltinDecoder::Sparkplug(_) => DecoderKind::Sparkplug,
            BuiltinDecoder::Passthrough(_) => DecoderKind::None,
        }
    }
}

/// Ordered list of decoders with a passthrough fallback.
#[derive(Debug, Clone)]
pub struct DecoderRegistry {
    decoders: Vec<BuiltinDecoder>,
    fallback: BuiltinDecoder,
}

impl Default for DecoderRegistry {
    /// Registry with all built-in decoders registered.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(BuiltinDecoder::Sparkplug(SparkplugDecoder));
        registry
    }
}

impl DecoderRegistry {
    /// Registry with only the passthrough fallback.
    pub fn empty() -> Self {
        Self {
            decoders: Vec::new(),
            fallback: BuiltinDecoder::Passthrough(PassthroughDecoder),
        }
    }

    pub fn register(&mut self, decoder: BuiltinDecoder) {
        self.decoders.push(decoder);
    }

    /// First registered decoder matching `topic`, or the passthrough fallback.
    pub fn decoder_for_topic(&self, topic: &str) -> &BuiltinDecoder {
        self.decoders
            .iter()
            .find(|d| d.can_decode_topic(topic))
            .unwrap_or(&self.fallback)
    }

    pub fn decode(&self, topic: &str, payload: &PayloadValue) -> DecodeResult<DecodedPayload> {
        self.decoder_for_topic(topic).decode(payload.as_bytes())
    }

    /// Decode a message's payload. `None` when the message carries no payload.
    pub fn decode_message(&self, message: &Message) -> Option<DecodeResult<DecodedPayload>> {
        message
            .payload
            .as_ref()
            .map(|payload| self.decode(&message.topic, payload))
    }

    /// All format labels offered by the registered decoders.
    pub fn formats(&self) -> Vec<&'static str> {
        self.decoders.iter().flat_map(|d| d.formats()).copied().collect()
    }
}
