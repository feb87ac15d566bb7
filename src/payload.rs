//! Canonical payload value
//!
//! [`PayloadValue`] owns the raw bytes of a message payload and derives its
//! renderings on demand:
//!
//! - **raw**: UTF-8 text (lossy decode for non-UTF-8 input)
//! - **json**: pretty-printed JSON after the 64-bit split integer fixup
//! - **hex**: `0xAB` byte dump, space separated
//!
//! Only the byte form is significant. Equality compares bytes, and the only
//! durable representation is the `{ "base64Message": "..." }` record.
//!
//! # 64-bit split integers
//!
//! Some protobuf toolchains render 64-bit integers as
//! `{ "low": i32, "high": i32, "unsigned": bool }`. [`fix_64bit_values`] folds
//! every object of that shape back into `low + high * 2^32`, at any depth.

use crate::error::{Result, TopicTreeError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;
use std::sync::OnceLock;

const TWO_POW_32: i128 = 1 << 32;

/// Rendering mode for [`PayloadValue::format`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    #[default]
    Raw,
    Json,
    Hex,
}

/// Syntax hint returned alongside a rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    Json,
}

/// Serialized form of a payload: the raw bytes, base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadRecord {
    #[serde(rename = "base64Message")]
    pub base64_message: String,
}

/// Immutable wrapper around an opaque byte payload.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "PayloadRecord", into = "PayloadRecord")]
pub struct PayloadValue {
    bytes: Vec<u8>,
    /// Lazily decoded text, never part of identity.
    text: OnceLock<String>,
}

impl PayloadValue {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            text: OnceLock::new(),
        }
    }

    /// Store `text` in its canonical (UTF-8) byte form.
    pub fn from_text(text: &str) -> Self {
        let value = Self::from_bytes(text.as_bytes().to_vec());
        let _ = value.text.set(text.to_string());
        value
    }

    /// Rebuild a payload from a loosely typed record such as `{"base64Message": "..."}`.
    ///
    /// This is the only constructor that fails: a malformed record indicates an
    /// integration error rather than bad publisher data.
    pub fn from_record(record: &Value) -> Result<Self> {
        let encoded = record
            .get("base64Message")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                TopicTreeError::MalformedRecord(
                    "expected a string field `base64Message`".to_string(),
                )
            })?;
        Self::from_base64(encoded)
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        STANDARD
            .decode(encoded)
            .map(Self::from_bytes)
            .map_err(|e| TopicTreeError::MalformedRecord(format!("invalid base64: {}", e)))
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    pub fn to_record(&self) -> PayloadRecord {
        PayloadRecord {
            base64_message: self.to_base64(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.bytes.clone()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Text rendering of the payload, decoded once and memoized.
    pub fn to_text(&self) -> &str {
        self.text
            .get_or_init(|| String::from_utf8_lossy(&self.bytes).into_owned())
    }

    /// Render the payload in the requested mode.
    ///
    /// JSON rendering silently falls back to raw text when the payload does
    /// not parse.
    pub fn format(&self, mode: PayloadFormat) -> (String, Option<Syntax>) {
        match mode {
            PayloadFormat::Raw => (self.to_text().to_string(), None),
            PayloadFormat::Hex => (self.to_hex(), None),
            PayloadFormat::Json => match serde_json::from_str::<Value>(self.to_text()) {
                Ok(json) => {
                    let fixed = fix_64bit_values(json);
                    match serde_json::to_string_pretty(&fixed) {
                        Ok(pretty) => (pretty, Some(Syntax::Json)),
                        Err(_) => (self.to_text().to_string(), None),
                    }
                }
                Err(_) => (self.to_text().to_string(), None),
            },
        }
    }

    pub fn to_hex(&self) -> String {
        self.bytes
            .iter()
            .map(|b| format!("0x{:02X}", b))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn to_data_uri(&self, mime_type: &str) -> String {
        format!("data:{};base64,{}", mime_type, self.to_base64())
    }
}

impl PartialEq for PayloadValue {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for PayloadValue {}

impl fmt::Debug for PayloadValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadValue")
            .field("len", &self.bytes.len())
            .field("base64", &self.to_base64())
            .finish()
    }
}

impl From<Vec<u8>> for PayloadValue {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_bytes(bytes)
    }
}

impl TryFrom<PayloadRecord> for PayloadValue {
    type Error = TopicTreeError;

    fn try_from(record: PayloadRecord) -> Result<Self> {
        Self::from_base64(&record.base64_message)
    }
}

impl From<PayloadValue> for PayloadRecord {
    fn from(value: PayloadValue) -> Self {
        value.to_record()
    }
}

/// Fold every `{low, high, unsigned}` object into a single number, recursively.
pub fn fix_64bit_values(value: Value) -> Value {
    match value {
        Value::Object(map) => match split_integer(&map) {
            Some(number) => Value::Number(number),
            None => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, fix_64bit_values(v)))
                    .collect(),
            ),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(fix_64bit_values).collect()),
        scalar => scalar,
    }
}

fn split_integer(map: &Map<String, Value>) -> Option<Number> {
    let low = map.get("low")?;
    let high = map.get("high")?;
    if !low.is_number() || !high.is_number() || !map.get("unsigned")?.is_boolean() {
        return None;
    }

    if let (Some(low), Some(high)) = (low.as_i64(), high.as_i64()) {
        let combined = low as i128 + high as i128 * TWO_POW_32;
        if let Ok(v) = i64::try_from(combined) {
            return Some(v.into());
        }
        if let Ok(v) = u64::try_from(combined) {
            return Some(v.into());
        }
    }

    let low = low.as_f64()?;
    let high = high.as_f64()?;
    Number::from_f64(low + high * TWO_POW_32 as f64)
}
