//! Sparkplug B wire model and topic namespace.
//!
//! Only the parts of the Sparkplug B protobuf schema needed to expand metric
//! payloads are modelled: scalar metric values. DataSet, Template, metadata and
//! property set fields are skipped by the decoder as unknown fields.
//!
//! Topic namespace:
//!
//! ```text
//! spBv1.0/<group>/N<TYPE>/<node>            node-level
//! spBv1.0/<group>/D<TYPE>/<node>/<device>   device-level
//! TYPE ∈ { DATA, CMD, DEATH, BIRTH }
//! ```

use serde_json::{json, Map, Value};

/// First topic segment of every Sparkplug B topic.
pub const NAMESPACE: &str = "spBv1.0";

const MESSAGE_TYPES: [&str; 4] = ["DATA", "CMD", "DEATH", "BIRTH"];

/// Top-level Sparkplug B payload.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Payload {
    #[prost(uint64, optional, tag = "1")]
    pub timestamp: Option<u64>,
    #[prost(message, repeated, tag = "2")]
    pub metrics: Vec<Metric>,
    #[prost(uint64, optional, tag = "3")]
    pub seq: Option<u64>,
    #[prost(string, optional, tag = "4")]
    pub uuid: Option<String>,
    #[prost(bytes = "vec", optional, tag = "5")]
    pub body: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Metric {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    #[prost(uint64, optional, tag = "2")]
    pub alias: Option<u64>,
    #[prost(uint64, optional, tag = "3")]
    pub timestamp: Option<u64>,
    #[prost(uint32, optional, tag = "4")]
    pub datatype: Option<u32>,
    #[prost(bool, optional, tag = "5")]
    pub is_historical: Option<bool>,
    #[prost(bool, optional, tag = "6")]
    pub is_transient: Option<bool>,
    #[prost(bool, optional, tag = "7")]
    pub is_null: Option<bool>,
    #[prost(oneof = "metric::Value", tags = "10, 11, 12, 13, 14, 15, 16")]
    pub value: Option<metric::Value>,
}

pub mod metric {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Value {
        #[prost(uint32, tag = "10")]
        IntValue(u32),
        #[prost(uint64, tag = "11")]
        LongValue(u64),
        #[prost(float, tag = "12")]
        FloatValue(f32),
        #[prost(double, tag = "13")]
        DoubleValue(f64),
        #[prost(bool, tag = "14")]
        BooleanValue(bool),
        #[prost(string, tag = "15")]
        StringValue(String),
        #[prost(bytes = "vec", tag = "16")]
        BytesValue(Vec<u8>),
    }
}

/// Sparkplug B datatype codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum DataType {
    Unknown = 0,
    Int8 = 1,
    Int16 = 2,
    Int32 = 3,
    Int64 = 4,
    UInt8 = 5,
    UInt16 = 6,
    UInt32 = 7,
    UInt64 = 8,
    Float = 9,
    Double = 10,
    Boolean = 11,
    String = 12,
    DateTime = 13,
    Text = 14,
    Uuid = 15,
    DataSet = 16,
    Bytes = 17,
    File = 18,
    Template = 19,
}

impl DataType {
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => DataType::Int8,
            2 => DataType::Int16,
            3 => DataType::Int32,
            4 => DataType::Int64,
            5 => DataType::UInt8,
            6 => DataType::UInt16,
            7 => DataType::UInt32,
            8 => DataType::UInt64,
            9 => DataType::Float,
            10 => DataType::Double,
            11 => DataType::Boolean,
            12 => DataType::String,
            13 => DataType::DateTime,
            14 => DataType::Text,
            15 => DataType::Uuid,
            16 => DataType::DataSet,
            17 => DataType::Bytes,
            18 => DataType::File,
            19 => DataType::Template,
            _ => DataType::Unknown,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DataType::Unknown => "Unknown",
            DataType::Int8 => "Int8",
            DataType::Int16 => "Int16",
            DataType::Int32 => "Int32",
            DataType::Int64 => "Int64",
            DataType::UInt8 => "UInt8",
            DataType::UInt16 => "UInt16",
            DataType::UInt32 => "UInt32",
            DataType::UInt64 => "UInt64",
            DataType::Float => "Float",
            DataType::Double => "Double",
            DataType::Boolean => "Boolean",
            DataType::String => "String",
            DataType::DateTime => "DateTime",
            DataType::Text => "Text",
            DataType::Uuid => "UUID",
            DataType::DataSet => "DataSet",
            DataType::Bytes => "Bytes",
            DataType::File => "File",
            DataType::Template => "Template",
        }
    }
}

impl Payload {
    /// JSON rendering used as the canonical decoded form.
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        if let Some(ts) = self.timestamp {
            out.insert("timestamp".into(), json!(ts));
        }
        out.insert(
            "metrics".into(),
            Value::Array(self.metrics.iter().map(Metric::to_json).collect()),
        );
        if let Some(seq) = self.seq {
            out.insert("seq".into(), json!(seq));
        }
        if let Some(uuid) = &self.uuid {
            out.insert("uuid".into(), json!(uuid));
        }
        if let Some(body) = &self.body {
            out.insert("body".into(), json!(body));
        }
        Value::Object(out)
    }
}

impl Metric {
    pub fn data_type(&self) -> DataType {
        DataType::from_code(self.datatype.unwrap_or(0))
    }

    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        if let Some(name) = &self.name {
            out.insert("name".into(), json!(name));
        }
        if let Some(alias) = self.alias {
            out.insert("alias".into(), json!(alias));
        }
        if let Some(ts) = self.timestamp {
            out.insert("timestamp".into(), json!(ts));
        }
        out.insert("type".into(), json!(self.data_type().name()));
        if let Some(value) = self.json_value() {
            out.insert("value".into(), value);
        }
        if let Some(flag) = self.is_historical {
            out.insert("isHistorical".into(), json!(flag));
        }
        if let Some(flag) = self.is_transient {
            out.insert("isTransient".into(), json!(flag));
        }
        if let Some(flag) = self.is_null {
            out.insert("isNull".into(), json!(flag));
        }
        Value::Object(out)
    }

    /// Metric value with signed datatypes sign-extended from their wire form.
    fn json_value(&self) -> Option<Value> {
        use metric::Value as V;
        let value = match self.value.as_ref()? {
            V::IntValue(v) => match self.data_type() {
                DataType::Int8 => json!(*v as u8 as i8),
                DataType::Int16 => json!(*v as u16 as i16),
                DataType::Int32 => json!(*v as i32),
                _ => json!(v),
            },
            V::LongValue(v) => match self.data_type() {
                DataType::Int64 => json!(*v as i64),
                _ => json!(v),
            },
            V::FloatValue(v) => json!(*v as f64),
            V::DoubleValue(v) => json!(v),
            V::BooleanValue(v) => json!(v),
            V::StringValue(v) => json!(v),
            V::BytesValue(v) => json!(v),
        };
        Some(value)
    }
}

/// Whether a topic names a node- or a device-level Sparkplug message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicScope {
    Node,
    Device,
}

/// A parsed Sparkplug B topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SparkplugTopic<'a> {
    pub group_id: &'a str,
    pub scope: TopicScope,
    /// `DATA`, `CMD`, `DEATH` or `BIRTH`.
    pub message_type: &'a str,
    pub node_id: &'a str,
    pub device_id: Option<&'a str>,
}

impl<'a> SparkplugTopic<'a> {
    /// Strict parse: node-level topics have exactly four segments, device-level
    /// topics exactly five.
    pub fn parse(topic: &'a str) -> Option<Self> {
        let parsed = Self::parse_loose(topic)?;
        match (parsed.scope, parsed.device_id) {
            (TopicScope::Node, None) | (TopicScope::Device, Some(_)) => Some(parsed),
            _ => None,
        }
    }

    /// Loose parse: either scope may carry an optional device segment.
    pub fn parse_loose(topic: &'a str) -> Option<Self> {
        let segments: Vec<&str> = topic.split('/').collect();
        if !(4..=5).contains(&segments.len()) || segments.iter().any(|s| s.is_empty()) {
            return None;
        }
        if segments[0] != NAMESPACE {
            return None;
        }

        let kind = segments[2];
        let scope = match kind.as_bytes().first() {
            Some(b'N') => TopicScope::Node,
            Some(b'D') => TopicScope::Device,
            _ => return None,
        };
        let message_type = &kind[1..];
        if !MESSAGE_TYPES.contains(&message_type) {
            return None;
        }

        Some(Self {
            group_id: segments[1],
            scope,
            message_type,
            node_id: segments[3],
            device_id: segments.get(4).copied(),
        })
    }
}
