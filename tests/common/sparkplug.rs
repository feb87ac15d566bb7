//! Sparkplug B payload helpers

use prost::Message as _;
use topic_tree::pipeline::sparkplug::{metric, DataType, Metric, Payload};

pub fn int_metric(name: &str, value: i32) -> Metric {
    Metric {
        name: Some(name.to_string()),
        datatype: Some(DataType::Int32 as u32),
        value: Some(metric::Value::IntValue(value as u32)),
        ..Default::default()
    }
}

pub fn double_metric(name: &str, value: f64) -> Metric {
    Metric {
        name: Some(name.to_string()),
        datatype: Some(DataType::Double as u32),
        value: Some(metric::Value::DoubleValue(value)),
        ..Default::default()
    }
}

pub fn string_metric(name: &str, value: &str) -> Metric {
    Metric {
        name: Some(name.to_string()),
        datatype: Some(DataType::String as u32),
        value: Some(metric::Value::StringValue(value.to_string())),
        ..Default::default()
    }
}

/// Encoded Sparkplug payload carrying `metrics`
pub fn encode(metrics: Vec<Metric>) -> Vec<u8> {
    Payload {
        timestamp: Some(1_700_000_000_000),
        seq: Some(0),
        metrics,
        ..Default::default()
    }
    .encode_to_vec()
}
