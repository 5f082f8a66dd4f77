//! Event values and NDJSON event-line parsing.
//!
//! Implements tolerant reader pattern: unknown fields are ignored, but the
//! stream id and data array must be present.

use std::fmt;

use serde_json::Value as JsonValue;

use crate::error::{Error, Result};

/// One attribute value of an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Bool(bool),
    String(String),
    Null,
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::Null => f.write_str("null"),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

/// An event addressed to a stream, as read from one NDJSON line.
#[derive(Debug, Clone, PartialEq)]
pub struct EventLine {
    pub stream: String,
    pub data: Vec<Value>,
}

/// Parse a single NDJSON line of the form `{"stream": "...", "data": [...]}`.
pub fn parse_event_line(line: &str) -> Result<EventLine> {
    let raw: JsonValue = serde_json::from_str(line)?;

    let stream = raw
        .get("stream")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::EventParse("Missing 'stream' field".into()))?
        .to_string();

    let data = raw
        .get("data")
        .and_then(|v| v.as_array())
        .ok_or_else(|| Error::EventParse("Missing 'data' array".into()))?
        .iter()
        .map(json_to_value)
        .collect::<Result<Vec<_>>>()?;

    Ok(EventLine { stream, data })
}

fn json_to_value(raw: &JsonValue) -> Result<Value> {
    match raw {
        JsonValue::Null => Ok(Value::Null),
        JsonValue::Bool(b) => Ok(Value::Bool(*b)),
        JsonValue::String(s) => Ok(Value::String(s.clone())),
        JsonValue::Number(n) => n
            .as_i64()
            .map(Value::Long)
            .or_else(|| n.as_f64().map(Value::Double))
            .ok_or_else(|| Error::EventParse(format!("Number out of range: {n}"))),
        JsonValue::Array(_) | JsonValue::Object(_) => Err(Error::EventParse(format!(
            "Nested value not supported as attribute: {raw}"
        ))),
    }
}
