use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// A value exchanged with the database.
///
/// Accessors never fail; they return `None` when the active variant has no
/// sensible conversion to the requested type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Float(f32),
    Double(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Blob(Vec<u8>),
    /// Untyped bytes, reinterpreted on demand by the accessors.
    Raw(Vec<u8>),
    Null,
}

/// The first `N` bytes of `bytes`, if there are that many.
fn leading<const N: usize>(bytes: &[u8]) -> Option<[u8; N]> {
    bytes.get(..N)?.try_into().ok()
}

impl Value {
    pub fn integer(&self) -> Option<i64> {
        match self {
            Value::Integer(value) => Some(*value),
            Value::Float(value) => value.is_finite().then(|| *value as i64),
            Value::Double(value) => value.is_finite().then(|| *value as i64),
            Value::Text(text) => text.parse().ok(),
            Value::Raw(bytes) => leading(bytes).map(i64::from_ne_bytes),
            Value::Timestamp(_) | Value::Blob(_) | Value::Null => None,
        }
    }

    pub fn float(&self) -> Option<f32> {
        match self {
            Value::Integer(value) => Some(*value as f32),
            Value::Float(value) => Some(*value),
            Value::Double(value) => Some(*value as f32),
            Value::Text(text) => text.parse().ok(),
            Value::Raw(bytes) => leading(bytes).map(f32::from_ne_bytes),
            Value::Timestamp(_) | Value::Blob(_) | Value::Null => None,
        }
    }

    pub fn double(&self) -> Option<f64> {
        match self {
            Value::Integer(value) => Some(*value as f64),
            Value::Float(value) => Some(f64::from(*value)),
            Value::Double(value) => Some(*value),
            Value::Text(text) => text.parse().ok(),
            Value::Raw(bytes) => leading(bytes).map(f64::from_ne_bytes),
            Value::Timestamp(_) | Value::Blob(_) | Value::Null => None,
        }
    }

    /// Textual form of scalar values. Raw bytes are read as UTF-8.
    pub fn string(&self) -> Option<String> {
        match self {
            Value::Integer(value) => Some(value.to_string()),
            Value::Float(value) => Some(value.to_string()),
            Value::Double(value) => Some(value.to_string()),
            Value::Text(text) => Some(text.clone()),
            Value::Raw(bytes) => String::from_utf8(bytes.clone()).ok(),
            Value::Timestamp(_) | Value::Blob(_) | Value::Null => None,
        }
    }

    /// `0` is false, `1` and `-1` are true, anything else has no boolean
    /// reading.
    pub fn bool(&self) -> Option<bool> {
        match self.integer() {
            Some(0) => Some(false),
            Some(1 | -1) => Some(true),
            _ => None,
        }
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(stamp) => Some(*stamp),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::Double(value) => write!(f, "{value}"),
            Value::Text(text) => write!(f, "\"{text}\""),
            Value::Timestamp(stamp) => write!(f, "{}", stamp.to_rfc3339()),
            Value::Blob(bytes) | Value::Raw(bytes) => write!(f, "<{} bytes>", bytes.len()),
            Value::Null => f.write_str("null"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Integer(value) => serializer.serialize_i64(*value),
            Value::Float(value) => serializer.serialize_f32(*value),
            Value::Double(value) => serializer.serialize_f64(*value),
            Value::Text(text) => serializer.serialize_str(text),
            Value::Timestamp(stamp) => stamp.serialize(serializer),
            Value::Blob(bytes) | Value::Raw(bytes) => serializer.serialize_bytes(bytes),
            Value::Null => serializer.serialize_none(),
        }
    }
}
