//! SQL value representation.

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// A SQL value exchanged with the driver, either as a bound parameter or
/// as a decoded result column.
///
/// The variants cover the PostgreSQL types the drivers know how to bind and
/// decode. `NUMERIC` travels as text so no precision is lost.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// NULL value.
    #[default]
    Null,
    /// Boolean value (BOOL).
    Bool(bool),
    /// 16-bit signed integer (INT2).
    SmallInt(i16),
    /// 32-bit signed integer (INT4).
    Int(i32),
    /// 64-bit signed integer (INT8).
    BigInt(i64),
    /// 32-bit floating point (FLOAT4).
    Real(f32),
    /// 64-bit floating point (FLOAT8).
    Double(f64),
    /// Arbitrary precision number in its textual form (NUMERIC).
    Numeric(String),
    /// String value (TEXT, VARCHAR, BPCHAR, NAME).
    Text(String),
    /// Binary value (BYTEA).
    Bytes(Bytes),
    /// JSON document (JSON, JSONB).
    Json(serde_json::Value),
    /// Date value (DATE).
    Date(NaiveDate),
    /// Timestamp without time zone (TIMESTAMP).
    Timestamp(NaiveDateTime),
    /// Timestamp with time zone (TIMESTAMPTZ).
    TimestampTz(DateTime<Utc>),
}

impl Value {
    /// Check if the value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the value as a bool, if it is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the value as an i64, widening smaller integers.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::BigInt(v) => Some(*v),
            Self::Int(v) => Some(i64::from(*v)),
            Self::SmallInt(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    /// Get the value as an f64, widening REAL.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            Self::Real(v) => Some(f64::from(*v)),
            _ => None,
        }
    }

    /// Get the value as a string slice, if it is textual.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) | Self::Numeric(v) => Some(v),
            _ => None,
        }
    }

    /// Get the value as bytes, if it is binary.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(v) => Some(v),
            _ => None,
        }
    }

    /// Get the PostgreSQL type name for this value.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Bool(_) => "BOOL",
            Self::SmallInt(_) => "INT2",
            Self::Int(_) => "INT4",
            Self::BigInt(_) => "INT8",
            Self::Real(_) => "FLOAT4",
            Self::Double(_) => "FLOAT8",
            Self::Numeric(_) => "NUMERIC",
            Self::Text(_) => "TEXT",
            Self::Bytes(_) => "BYTEA",
            Self::Json(_) => "JSONB",
            Self::Date(_) => "DATE",
            Self::Timestamp(_) => "TIMESTAMP",
            Self::TimestampTz(_) => "TIMESTAMPTZ",
        }
    }

    /// Render the value as a JSON value.
    ///
    /// Binary data is rendered as an array of bytes and timestamps use
    /// RFC 3339.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Self::Null => Json::Null,
            Self::Bool(v) => Json::Bool(*v),
            Self::SmallInt(v) => Json::from(*v),
            Self::Int(v) => Json::from(*v),
            Self::BigInt(v) => Json::from(*v),
            Self::Real(v) => Json::from(f64::from(*v)),
            Self::Double(v) => Json::from(*v),
            Self::Numeric(v) | Self::Text(v) => Json::String(v.clone()),
            Self::Bytes(v) => Json::from(v.to_vec()),
            Self::Json(v) => v.clone(),
            Self::Date(v) => Json::String(v.to_string()),
            Self::Timestamp(v) => Json::String(v.to_string()),
            Self::TimestampTz(v) => Json::String(v.to_rfc3339()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Self::SmallInt(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::BigInt(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Real(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(v))
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Self::Bytes(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Self::Timestamp(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::TimestampTz(v)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Self::Null,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_widening() {
        assert_eq!(Value::SmallInt(7).as_i64(), Some(7));
        assert_eq!(Value::Int(-3).as_i64(), Some(-3));
        assert_eq!(Value::Text("7".into()).as_i64(), None);
    }

    #[test]
    fn test_option_into_value() {
        let none: Option<i32> = None;
        assert!(Value::from(none).is_null());
        assert_eq!(Value::from(Some("x")), Value::Text("x".into()));
    }

    #[test]
    fn test_to_json() {
        assert_eq!(Value::BigInt(42).to_json(), serde_json::json!(42));
        assert_eq!(
            Value::Numeric("1.50".into()).to_json(),
            serde_json::json!("1.50")
        );
        assert_eq!(Value::Null.to_json(), serde_json::Value::Null);
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Json(serde_json::json!({})).type_name(), "JSONB");
        assert_eq!(Value::Bytes(Bytes::new()).type_name(), "BYTEA");
    }
}
