//! Trait for converting from SQL values to Rust types.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::TypeError;
use crate::value::Value;

/// Trait for types that can be extracted from a [`Value`].
///
/// Implemented for common Rust types so rows from any driver can be read
/// with type-safe getters.
pub trait FromValue: Sized {
    /// Convert from a SQL value to this type.
    fn from_value(value: &Value) -> Result<Self, TypeError>;

    /// Convert from an optional SQL value.
    ///
    /// Returns `None` if the value is NULL.
    fn from_value_nullable(value: &Value) -> Result<Option<Self>, TypeError> {
        if value.is_null() {
            Ok(None)
        } else {
            Self::from_value(value).map(Some)
        }
    }
}

fn mismatch(expected: &'static str, value: &Value) -> TypeError {
    if value.is_null() {
        TypeError::UnexpectedNull
    } else {
        TypeError::TypeMismatch {
            expected,
            actual: value.type_name().to_string(),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, TypeError> {
        value.as_bool().ok_or_else(|| mismatch("bool", value))
    }
}

impl FromValue for i16 {
    fn from_value(value: &Value) -> Result<Self, TypeError> {
        match value {
            Value::SmallInt(v) => Ok(*v),
            Value::Int(v) => i16::try_from(*v).map_err(|_| TypeError::OutOfRange {
                target_type: "i16",
            }),
            Value::BigInt(v) => i16::try_from(*v).map_err(|_| TypeError::OutOfRange {
                target_type: "i16",
            }),
            _ => Err(mismatch("i16", value)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self, TypeError> {
        match value {
            Value::Int(v) => Ok(*v),
            Value::SmallInt(v) => Ok(i32::from(*v)),
            Value::BigInt(v) => i32::try_from(*v).map_err(|_| TypeError::OutOfRange {
                target_type: "i32",
            }),
            _ => Err(mismatch("i32", value)),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self, TypeError> {
        value.as_i64().ok_or_else(|| mismatch("i64", value))
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> Result<Self, TypeError> {
        match value {
            Value::Real(v) => Ok(*v),
            _ => Err(mismatch("f32", value)),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, TypeError> {
        value.as_f64().ok_or_else(|| mismatch("f64", value))
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, TypeError> {
        value
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| mismatch("String", value))
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self, TypeError> {
        value
            .as_bytes()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| mismatch("Vec<u8>", value))
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> Result<Self, TypeError> {
        match value {
            Value::Json(v) => Ok(v.clone()),
            Value::Text(s) => serde_json::from_str(s)
                .map_err(|e| TypeError::InvalidJson(e.to_string())),
            _ => Err(mismatch("serde_json::Value", value)),
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: &Value) -> Result<Self, TypeError> {
        match value {
            Value::Date(v) => Ok(*v),
            _ => Err(mismatch("NaiveDate", value)),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: &Value) -> Result<Self, TypeError> {
        match value {
            Value::Timestamp(v) => Ok(*v),
            Value::TimestampTz(v) => Ok(v.naive_utc()),
            _ => Err(mismatch("NaiveDateTime", value)),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: &Value) -> Result<Self, TypeError> {
        match value {
            Value::TimestampTz(v) => Ok(*v),
            Value::Timestamp(v) => Ok(v.and_utc()),
            _ => Err(mismatch("DateTime<Utc>", value)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, TypeError> {
        T::from_value_nullable(value)
    }
}
