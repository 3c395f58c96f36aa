//! Conversion between [`Value`] and the PostgreSQL binary format.

use std::error::Error as StdError;
use std::fmt::Write as _;

use bytes::BytesMut;
use lambda_pg_types::{DriverError, Value};
use tokio_postgres::Row;
use tokio_postgres::types::{FromSql, IsNull, ToSql, Type, to_sql_checked};

type BoxError = Box<dyn StdError + Sync + Send>;

/// A borrowed [`Value`] bound as a statement parameter.
///
/// Integers and floats are narrowed or widened to the parameter type the
/// server inferred; every other value must match it. `NUMERIC` values travel
/// as text, so bind them to a text parameter (`$1::text::numeric`).
#[derive(Debug)]
pub struct PgParam<'a>(pub &'a Value);

impl ToSql for PgParam<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self.0 {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => b.to_sql_checked(ty, out),
            Value::SmallInt(i) => int_to_sql(i64::from(*i), ty, out),
            Value::Int(i) => int_to_sql(i64::from(*i), ty, out),
            Value::BigInt(i) => int_to_sql(*i, ty, out),
            Value::Real(f) => match *ty {
                Type::FLOAT8 => f64::from(*f).to_sql_checked(ty, out),
                _ => f.to_sql_checked(ty, out),
            },
            Value::Double(f) => match *ty {
                Type::FLOAT4 => (*f as f32).to_sql_checked(ty, out),
                _ => f.to_sql_checked(ty, out),
            },
            Value::Numeric(s) | Value::Text(s) => s.to_sql_checked(ty, out),
            Value::Bytes(b) => {
                let slice: &[u8] = b.as_ref();
                slice.to_sql_checked(ty, out)
            }
            Value::Json(j) => j.to_sql_checked(ty, out),
            Value::Date(d) => d.to_sql_checked(ty, out),
            Value::Timestamp(t) => t.to_sql_checked(ty, out),
            Value::TimestampTz(t) => t.to_sql_checked(ty, out),
        }
    }

    // Each variant checks its own target type.
    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn int_to_sql(value: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => i16::try_from(value)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(value)?.to_sql(ty, out),
        _ => value.to_sql_checked(ty, out),
    }
}

/// `NUMERIC` decoded into its exact decimal text.
struct NumericText(String);

impl<'a> FromSql<'a> for NumericText {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        numeric_to_string(raw).map(Self)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Render a binary `NUMERIC` (base-10000 digits) as decimal text.
fn numeric_to_string(raw: &[u8]) -> Result<String, BoxError> {
    let word = |at: usize| -> Result<[u8; 2], BoxError> {
        raw.get(at..at + 2)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| "truncated numeric value".into())
    };
    let ndigits = usize::try_from(i16::from_be_bytes(word(0)?))?;
    let weight = i32::from(i16::from_be_bytes(word(2)?));
    let sign = u16::from_be_bytes(word(4)?);
    let dscale = usize::from(u16::from_be_bytes(word(6)?));

    let digits = (0..ndigits)
        .map(|i| word(8 + 2 * i).map(i16::from_be_bytes))
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = String::new();
    match sign {
        NUMERIC_NAN => return Ok("NaN".into()),
        NUMERIC_PINF => return Ok("Infinity".into()),
        NUMERIC_NINF => return Ok("-Infinity".into()),
        NUMERIC_NEG => out.push('-'),
        NUMERIC_POS => {}
        other => return Err(format!("invalid numeric sign 0x{other:04x}").into()),
    }

    let digit = |index: i32| -> i16 {
        usize::try_from(index)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    if weight < 0 {
        out.push('0');
    } else {
        for i in 0..=weight {
            if i == 0 {
                write!(out, "{}", digit(i))?;
            } else {
                write!(out, "{:04}", digit(i))?;
            }
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut index = weight + 1;
        while fraction.len() < dscale {
            write!(fraction, "{:04}", digit(index))?;
            index += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }
    Ok(out)
}

fn get<'a, T: FromSql<'a>>(row: &'a Row, index: usize) -> Result<Option<T>, DriverError> {
    row.try_get::<_, Option<T>>(index)
        .map_err(|e| DriverError::Backend(Box::new(e)))
}

/// Decode every column of a row.
pub(crate) fn decode_row(row: &Row) -> Result<Vec<Value>, DriverError> {
    (0..row.len()).map(|i| decode_column(row, i)).collect()
}

fn decode_column(row: &Row, index: usize) -> Result<Value, DriverError> {
    let ty = row.columns()[index].type_();
    let value = match *ty {
        Type::BOOL => get::<bool>(row, index)?.map(Value::Bool),
        Type::INT2 => get::<i16>(row, index)?.map(Value::SmallInt),
        Type::INT4 => get::<i32>(row, index)?.map(Value::Int),
        Type::INT8 => get::<i64>(row, index)?.map(Value::BigInt),
        Type::FLOAT4 => get::<f32>(row, index)?.map(Value::Real),
        Type::FLOAT8 => get::<f64>(row, index)?.map(Value::Double),
        Type::NUMERIC => get::<NumericText>(row, index)?.map(|n| Value::Numeric(n.0)),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            get::<String>(row, index)?.map(Value::Text)
        }
        Type::BYTEA => get::<Vec<u8>>(row, index)?.map(Value::from),
        Type::JSON | Type::JSONB => get::<serde_json::Value>(row, index)?.map(Value::Json),
        Type::DATE => get::<chrono::NaiveDate>(row, index)?.map(Value::Date),
        Type::TIMESTAMP => get::<chrono::NaiveDateTime>(row, index)?.map(Value::Timestamp),
        Type::TIMESTAMPTZ => {
            get::<chrono::DateTime<chrono::Utc>>(row, index)?.map(Value::TimestampTz)
        }
        _ => {
            return Err(DriverError::Backend(
                format!(
                    "unsupported type {} for column {}",
                    ty.name(),
                    row.columns()[index].name()
                )
                .into(),
            ));
        }
    };
    Ok(value.unwrap_or(Value::Null))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn numeric(ndigits: i16, weight: i16, sign: u16, dscale: u16, digits: &[i16]) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&ndigits.to_be_bytes());
        raw.extend_from_slice(&weight.to_be_bytes());
        raw.extend_from_slice(&sign.to_be_bytes());
        raw.extend_from_slice(&dscale.to_be_bytes());
        for d in digits {
            raw.extend_from_slice(&d.to_be_bytes());
        }
        raw
    }

    #[test]
    fn test_numeric_to_string() {
        let cases: &[(Vec<u8>, &str)] = &[
            (numeric(2, 0, NUMERIC_POS, 2, &[123, 4500]), "123.45"),
            (numeric(2, 1, NUMERIC_POS, 0, &[1234, 5678]), "12345678"),
            (numeric(1, 1, NUMERIC_POS, 0, &[1]), "10000"),
            (numeric(1, -1, NUMERIC_POS, 4, &[12]), "0.0012"),
            (numeric(1, -2, NUMERIC_POS, 5, &[1000]), "0.00001"),
            (numeric(1, 0, NUMERIC_NEG, 0, &[5]), "-5"),
            (numeric(0, 0, NUMERIC_POS, 0, &[]), "0"),
            (numeric(0, 0, NUMERIC_POS, 2, &[]), "0.00"),
            (numeric(0, 0, NUMERIC_NAN, 0, &[]), "NaN"),
        ];
        for (raw, expected) in cases {
            assert_eq!(numeric_to_string(raw).unwrap(), *expected);
        }
    }

    #[test]
    fn test_numeric_rejects_truncated_input() {
        assert!(numeric_to_string(&[0, 1]).is_err());
        assert!(numeric_to_string(&numeric(2, 0, NUMERIC_POS, 0, &[1])).is_err());
        assert!(numeric_to_string(&numeric(1, 0, 0x1234, 0, &[1])).is_err());
    }

    #[test]
    fn test_int_param_narrows_to_target_type() {
        let mut out = BytesMut::new();
        let value = Value::BigInt(7);
        PgParam(&value).to_sql_checked(&Type::INT2, &mut out).unwrap();
        assert_eq!(&out[..], &7i16.to_be_bytes());

        let mut out = BytesMut::new();
        let value = Value::BigInt(i64::from(i16::MAX) + 1);
        assert!(PgParam(&value).to_sql_checked(&Type::INT2, &mut out).is_err());
    }

    #[test]
    fn test_mismatched_param_type_is_rejected() {
        let mut out = BytesMut::new();
        let value = Value::Text("abc".into());
        assert!(PgParam(&value).to_sql_checked(&Type::INT4, &mut out).is_err());
    }

    #[test]
    fn test_null_param() {
        let mut out = BytesMut::new();
        let value = Value::Null;
        let is_null = PgParam(&value).to_sql_checked(&Type::INT4, &mut out).unwrap();
        assert!(matches!(is_null, IsNull::Yes));
    }
}
