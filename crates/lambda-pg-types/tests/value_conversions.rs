//! Value conversion properties.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use lambda_pg_types::{FromValue, QueryResult, TypeError, Value};
use proptest::prelude::*;

proptest! {
    #[test]
    fn smaller_integers_widen_to_i64(v in any::<i32>()) {
        prop_assert_eq!(i64::from_value(&Value::Int(v)).unwrap(), i64::from(v));
    }

    #[test]
    fn bigint_narrows_only_when_in_range(v in any::<i64>()) {
        let narrowed = i32::from_value(&Value::BigInt(v));
        match i32::try_from(v) {
            Ok(expected) => prop_assert_eq!(narrowed.unwrap(), expected),
            Err(_) => {
                let out_of_range = matches!(narrowed, Err(TypeError::OutOfRange { .. }));
                prop_assert!(out_of_range);
            }
        }
    }

    #[test]
    fn text_round_trips_through_rows(s in ".*") {
        let result = QueryResult::new(["v"]).with_row(vec![Value::from(s.as_str())]);
        let row = result.first().unwrap();
        prop_assert_eq!(row.get::<String>("v").unwrap(), s);
    }
}

#[test]
fn null_reads_as_none_for_every_option_type() {
    assert_eq!(Option::<bool>::from_value(&Value::Null).unwrap(), None);
    assert_eq!(Option::<i64>::from_value(&Value::Null).unwrap(), None);
    assert_eq!(Option::<f64>::from_value(&Value::Null).unwrap(), None);
    assert_eq!(Option::<Vec<u8>>::from_value(&Value::Null).unwrap(), None);
}
