//! # lambda-pg-types
//!
//! Driver-neutral building blocks shared by the lambda-pg crates.
//!
//! This crate provides the value model used for parameters and result
//! columns, statements and results, the error types drivers report, and the
//! driver traits the pool lifecycle layer is written against.
//!
//! ## Type Mappings
//!
//! | PostgreSQL Type | Rust Type |
//! |-----------------|-----------|
//! | `BOOL` | `bool` |
//! | `INT2` | `i16` |
//! | `INT4` | `i32` |
//! | `INT8` | `i64` |
//! | `FLOAT4` | `f32` |
//! | `FLOAT8` | `f64` |
//! | `NUMERIC` | `String` |
//! | `TEXT`/`VARCHAR` | `String` |
//! | `BYTEA` | `Vec<u8>` |
//! | `JSON`/`JSONB` | `serde_json::Value` |
//! | `DATE` | `chrono::NaiveDate` |
//! | `TIMESTAMP` | `chrono::NaiveDateTime` |
//! | `TIMESTAMPTZ` | `chrono::DateTime<Utc>` |

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod driver;
pub mod error;
pub mod from_value;
pub mod options;
pub mod result;
pub mod statement;
pub mod value;

pub use driver::{DbConnection, DbPool, PoolDriver, PoolFault};
pub use error::{BoxError, DriverError, TypeError};
pub use from_value::FromValue;
pub use options::ConnectOptions;
pub use result::{ColumnIndex, QueryResult, Row};
pub use statement::Statement;
pub use value::Value;
