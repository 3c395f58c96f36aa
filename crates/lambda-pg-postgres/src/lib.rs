//! # lambda-pg-postgres
//!
//! PostgreSQL driver for the lambda-pg pool lifecycle.
//!
//! [`PostgresDriver`] builds `deadpool` pools of `tokio-postgres`
//! connections from resolved connection options. Pools report a fault when
//! an idle connection's background task fails, which lets the lifecycle
//! manager replace them.
//!
//! ## Type Mappings
//!
//! | PostgreSQL Type | `Value` variant |
//! |-----------------|-----------------|
//! | `BOOL` | `Bool` |
//! | `INT2` / `INT4` / `INT8` | `SmallInt` / `Int` / `BigInt` |
//! | `FLOAT4` / `FLOAT8` | `Real` / `Double` |
//! | `NUMERIC` | `Numeric` (exact decimal text) |
//! | `TEXT`, `VARCHAR`, `BPCHAR`, `NAME` | `Text` |
//! | `BYTEA` | `Bytes` |
//! | `JSON` / `JSONB` | `Json` |
//! | `DATE` / `TIMESTAMP` / `TIMESTAMPTZ` | `Date` / `Timestamp` / `TimestampTz` |
//!
//! Columns of any other type fail the statement with a backend error; cast
//! them in SQL (`uuid_col::text`).
//!
//! ## Example
//!
//! ```rust,ignore
//! use lambda_pg_client::Client;
//! use lambda_pg_postgres::PostgresDriver;
//!
//! let client = Client::builder(PostgresDriver::new()).build()?;
//! let now = client.query("SELECT NOW()", &[]).await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod driver;
mod error;
pub mod manager;
pub mod types;

pub use driver::{APPLICATION_NAME, PostgresConnection, PostgresDriver, PostgresPool};
pub use manager::{PgConnection, PgManager};
pub use types::PgParam;
