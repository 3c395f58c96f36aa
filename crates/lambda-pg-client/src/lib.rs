//! # lambda-pg-client
//!
//! Query and transaction execution on top of a self-healing PostgreSQL
//! pool.
//!
//! This is the primary public API surface of the lambda-pg workspace. A
//! [`Client`] owns a [`LifecycleManager`](lambda_pg_pool::LifecycleManager)
//! and runs every operation against whatever pool is current, so callers
//! never see a stale or expired pool.
//!
//! ## Features
//!
//! - **Lazy, self-healing pool**: built on first use, rebuilt after the
//!   health window, discarded when it can no longer hand out connections
//! - **Transactions**: atomic batches with `BEGIN`/`COMMIT`/`ROLLBACK` and
//!   a configurable isolation level
//! - **Dependent queries**: a batch item can be rewritten from the result of
//!   an earlier item before it runs
//! - **Tracing**: every operation runs in a span with sanitized SQL
//!
//! ## Example
//!
//! ```rust,ignore
//! use lambda_pg_client::{Client, PoolConfig, QuerySpec};
//! use lambda_pg_postgres::PostgresDriver;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder(PostgresDriver::new())
//!         .config(PoolConfig::from_env()?.max(5))
//!         .build()?;
//!
//!     let rows = client
//!         .query("SELECT id, name FROM users WHERE id = $1", &[1.into()])
//!         .await?;
//!
//!     for row in rows.rows() {
//!         let name: String = row.get("name")?;
//!         println!("User: {}", name);
//!     }
//!
//!     client
//!         .run_transaction(vec![
//!             QuerySpec::raw("INSERT INTO audit (event) VALUES ('login')"),
//!             QuerySpec::raw("UPDATE users SET last_login = NOW() WHERE id = 1"),
//!         ])
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod client;
pub mod error;
pub mod executor;
pub mod from_row;
pub mod instrumentation;
pub mod query;
pub mod transaction;

// Re-export commonly used types
pub use client::{Client, ClientBuilder};
pub use error::{Error, Result};
pub use executor::QueryExecutor;
pub use from_row::{FromRow, map_rows};
pub use instrumentation::SanitizationConfig;
pub use lambda_pg_auth::{RdsIamSigner, StaticToken, TokenProvider};
pub use lambda_pg_pool::{FaultPolicy, InitStrategy, PoolConfig, PoolConfigPatch};
pub use lambda_pg_types::{QueryResult, Row, Statement, Value};
pub use query::{DependentQuery, QuerySpec};
pub use transaction::{IsolationLevel, TransactionExecutor, TransactionResult, validate_batch};
