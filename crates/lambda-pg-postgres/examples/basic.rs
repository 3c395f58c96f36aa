//! Basic query example.
//!
//! Connects through the lifecycle-managed pool and runs a few
//! parameterized queries.
//!
//! # Running
//!
//! ```bash
//! export PGHOST=localhost
//! export PGUSER=postgres
//! export PGPASSWORD=postgres
//!
//! cargo run -p lambda-pg-postgres --example basic
//! ```

// Allow common patterns in example code
#![allow(clippy::unwrap_used, clippy::expect_used)]

use lambda_pg_client::{Client, Error, FromRow, PoolConfig, Row, Value};
use lambda_pg_postgres::PostgresDriver;

#[derive(Debug)]
struct Setting {
    name: String,
    value: String,
}

impl FromRow for Setting {
    fn from_row(row: &Row) -> Result<Self, Error> {
        Ok(Self {
            name: row.get("name")?,
            value: row.get("setting")?,
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();

    let config = PoolConfig::from_env()?.max(2);
    let client = Client::builder(PostgresDriver::new())
        .config(config)
        .build()?;

    let result = client.query("SELECT version() AS version", &[]).await?;
    let version: String = result.first().expect("one row").get("version")?;
    println!("Server version: {version}");

    let result = client
        .query(
            "SELECT $1::text AS name, $2::int4 AS count",
            &[Value::from("test"), Value::Int(42)],
        )
        .await?;
    for row in result.rows() {
        let name: String = row.get(0)?;
        let count: i32 = row.get(1)?;
        println!("Name: {name}, Count: {count}");
    }

    let settings: Vec<Setting> = client
        .query_as(
            "SELECT name, setting FROM pg_settings WHERE name = ANY($1::text[])",
            &[Value::from("{max_connections,server_encoding}")],
        )
        .await?;
    for setting in settings {
        println!("{} = {}", setting.name, setting.value);
    }

    client.close().await;
    println!("\nPool closed.");

    Ok(())
}
