//! Transaction batch example.
//!
//! Runs a batch where the second statement takes its parameter from the
//! first statement's result, then shows a failing batch rolling back.
//!
//! # Running
//!
//! ```bash
//! cargo run -p lambda-pg-postgres --example transactions
//! ```

// Allow common patterns in example code
#![allow(clippy::unwrap_used, clippy::expect_used)]

use lambda_pg_client::{Client, Error, IsolationLevel, PoolConfig, QuerySpec, Statement};
use lambda_pg_postgres::PostgresDriver;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();

    let client = Client::builder(PostgresDriver::new())
        .config(PoolConfig::from_env()?)
        .isolation_level(IsolationLevel::Serializable)
        .build()?;

    client
        .execute("CREATE TABLE IF NOT EXISTS audit (account_id INT, note TEXT UNIQUE)")
        .await?;

    println!("--- Dependent statements ---");
    let results = client
        .run_transaction(vec![
            QuerySpec::raw(Statement::new(
                "INSERT INTO audit (account_id, note) VALUES (0, 'start') RETURNING account_id",
            )),
            QuerySpec::dependent(
                "INSERT INTO audit (account_id, note) VALUES ($1, 'follow-up')",
                0,
                |stmt, previous| {
                    let id: i32 = previous.first().unwrap().get("account_id").unwrap();
                    stmt.clone().bind(id + 1)
                },
            ),
        ])
        .await?;
    println!("Committed {} statements", results.len());

    println!("\n--- Rollback on failure ---");
    let err = client
        .run_transaction(vec![
            QuerySpec::raw("INSERT INTO audit (account_id, note) VALUES (2, 'fresh')"),
            QuerySpec::raw("INSERT INTO audit (account_id, note) VALUES (3, 'start')"),
        ])
        .await
        .unwrap_err();
    println!(
        "Statement {:?} failed with SQLSTATE {:?}: {err}",
        err.statement_index(),
        err.sql_state()
    );

    client.execute("DROP TABLE audit").await?;
    client.close().await;
    Ok(())
}
