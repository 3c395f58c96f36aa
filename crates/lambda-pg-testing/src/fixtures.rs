//! Test fixture utilities.

use lambda_pg_types::{ConnectOptions, Value};

use crate::mock_driver::MockResponse;

/// Connection options pointing at a local test server.
#[must_use]
pub fn local_options() -> ConnectOptions {
    ConnectOptions::new("localhost", 5432, "postgres").database("postgres")
}

/// A two-row `users` result (`id`, `name`).
#[must_use]
pub fn users_response() -> MockResponse {
    MockResponse::rows(
        vec!["id", "name"],
        vec![
            vec![Value::Int(1), Value::from("alice")],
            vec![Value::Int(2), Value::from("bob")],
        ],
    )
}

/// Test schema fixture for setting up and tearing down test data.
///
/// Each fixture owns a dedicated schema so concurrent test runs against
/// the same database do not collide.
pub struct TestFixture {
    /// Schema name.
    pub schema: String,
    /// Table definitions created by this fixture (`name`, column list).
    pub tables: Vec<(String, String)>,
}

impl TestFixture {
    /// Create a new test fixture.
    #[must_use]
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            tables: Vec::new(),
        }
    }

    /// Add a table to the fixture.
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>, columns: impl Into<String>) -> Self {
        self.tables.push((table.into(), columns.into()));
        self
    }

    /// Fully qualified name of a fixture table.
    #[must_use]
    pub fn qualified(&self, table: &str) -> String {
        format!("\"{}\".\"{}\"", self.schema, table)
    }

    /// Generate the SQL statements that create the schema and its tables.
    #[must_use]
    pub fn setup_sql(&self) -> Vec<String> {
        let mut sql = vec![format!("CREATE SCHEMA IF NOT EXISTS \"{}\"", self.schema)];
        sql.extend(self.tables.iter().map(|(table, columns)| {
            format!(
                "CREATE TABLE IF NOT EXISTS {} ({columns})",
                self.qualified(table)
            )
        }));
        sql
    }

    /// Generate SQL to drop the schema and everything in it.
    #[must_use]
    pub fn teardown_sql(&self) -> String {
        format!("DROP SCHEMA IF EXISTS \"{}\" CASCADE", self.schema)
    }
}
