//! Transactional batch execution.
//!
//! A batch runs on a single connection between `BEGIN` and `COMMIT`. Any
//! failure, including a failed `COMMIT`, issues `ROLLBACK` before the error
//! is returned, and the connection is released in every case.

use std::ops::Index;
use std::sync::Arc;

use lambda_pg_pool::LifecycleManager;
use lambda_pg_types::{DbConnection, DriverError, PoolDriver, QueryResult, Statement};
use tracing::Instrument;

use crate::error::{Error, Result};
use crate::executor::{ConnectionOf, checkout};
use crate::instrumentation::{SanitizationConfig, rollback_span};
use crate::query::QuerySpec;

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Read uncommitted.
    ///
    /// PostgreSQL treats this as read committed.
    ReadUncommitted,

    /// Read committed (PostgreSQL default).
    ///
    /// Each statement sees data committed before it began.
    #[default]
    ReadCommitted,

    /// Repeatable read.
    ///
    /// All statements see a snapshot taken at the first statement of the
    /// transaction.
    RepeatableRead,

    /// Serializable (highest isolation).
    ///
    /// Concurrent transactions behave as if run one after another; conflicts
    /// abort with SQLSTATE `40001`.
    Serializable,
}

impl IsolationLevel {
    /// Get the statement that opens a transaction at this level.
    ///
    /// The server default is left implicit.
    #[must_use]
    pub fn begin_sql(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "BEGIN ISOLATION LEVEL READ UNCOMMITTED",
            Self::ReadCommitted => "BEGIN",
            Self::RepeatableRead => "BEGIN ISOLATION LEVEL REPEATABLE READ",
            Self::Serializable => "BEGIN ISOLATION LEVEL SERIALIZABLE",
        }
    }

    /// Get the isolation level name as used in SQL.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

/// Check that every dependent item refers to an item that precedes it.
pub fn validate_batch(items: &[QuerySpec]) -> Result<()> {
    for (index, item) in items.iter().enumerate() {
        if let Some(depends_on) = item.depends_on() {
            if depends_on >= index {
                return Err(Error::DependencyOrder { index, depends_on });
            }
        }
    }
    Ok(())
}

/// Results of a committed batch, one per item, in batch order.
#[derive(Debug, Clone, Default)]
pub struct TransactionResult {
    results: Vec<QueryResult>,
}

impl TransactionResult {
    /// Get the result of the item at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&QueryResult> {
        self.results.get(index)
    }

    /// Number of results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Check if the batch was empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Iterate over the results.
    pub fn iter(&self) -> std::slice::Iter<'_, QueryResult> {
        self.results.iter()
    }

    /// Take ownership of the results.
    #[must_use]
    pub fn into_inner(self) -> Vec<QueryResult> {
        self.results
    }
}

impl Index<usize> for TransactionResult {
    type Output = QueryResult;

    fn index(&self, index: usize) -> &Self::Output {
        &self.results[index]
    }
}

impl IntoIterator for TransactionResult {
    type Item = QueryResult;
    type IntoIter = std::vec::IntoIter<QueryResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

impl<'a> IntoIterator for &'a TransactionResult {
    type Item = &'a QueryResult;
    type IntoIter = std::slice::Iter<'a, QueryResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

/// Runs batches of statements atomically on one connection.
pub struct TransactionExecutor<D: PoolDriver> {
    manager: LifecycleManager<D>,
    isolation_level: IsolationLevel,
    sanitization: Arc<SanitizationConfig>,
}

impl<D: PoolDriver> Clone for TransactionExecutor<D> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
            isolation_level: self.isolation_level,
            sanitization: Arc::clone(&self.sanitization),
        }
    }
}

impl<D: PoolDriver> std::fmt::Debug for TransactionExecutor<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionExecutor")
            .field("manager", &self.manager)
            .field("isolation_level", &self.isolation_level)
            .finish()
    }
}

impl<D: PoolDriver> TransactionExecutor<D> {
    /// Create an executor at the default isolation level.
    pub fn new(manager: LifecycleManager<D>) -> Self {
        Self {
            manager,
            isolation_level: IsolationLevel::default(),
            sanitization: Arc::new(SanitizationConfig::default()),
        }
    }

    /// Set the isolation level used by `BEGIN`.
    #[must_use]
    pub fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = level;
        self
    }

    /// Set the statement sanitization used in spans.
    #[must_use]
    pub fn sanitization(mut self, config: SanitizationConfig) -> Self {
        self.sanitization = Arc::new(config);
        self
    }

    /// Get the lifecycle manager.
    #[must_use]
    pub fn manager(&self) -> &LifecycleManager<D> {
        &self.manager
    }

    /// Execute `items` in one transaction.
    ///
    /// The batch is validated before any pool or connection is touched. On
    /// failure the transaction is rolled back and the error names the
    /// failing item; if the rollback fails as well, [`Error::Rollback`]
    /// carries both failures.
    pub async fn run_batch(&self, items: Vec<QuerySpec>) -> Result<TransactionResult> {
        validate_batch(&items)?;

        let span = self
            .sanitization
            .transaction_span(items.len(), self.isolation_level.name());
        async {
            let mut conn = checkout(&self.manager).await?;

            let outcome = self.run_on(&mut conn, &items).await;
            conn.release();
            outcome
        }
        .instrument(span)
        .await
    }

    async fn run_on(
        &self,
        conn: &mut ConnectionOf<D>,
        items: &[QuerySpec],
    ) -> Result<TransactionResult> {
        conn.query(&Statement::new(self.isolation_level.begin_sql()))
            .await
            .map_err(|source| Error::Statement {
                index: None,
                source,
            })?;

        let failure = match self.run_items(conn, items).await {
            Ok(results) => match conn.query(&Statement::new("COMMIT")).await {
                Ok(_) => {
                    tracing::debug!(statements = results.len(), "transaction committed");
                    return Ok(TransactionResult { results });
                }
                Err(source) => Error::Statement {
                    index: None,
                    source,
                },
            },
            Err(e) => e,
        };

        tracing::debug!(error = %failure, "rolling back transaction");
        match rollback(conn).await {
            Ok(()) => Err(failure),
            Err(rollback) => {
                tracing::error!(error = %failure, rollback_error = %rollback, "rollback failed");
                Err(Error::Rollback {
                    original: Box::new(failure),
                    rollback,
                })
            }
        }
    }

    async fn run_items(
        &self,
        conn: &mut ConnectionOf<D>,
        items: &[QuerySpec],
    ) -> Result<Vec<QueryResult>> {
        let mut results: Vec<QueryResult> = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let resolved = match item {
                QuerySpec::Raw(_) => None,
                QuerySpec::Dependent(dependent) => {
                    if !dependent.has_resolver() {
                        tracing::warn!(
                            index,
                            depends_on = dependent.depends_on,
                            "dependent query has no resolver, running it as written"
                        );
                    }
                    results
                        .get(dependent.depends_on)
                        .and_then(|previous| dependent.resolve(previous))
                }
            };
            let statement = resolved.as_ref().unwrap_or(item.statement());

            let span = self.sanitization.statement_span(index, statement.text());
            let result = conn
                .query(statement)
                .instrument(span)
                .await
                .map_err(|source| Error::Statement {
                    index: Some(index),
                    source,
                })?;
            results.push(result);
        }
        Ok(results)
    }
}

async fn rollback<C: DbConnection>(conn: &mut C) -> std::result::Result<(), DriverError> {
    conn.query(&Statement::new("ROLLBACK"))
        .instrument(rollback_span())
        .await
        .map(|_| ())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::query::DependentQuery;
    use lambda_pg_pool::PoolConfig;
    use lambda_pg_testing::{MockDriver, MockResponse};
    use lambda_pg_types::Value;

    fn executor(driver: &MockDriver) -> TransactionExecutor<MockDriver> {
        let config = PoolConfig::new().host("db.internal").user("app");
        TransactionExecutor::new(LifecycleManager::new(driver.clone(), config).unwrap())
    }

    #[test]
    fn test_isolation_level_sql() {
        assert_eq!(IsolationLevel::default().begin_sql(), "BEGIN");
        assert_eq!(
            IsolationLevel::Serializable.begin_sql(),
            "BEGIN ISOLATION LEVEL SERIALIZABLE"
        );
        assert_eq!(IsolationLevel::RepeatableRead.name(), "REPEATABLE READ");
    }

    #[test]
    fn test_validate_batch() {
        let ok = vec![
            QuerySpec::raw("INSERT INTO a VALUES (1) RETURNING id"),
            QuerySpec::Dependent(DependentQuery::new("INSERT INTO b VALUES ($1)", 0)),
        ];
        assert!(validate_batch(&ok).is_ok());

        let self_reference = vec![QuerySpec::Dependent(DependentQuery::new("SELECT 1", 0))];
        let err = validate_batch(&self_reference).unwrap_err();
        assert!(matches!(
            err,
            Error::DependencyOrder {
                index: 0,
                depends_on: 0
            }
        ));
    }

    #[tokio::test]
    async fn test_batch_commits() {
        let driver = MockDriver::new();
        driver.set_response("INSERT INTO t VALUES (1)", MockResponse::affected(1));
        let exec = executor(&driver);

        let results = exec
            .run_batch(vec![
                QuerySpec::raw("INSERT INTO t VALUES (1)"),
                QuerySpec::raw("SELECT 1"),
            ])
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].rows_affected(), 1);
        assert_eq!(
            driver.executed(),
            vec!["BEGIN", "INSERT INTO t VALUES (1)", "SELECT 1", "COMMIT"]
        );
        assert_eq!(driver.acquires(), 1);
        assert_eq!(driver.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_isolation_level_reaches_begin() {
        let driver = MockDriver::new();
        let exec = executor(&driver).isolation_level(IsolationLevel::Serializable);

        exec.run_batch(vec![QuerySpec::raw("SELECT 1")])
            .await
            .unwrap();
        assert_eq!(driver.executed()[0], "BEGIN ISOLATION LEVEL SERIALIZABLE");
    }

    #[tokio::test]
    async fn test_failure_rolls_back_with_index() {
        let driver = MockDriver::new();
        driver.set_response("INSERT 3", MockResponse::error_with_code("23505", "duplicate key"));
        let exec = executor(&driver);

        let err = exec
            .run_batch(vec![
                QuerySpec::raw("INSERT 1"),
                QuerySpec::raw("INSERT 2"),
                QuerySpec::raw("INSERT 3"),
            ])
            .await
            .unwrap_err();

        assert_eq!(err.statement_index(), Some(2));
        assert_eq!(err.sql_state(), Some("23505"));
        assert!(!err.is_rollback_failure());
        assert_eq!(
            driver.executed(),
            vec!["BEGIN", "INSERT 1", "INSERT 2", "INSERT 3", "ROLLBACK"]
        );
        assert_eq!(driver.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_rollback_failure_carries_both_errors() {
        let driver = MockDriver::new();
        driver.set_response("INSERT 1", MockResponse::error("boom"));
        driver.set_response("ROLLBACK", MockResponse::error("connection reset"));
        let exec = executor(&driver);

        let err = exec
            .run_batch(vec![QuerySpec::raw("INSERT 1")])
            .await
            .unwrap_err();

        assert!(err.is_rollback_failure());
        assert_eq!(err.statement_index(), Some(0));
        match err {
            Error::Rollback { original, rollback } => {
                assert!(matches!(*original, Error::Statement { index: Some(0), .. }));
                assert_eq!(rollback.to_string(), "statement failed: connection reset");
            }
            other => panic!("expected rollback failure, got {other:?}"),
        }
        assert_eq!(driver.releases(), 1);
    }

    #[tokio::test]
    async fn test_commit_failure_rolls_back() {
        let driver = MockDriver::new();
        driver.set_response("COMMIT", MockResponse::error_with_code("40001", "serialization failure"));
        let exec = executor(&driver);

        let err = exec
            .run_batch(vec![QuerySpec::raw("UPDATE t SET n = n + 1")])
            .await
            .unwrap_err();

        assert_eq!(err.statement_index(), None);
        assert_eq!(err.sql_state(), Some("40001"));
        assert_eq!(driver.executed().last().map(String::as_str), Some("ROLLBACK"));
    }

    #[tokio::test]
    async fn test_dependent_query_is_resolved() {
        let driver = MockDriver::new();
        driver.set_response(
            "INSERT INTO orders DEFAULT VALUES RETURNING id",
            MockResponse::scalar(41),
        );
        let exec = executor(&driver);

        let results = exec
            .run_batch(vec![
                QuerySpec::raw("INSERT INTO orders DEFAULT VALUES RETURNING id"),
                QuerySpec::dependent(
                    "INSERT INTO items (order_id) VALUES ($1)",
                    0,
                    |stmt, previous| {
                        let id = previous.first().unwrap().value(0).cloned().unwrap();
                        stmt.clone().bind(id)
                    },
                ),
            ])
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        let statements = driver.executed_statements();
        assert_eq!(statements[2].params(), &[Value::Int(41)]);
    }

    #[tokio::test]
    async fn test_dependent_query_without_resolver_runs_as_written() {
        let driver = MockDriver::new();
        let exec = executor(&driver);

        exec.run_batch(vec![
            QuerySpec::raw("SELECT 1"),
            QuerySpec::Dependent(DependentQuery::new("SELECT 2", 0)),
        ])
        .await
        .unwrap();

        assert_eq!(driver.executed(), vec!["BEGIN", "SELECT 1", "SELECT 2", "COMMIT"]);
    }

    #[tokio::test]
    async fn test_invalid_batch_touches_nothing() {
        let driver = MockDriver::new();
        let exec = executor(&driver);

        let err = exec
            .run_batch(vec![
                QuerySpec::raw("SELECT 1"),
                QuerySpec::Dependent(DependentQuery::new("SELECT 2", 5)),
            ])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::DependencyOrder {
                index: 1,
                depends_on: 5
            }
        ));
        assert_eq!(driver.builds(), 0);
        assert!(driver.executed().is_empty());
    }
}
