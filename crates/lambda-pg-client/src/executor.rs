//! Single-statement execution against the managed pool.

use std::sync::Arc;

use lambda_pg_pool::{Ensured, LifecycleManager};
use lambda_pg_types::{DbConnection, DbPool, PoolDriver, QueryResult, Statement};
use tracing::Instrument;

use crate::error::{Error, Result};
use crate::instrumentation::{SanitizationConfig, acquire_span, attributes};

/// Connection type handed out by the pools of driver `D`.
pub(crate) type ConnectionOf<D> = <<D as PoolDriver>::Pool as DbPool>::Connection;

/// Get a usable pool, backing off once if another caller is replacing it.
///
/// After a [`Ensured::Wait`] the current pool is read without calling
/// `ensure_pool` again. If the concurrent initialization has not produced a
/// pool by then, the caller gets [`Error::PoolUnavailable`].
pub(crate) async fn ready_pool<D: PoolDriver>(
    manager: &LifecycleManager<D>,
) -> Result<Arc<D::Pool>> {
    match manager.ensure_pool().await? {
        Ensured::Ready(pool) => Ok(pool),
        Ensured::Wait => {
            tracing::debug!("pool is being replaced, waiting");
            manager.wait_for_pool().await;
            manager.current().ok_or(Error::PoolUnavailable)
        }
    }
}

/// Check a connection out of `pool`.
///
/// A pool that cannot hand out connections is discarded so the next caller
/// builds a fresh one.
pub(crate) async fn acquire<D: PoolDriver>(
    manager: &LifecycleManager<D>,
    pool: &Arc<D::Pool>,
) -> Result<ConnectionOf<D>> {
    match pool.connect().await {
        Ok(conn) => Ok(conn),
        Err(e) => {
            tracing::warn!(error = %e, "connection acquisition failed, discarding pool");
            manager.discard(pool).await;
            Err(Error::Acquire(e))
        }
    }
}

/// Get a ready pool and check a connection out of it.
pub(crate) async fn checkout<D: PoolDriver>(
    manager: &LifecycleManager<D>,
) -> Result<ConnectionOf<D>> {
    async {
        let pool = ready_pool(manager).await?;
        acquire(manager, &pool).await
    }
    .instrument(acquire_span())
    .await
}

/// Runs one statement on a freshly acquired connection.
pub struct QueryExecutor<D: PoolDriver> {
    manager: LifecycleManager<D>,
    sanitization: Arc<SanitizationConfig>,
}

impl<D: PoolDriver> Clone for QueryExecutor<D> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
            sanitization: Arc::clone(&self.sanitization),
        }
    }
}

impl<D: PoolDriver> std::fmt::Debug for QueryExecutor<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryExecutor")
            .field("manager", &self.manager)
            .field("sanitization", &self.sanitization)
            .finish()
    }
}

impl<D: PoolDriver> QueryExecutor<D> {
    /// Create an executor over a lifecycle manager.
    pub fn new(manager: LifecycleManager<D>) -> Self {
        Self::with_sanitization(manager, SanitizationConfig::default())
    }

    /// Create an executor with a custom statement sanitization for spans.
    pub fn with_sanitization(manager: LifecycleManager<D>, sanitization: SanitizationConfig) -> Self {
        Self {
            manager,
            sanitization: Arc::new(sanitization),
        }
    }

    /// Get the lifecycle manager.
    #[must_use]
    pub fn manager(&self) -> &LifecycleManager<D> {
        &self.manager
    }

    /// Execute a statement.
    ///
    /// The connection is released whether or not the statement succeeds. A
    /// statement failure leaves the pool in place; an acquisition failure
    /// discards it.
    pub async fn run(&self, statement: &Statement) -> Result<QueryResult> {
        let span = self.sanitization.query_span(statement.text());
        async {
            let mut conn = checkout(&self.manager).await?;

            let outcome = conn.query(statement).await;
            conn.release();

            let result = outcome.map_err(|source| Error::Statement {
                index: None,
                source,
            })?;
            tracing::Span::current()
                .record(attributes::DB_ROWS_AFFECTED, result.rows_affected());
            Ok(result)
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    use lambda_pg_pool::{InitStrategy, LifecycleOptions, PoolConfig};
    use lambda_pg_testing::{MockDriver, MockResponse};

    fn executor(driver: &MockDriver) -> QueryExecutor<MockDriver> {
        let config = PoolConfig::new().host("db.internal").user("app");
        let manager = LifecycleManager::new(driver.clone(), config).unwrap();
        QueryExecutor::new(manager)
    }

    #[tokio::test]
    async fn test_run_returns_rows_and_releases() {
        let driver = MockDriver::new();
        driver.set_response("SELECT 1", MockResponse::scalar(1));
        let exec = executor(&driver);

        let result = exec.run(&Statement::new("SELECT 1")).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(driver.acquires(), 1);
        assert_eq!(driver.releases(), 1);
        assert_eq!(driver.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_statement_failure_keeps_pool() {
        let driver = MockDriver::new();
        driver.set_response("SELECT boom", MockResponse::error("boom"));
        let exec = executor(&driver);

        exec.run(&Statement::new("SELECT 1")).await.unwrap();
        let before = exec.manager().current().unwrap();

        let err = exec.run(&Statement::new("SELECT boom")).await.unwrap_err();
        assert!(matches!(err, Error::Statement { index: None, .. }));
        assert_eq!(driver.outstanding(), 0);

        let after = exec.manager().current().unwrap();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[tokio::test]
    async fn test_acquire_failure_discards_pool() {
        let driver = MockDriver::new();
        let exec = executor(&driver);

        exec.run(&Statement::new("SELECT 1")).await.unwrap();
        let before = exec.manager().current().unwrap();

        driver.set_connect_failure(true);
        let err = exec.run(&Statement::new("SELECT 1")).await.unwrap_err();
        assert!(matches!(err, Error::Acquire(_)));
        assert!(err.is_transient());
        assert!(exec.manager().current().is_none());

        driver.set_connect_failure(false);
        exec.run(&Statement::new("SELECT 1")).await.unwrap();
        let after = exec.manager().current().unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(driver.builds(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_replacement_is_pool_unavailable() {
        let driver = MockDriver::new();
        let manager = LifecycleManager::builder(driver.clone())
            .config(PoolConfig::new().host("db.internal").user("app"))
            .options(LifecycleOptions::new().strategy(InitStrategy::BestEffort))
            .build()
            .unwrap();
        let exec = QueryExecutor::new(manager);

        exec.run(&Statement::new("SELECT 1")).await.unwrap();
        tokio::time::advance(Duration::from_secs(31)).await;

        // The stale pool cannot be ended, so this caller backs off and finds no pool
        driver.set_end_failure(true);
        let err = exec.run(&Statement::new("SELECT 1")).await.unwrap_err();
        assert!(matches!(err, Error::PoolUnavailable));
        assert!(exec.manager().current().is_none());
        assert_eq!(driver.acquires(), 1);

        driver.set_end_failure(false);
        exec.run(&Statement::new("SELECT 1")).await.unwrap();
        assert_eq!(driver.builds(), 2);
    }

    #[tokio::test]
    async fn test_build_failure_surfaces_pool_error() {
        let driver = MockDriver::new();
        driver.set_build_failure(Some("connection refused"));
        let exec = executor(&driver);

        let err = exec.run(&Statement::new("SELECT 1")).await.unwrap_err();
        assert!(matches!(err, Error::Pool(_)));
        assert_eq!(driver.acquires(), 0);
    }

    #[tokio::test]
    async fn test_parameters_reach_the_driver() {
        let driver = MockDriver::new();
        let exec = executor(&driver);

        let stmt = Statement::new("SELECT * FROM users WHERE id = $1").bind(7);
        exec.run(&stmt).await.unwrap();
        assert_eq!(driver.executed_statements(), vec![stmt]);
    }
}
