//! The client facade.

use std::sync::Arc;
use std::time::Duration;

use lambda_pg_auth::{RdsIamSigner, TokenProvider};
use lambda_pg_pool::{
    FaultPolicy, InitStrategy, LifecycleManager, LifecycleOptions, PoolConfig, PoolConfigPatch,
};
use lambda_pg_types::{PoolDriver, QueryResult, Statement, Value};
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::executor::{QueryExecutor, ready_pool};
use crate::from_row::{FromRow, map_rows};
use crate::instrumentation::SanitizationConfig;
use crate::query::QuerySpec;
use crate::transaction::{IsolationLevel, TransactionExecutor, TransactionResult};

/// Builder for [`Client`].
///
/// Lifecycle options start from the environment (`DBPOOL_MAXAGE`,
/// `PG_DEBUG`); explicit setters override them.
pub struct ClientBuilder<D: PoolDriver> {
    driver: D,
    config: Option<PoolConfig>,
    tokens: Option<Arc<dyn TokenProvider>>,
    options: LifecycleOptions,
    isolation_level: IsolationLevel,
    sanitization: SanitizationConfig,
}

impl<D: PoolDriver> ClientBuilder<D> {
    /// Set the pool configuration.
    ///
    /// Fields it leaves unset are read from the `PG*` environment variables
    /// at build time.
    #[must_use]
    pub fn config(mut self, config: PoolConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the provider used when no static password is configured.
    ///
    /// Defaults to an [`RdsIamSigner`] using the default AWS credential
    /// chain.
    #[must_use]
    pub fn token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.tokens = Some(provider);
        self
    }

    /// Set the maximum pool age before mandatory recreation.
    #[must_use]
    pub fn health_window(mut self, window: Duration) -> Self {
        self.options = self.options.health_window(window);
        self
    }

    /// Set the upper bound of the randomized backoff.
    #[must_use]
    pub fn jitter_max(mut self, max: Duration) -> Self {
        self.options = self.options.jitter_max(max);
        self
    }

    /// Set how concurrent callers coordinate re-initialization.
    #[must_use]
    pub fn init_strategy(mut self, strategy: InitStrategy) -> Self {
        self.options = self.options.strategy(strategy);
        self
    }

    /// Set what happens when an idle connection fails.
    #[must_use]
    pub fn fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.options = self.options.fault_policy(policy);
        self
    }

    /// Log pool state transitions at `info` level.
    #[must_use]
    pub fn verbose(mut self, enabled: bool) -> Self {
        self.options = self.options.verbose(enabled);
        self
    }

    /// Replace all lifecycle options at once.
    #[must_use]
    pub fn lifecycle_options(mut self, options: LifecycleOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the isolation level for transactions.
    #[must_use]
    pub fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = level;
        self
    }

    /// Set how statements are recorded in tracing spans.
    #[must_use]
    pub fn sanitization(mut self, config: SanitizationConfig) -> Self {
        self.sanitization = config;
        self
    }

    /// Build the client. No pool is created until the first query.
    pub fn build(self) -> Result<Client<D>> {
        let config = self.config.unwrap_or_default().with_env_fallbacks()?;
        let tokens = self
            .tokens
            .unwrap_or_else(|| Arc::new(RdsIamSigner::new()));

        let manager = LifecycleManager::builder(self.driver)
            .config(config)
            .token_provider(tokens)
            .options(self.options)
            .build()?;

        let queries = QueryExecutor::with_sanitization(manager.clone(), self.sanitization.clone());
        let transactions = TransactionExecutor::new(manager)
            .isolation_level(self.isolation_level)
            .sanitization(self.sanitization);

        Ok(Client {
            queries,
            transactions,
        })
    }
}

/// PostgreSQL client backed by a self-healing pool.
///
/// Cloning is cheap; clones share the pool. Construct one per process and
/// pass it to the code that needs it.
///
/// # Example
///
/// ```rust,ignore
/// use lambda_pg_client::{Client, QuerySpec};
/// use lambda_pg_postgres::PostgresDriver;
///
/// let client = Client::builder(PostgresDriver::new()).build()?;
///
/// let users = client
///     .query("SELECT id, name FROM users WHERE active = $1", &[true.into()])
///     .await?;
///
/// let results = client
///     .run_transaction(vec![
///         QuerySpec::raw("INSERT INTO orders DEFAULT VALUES RETURNING id"),
///         QuerySpec::dependent("INSERT INTO items (order_id) VALUES ($1)", 0, |stmt, prev| {
///             let id = prev.first().and_then(|row| row.value(0)).cloned();
///             stmt.clone().bind(id.unwrap_or_default())
///         }),
///     ])
///     .await?;
/// ```
pub struct Client<D: PoolDriver> {
    queries: QueryExecutor<D>,
    transactions: TransactionExecutor<D>,
}

impl<D: PoolDriver> Clone for Client<D> {
    fn clone(&self) -> Self {
        Self {
            queries: self.queries.clone(),
            transactions: self.transactions.clone(),
        }
    }
}

impl<D: PoolDriver> std::fmt::Debug for Client<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("manager", self.manager())
            .finish()
    }
}

impl<D: PoolDriver> Client<D> {
    /// Create a builder around a driver.
    pub fn builder(driver: D) -> ClientBuilder<D> {
        ClientBuilder {
            driver,
            config: None,
            tokens: None,
            options: LifecycleOptions::from_env(),
            isolation_level: IsolationLevel::default(),
            sanitization: SanitizationConfig::default(),
        }
    }

    /// Execute a SQL statement with positional parameters (`$1`, `$2`, ...).
    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let statement = Statement::with_params(sql, params.to_vec());
        self.queries.run(&statement).await
    }

    /// Execute a SQL statement and map each row to `T`.
    pub async fn query_as<T: FromRow>(&self, sql: &str, params: &[Value]) -> Result<Vec<T>> {
        let result = self.query(sql, params).await?;
        map_rows(&result)
    }

    /// Execute a prepared [`Statement`].
    pub async fn execute(&self, statement: impl Into<Statement>) -> Result<QueryResult> {
        self.queries.run(&statement.into()).await
    }

    /// Execute a batch atomically.
    ///
    /// See [`TransactionExecutor::run_batch`].
    pub async fn run_transaction(&self, batch: Vec<QuerySpec>) -> Result<TransactionResult> {
        self.transactions.run_batch(batch).await
    }

    /// Merge configuration overrides and rebuild the pool in the background.
    ///
    /// The current pool is ended. Failures are logged, never returned.
    pub fn reconfigure(&self, patch: PoolConfigPatch) -> JoinHandle<()> {
        self.manager().reconfigure(patch)
    }

    /// Get a ready pool for direct driver access.
    pub async fn pool(&self) -> Result<Arc<D::Pool>> {
        ready_pool(self.manager()).await
    }

    /// Get the lifecycle manager.
    #[must_use]
    pub fn manager(&self) -> &LifecycleManager<D> {
        self.queries.manager()
    }

    /// End the current pool. Later operations fail with a closed-pool error.
    pub async fn close(&self) {
        self.manager().close().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::Error;
    use lambda_pg_auth::StaticToken;
    use lambda_pg_pool::PoolError;
    use lambda_pg_testing::{MockDriver, MockResponse};

    fn client(driver: &MockDriver) -> Client<MockDriver> {
        Client::builder(driver.clone())
            .config(PoolConfig::new().host("db.internal").user("app").password("secret"))
            .lifecycle_options(LifecycleOptions::new())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_query_binds_parameters() {
        let driver = MockDriver::new();
        driver.set_response("SELECT name FROM users WHERE id = $1", MockResponse::scalar("alice"));
        let client = client(&driver);

        let result = client
            .query("SELECT name FROM users WHERE id = $1", &[Value::Int(1)])
            .await
            .unwrap();
        let name: String = result.first().unwrap().get(0).unwrap();
        assert_eq!(name, "alice");
        assert_eq!(driver.executed_statements()[0].params(), &[Value::Int(1)]);
    }

    #[tokio::test]
    async fn test_query_as_maps_rows() {
        let driver = MockDriver::new();
        driver.set_response("SELECT id, name FROM users", lambda_pg_testing::fixtures::users_response());
        let client = client(&driver);

        let users: Vec<(i32, String)> = client
            .query_as("SELECT id, name FROM users", &[])
            .await
            .unwrap();
        assert_eq!(users, vec![(1, "alice".to_string()), (2, "bob".to_string())]);
    }

    #[tokio::test]
    async fn test_static_password_skips_token_provider() {
        let driver = MockDriver::new();
        let client = client(&driver);

        client.execute("SELECT 1").await.unwrap();
        let options = driver.last_options().unwrap();
        assert_eq!(options.password.as_deref(), Some("secret"));
    }

    #[tokio::test]
    async fn test_token_provider_supplies_password() {
        let driver = MockDriver::new();
        let client = Client::builder(driver.clone())
            .config(PoolConfig::new().host("db.internal").user("app"))
            .token_provider(Arc::new(StaticToken::new("signed-token")))
            .build()
            .unwrap();

        client.pool().await.unwrap();
        let options = driver.last_options().unwrap();
        assert_eq!(options.password.as_deref(), Some("signed-token"));
    }

    #[tokio::test]
    async fn test_builder_options_reach_manager() {
        let driver = MockDriver::new();
        let client = Client::builder(driver.clone())
            .config(PoolConfig::new().host("db.internal").user("app").password("x"))
            .health_window(Duration::from_secs(5))
            .jitter_max(Duration::from_millis(10))
            .init_strategy(InitStrategy::BestEffort)
            .fault_policy(FaultPolicy::Discard)
            .verbose(true)
            .build()
            .unwrap();

        let options = client.manager().options();
        assert_eq!(options.health_window, Duration::from_secs(5));
        assert_eq!(options.jitter_max, Duration::from_millis(10));
        assert_eq!(options.strategy, InitStrategy::BestEffort);
        assert_eq!(options.fault_policy, FaultPolicy::Discard);
        assert!(options.verbose);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let driver = MockDriver::new();
        let err = Client::builder(driver)
            .config(PoolConfig::new().host("db.internal").user("app").max(0))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Pool(PoolError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_clones_share_the_pool() {
        let driver = MockDriver::new();
        let client = client(&driver);
        let other = client.clone();

        let a = client.pool().await.unwrap();
        let b = other.pool().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(driver.builds(), 1);
    }

    #[tokio::test]
    async fn test_close_rejects_later_queries() {
        let driver = MockDriver::new();
        let client = client(&driver);

        client.execute("SELECT 1").await.unwrap();
        client.close().await;
        assert_eq!(driver.ends(), 1);

        let err = client.execute("SELECT 1").await.unwrap_err();
        assert!(matches!(err, Error::Pool(PoolError::Closed)));
    }
}
