//! Mock database driver for unit testing.
//!
//! This module provides an in-memory implementation of the driver traits
//! that can be used to exercise the pool lifecycle and executors without a
//! real database instance.
//!
//! ## Features
//!
//! - Configurable responses keyed by SQL text
//! - Counters for pool builds, pool ends, connection checkouts and releases
//! - Log of every executed statement, in order
//! - Failure injection for build, connect, end and individual statements
//! - Idle-connection fault injection on the current pool
//!
//! ## Example
//!
//! ```rust,ignore
//! use lambda_pg_testing::mock_driver::{MockDriver, MockResponse};
//!
//! #[tokio::test]
//! async fn test_query() {
//!     let driver = MockDriver::builder()
//!         .with_response("SELECT 1", MockResponse::scalar(1i32))
//!         .build();
//!
//!     // Hand driver.clone() to a LifecycleManager and run queries...
//!     assert_eq!(driver.executed(), vec!["SELECT 1"]);
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use lambda_pg_types::driver::FAULT_CHANNEL_CAPACITY;
use lambda_pg_types::{
    ConnectOptions, DbConnection, DbPool, DriverError, PoolDriver, PoolFault, QueryResult,
    Statement, Value,
};
use parking_lot::Mutex;
use tokio::sync::broadcast;

/// Mock response configuration.
#[derive(Clone)]
pub enum MockResponse {
    /// Return rows with named columns.
    Rows {
        /// Column names.
        columns: Vec<String>,
        /// Row data.
        rows: Vec<Vec<Value>>,
    },

    /// Return a rows affected count (INSERT/UPDATE/DELETE).
    RowsAffected(u64),

    /// Fail the statement.
    Error {
        /// SQLSTATE code.
        code: Option<String>,
        /// Error message.
        message: String,
    },

    /// Execute a custom handler.
    Custom(Arc<dyn Fn(&Statement) -> MockResponse + Send + Sync>),
}

impl fmt::Debug for MockResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rows { columns, rows } => f
                .debug_struct("Rows")
                .field("columns", columns)
                .field("rows", rows)
                .finish(),
            Self::RowsAffected(n) => f.debug_tuple("RowsAffected").field(n).finish(),
            Self::Error { code, message } => f
                .debug_struct("Error")
                .field("code", code)
                .field("message", message)
                .finish(),
            Self::Custom(_) => f.debug_tuple("Custom").field(&"<fn>").finish(),
        }
    }
}

impl MockResponse {
    /// Create a single-row, single-column response named `value`.
    pub fn scalar(value: impl Into<Value>) -> Self {
        Self::Rows {
            columns: vec!["value".to_string()],
            rows: vec![vec![value.into()]],
        }
    }

    /// Create an empty result response.
    pub fn empty() -> Self {
        Self::RowsAffected(0)
    }

    /// Create a rows affected response.
    pub fn affected(count: u64) -> Self {
        Self::RowsAffected(count)
    }

    /// Create an error response without a SQLSTATE code.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            code: None,
            message: message.into(),
        }
    }

    /// Create an error response with a SQLSTATE code.
    pub fn error_with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// Create a multi-row response.
    pub fn rows<S: Into<String>>(columns: Vec<S>, rows: Vec<Vec<Value>>) -> Self {
        Self::Rows {
            columns: columns.into_iter().map(Into::into).collect(),
            rows,
        }
    }

    /// Create a response computed from the executed statement.
    pub fn custom<F>(handler: F) -> Self
    where
        F: Fn(&Statement) -> MockResponse + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(handler))
    }

    fn resolve(&self, statement: &Statement) -> Result<QueryResult, DriverError> {
        match self {
            Self::Rows { columns, rows } => {
                let mut result = QueryResult::new(columns.iter().cloned()).with_command("SELECT");
                for row in rows {
                    result.push_row(row.clone());
                }
                Ok(result)
            }
            Self::RowsAffected(n) => {
                let result = QueryResult::affected(*n);
                Ok(match command_tag(statement.text()) {
                    Some(tag) => result.with_command(tag),
                    None => result,
                })
            }
            Self::Error { code, message } => Err(DriverError::Statement {
                message: message.clone(),
                code: code.clone(),
            }),
            Self::Custom(handler) => handler(statement).resolve(statement),
        }
    }
}

fn command_tag(sql: &str) -> Option<String> {
    sql.split_whitespace()
        .next()
        .map(|word| word.to_ascii_uppercase())
}

/// Builder for [`MockDriver`].
pub struct MockDriverBuilder {
    responses: HashMap<String, MockResponse>,
    default_response: MockResponse,
    build_delay: Option<Duration>,
}

impl MockDriverBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            default_response: MockResponse::empty(),
            build_delay: None,
        }
    }

    /// Add a response for a specific SQL text.
    #[must_use]
    pub fn with_response(mut self, sql: impl Into<String>, response: MockResponse) -> Self {
        self.responses.insert(sql.into(), response);
        self
    }

    /// Set the response for unmatched statements.
    #[must_use]
    pub fn with_default_response(mut self, response: MockResponse) -> Self {
        self.default_response = response;
        self
    }

    /// Make every pool build take `delay` (observable under a paused clock).
    #[must_use]
    pub fn with_build_delay(mut self, delay: Duration) -> Self {
        self.build_delay = Some(delay);
        self
    }

    /// Build the driver.
    pub fn build(self) -> MockDriver {
        MockDriver {
            state: Arc::new(MockState {
                responses: Mutex::new(self.responses),
                default_response: Mutex::new(self.default_response),
                build_delay: Mutex::new(self.build_delay),
                ..MockState::default()
            }),
        }
    }
}

impl Default for MockDriverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct PoolRecord {
    id: u64,
    ended: Arc<AtomicBool>,
    faults: broadcast::Sender<PoolFault>,
}

#[derive(Default)]
struct MockState {
    responses: Mutex<HashMap<String, MockResponse>>,
    default_response: Mutex<MockResponse>,
    build_delay: Mutex<Option<Duration>>,
    build_failure: Mutex<Option<String>>,
    connect_failure: AtomicBool,
    end_failure: AtomicBool,
    builds: AtomicUsize,
    ends: AtomicUsize,
    acquires: AtomicUsize,
    releases: AtomicUsize,
    next_pool_id: AtomicU64,
    pools: Mutex<Vec<PoolRecord>>,
    executed: Mutex<Vec<Statement>>,
    last_options: Mutex<Option<ConnectOptions>>,
}

impl Default for MockResponse {
    fn default() -> Self {
        Self::empty()
    }
}

/// An in-memory [`PoolDriver`] for tests.
///
/// Cloning the driver shares its state, so a test can keep one handle for
/// assertions and give another to the code under test.
#[derive(Clone, Default)]
pub struct MockDriver {
    state: Arc<MockState>,
}

impl fmt::Debug for MockDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockDriver")
            .field("builds", &self.builds())
            .field("ends", &self.ends())
            .field("acquires", &self.acquires())
            .field("releases", &self.releases())
            .finish()
    }
}

impl MockDriver {
    /// Create a driver that answers every statement with an empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new builder for the mock driver.
    pub fn builder() -> MockDriverBuilder {
        MockDriverBuilder::new()
    }

    /// Add or replace the response for a specific SQL text.
    pub fn set_response(&self, sql: impl Into<String>, response: MockResponse) {
        self.state.responses.lock().insert(sql.into(), response);
    }

    /// Remove the response for a specific SQL text.
    pub fn clear_response(&self, sql: &str) {
        self.state.responses.lock().remove(sql);
    }

    /// Make subsequent builds fail with a connection error, or succeed again.
    pub fn set_build_failure(&self, message: Option<&str>) {
        *self.state.build_failure.lock() = message.map(str::to_string);
    }

    /// Make subsequent connection checkouts fail.
    pub fn set_connect_failure(&self, fail: bool) {
        self.state.connect_failure.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent pool ends fail.
    pub fn set_end_failure(&self, fail: bool) {
        self.state.end_failure.store(fail, Ordering::SeqCst);
    }

    /// Report a fault on an idle connection of the most recently built pool.
    ///
    /// Returns `false` if no pool has been built or nobody is subscribed.
    pub fn inject_fault(&self, message: &str) -> bool {
        let pools = self.state.pools.lock();
        match pools.last() {
            Some(record) => record.faults.send(PoolFault::new(message)).is_ok(),
            None => false,
        }
    }

    /// Report a fault on the pool with the given id.
    pub fn inject_fault_on(&self, pool_id: u64, message: &str) -> bool {
        let pools = self.state.pools.lock();
        pools
            .iter()
            .find(|record| record.id == pool_id)
            .is_some_and(|record| record.faults.send(PoolFault::new(message)).is_ok())
    }

    /// Number of pools built.
    pub fn builds(&self) -> usize {
        self.state.builds.load(Ordering::SeqCst)
    }

    /// Number of successful pool ends.
    pub fn ends(&self) -> usize {
        self.state.ends.load(Ordering::SeqCst)
    }

    /// Number of connections checked out.
    pub fn acquires(&self) -> usize {
        self.state.acquires.load(Ordering::SeqCst)
    }

    /// Number of connections released.
    pub fn releases(&self) -> usize {
        self.state.releases.load(Ordering::SeqCst)
    }

    /// Connections checked out and not yet released.
    pub fn outstanding(&self) -> usize {
        self.acquires().saturating_sub(self.releases())
    }

    /// Number of built pools that have not been ended.
    pub fn live_pools(&self) -> usize {
        self.state
            .pools
            .lock()
            .iter()
            .filter(|record| !record.ended.load(Ordering::SeqCst))
            .count()
    }

    /// SQL text of every executed statement, in order.
    pub fn executed(&self) -> Vec<String> {
        self.state
            .executed
            .lock()
            .iter()
            .map(|s| s.text().to_string())
            .collect()
    }

    /// Every executed statement with its parameters, in order.
    pub fn executed_statements(&self) -> Vec<Statement> {
        self.state.executed.lock().clone()
    }

    /// Forget executed statements.
    pub fn clear_executed(&self) {
        self.state.executed.lock().clear();
    }

    /// Options passed to the most recent build.
    pub fn last_options(&self) -> Option<ConnectOptions> {
        self.state.last_options.lock().clone()
    }
}

#[async_trait]
impl PoolDriver for MockDriver {
    type Pool = MockPool;

    async fn build(&self, options: &ConnectOptions) -> Result<Self::Pool, DriverError> {
        let delay = *self.state.build_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.state.build_failure.lock().clone();
        if let Some(message) = failure {
            return Err(DriverError::Connection(message));
        }

        *self.state.last_options.lock() = Some(options.clone());
        let id = self.state.next_pool_id.fetch_add(1, Ordering::SeqCst) + 1;
        let ended = Arc::new(AtomicBool::new(false));
        let (faults, _) = broadcast::channel(FAULT_CHANNEL_CAPACITY);
        self.state.pools.lock().push(PoolRecord {
            id,
            ended: Arc::clone(&ended),
            faults: faults.clone(),
        });
        self.state.builds.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(pool_id = id, "mock pool built");

        Ok(MockPool {
            id,
            ended,
            faults,
            state: Arc::clone(&self.state),
        })
    }
}

/// A pool built by [`MockDriver`].
pub struct MockPool {
    id: u64,
    ended: Arc<AtomicBool>,
    faults: broadcast::Sender<PoolFault>,
    state: Arc<MockState>,
}

impl fmt::Debug for MockPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockPool")
            .field("id", &self.id)
            .field("ended", &self.is_ended())
            .finish()
    }
}

impl MockPool {
    /// Sequential id of this pool, starting at 1.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Check whether the pool has been ended.
    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DbPool for MockPool {
    type Connection = MockConnection;

    async fn connect(&self) -> Result<Self::Connection, DriverError> {
        if self.is_ended() {
            return Err(DriverError::Closed);
        }
        if self.state.connect_failure.load(Ordering::SeqCst) {
            return Err(DriverError::Connection(
                "mock connection refused".to_string(),
            ));
        }
        self.state.acquires.fetch_add(1, Ordering::SeqCst);
        Ok(MockConnection {
            pool_id: self.id,
            state: Arc::clone(&self.state),
        })
    }

    async fn end(&self) -> Result<(), DriverError> {
        if self.state.end_failure.load(Ordering::SeqCst) {
            return Err(DriverError::Connection("mock end failed".to_string()));
        }
        if self.ended.swap(true, Ordering::SeqCst) {
            return Err(DriverError::Closed);
        }
        self.state.ends.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(pool_id = self.id, "mock pool ended");
        Ok(())
    }

    fn subscribe_faults(&self) -> broadcast::Receiver<PoolFault> {
        self.faults.subscribe()
    }
}

/// A connection checked out of a [`MockPool`].
pub struct MockConnection {
    pool_id: u64,
    state: Arc<MockState>,
}

impl fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockConnection")
            .field("pool_id", &self.pool_id)
            .finish()
    }
}

impl MockConnection {
    /// Id of the pool this connection came from.
    pub fn pool_id(&self) -> u64 {
        self.pool_id
    }
}

#[async_trait]
impl DbConnection for MockConnection {
    async fn query(&mut self, statement: &Statement) -> Result<QueryResult, DriverError> {
        self.state.executed.lock().push(statement.clone());
        let response = {
            let responses = self.state.responses.lock();
            match responses.get(statement.text()) {
                Some(response) => response.clone(),
                None => self.state.default_response.lock().clone(),
            }
        };
        response.resolve(statement)
    }

    fn release(self) {
        self.state.releases.fetch_add(1, Ordering::SeqCst);
    }
}
