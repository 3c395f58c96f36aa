//! Driver abstraction.
//!
//! The pool lifecycle layer treats the database driver as a black box. A
//! [`PoolDriver`] builds pools from [`ConnectOptions`]; a [`DbPool`] hands out
//! connections, can be ended, and publishes [`PoolFault`]s for failures on
//! idle connections; a [`DbConnection`] runs statements and is released back
//! exactly once.
//!
//! These traits use `#[async_trait]` so the futures they return are `Send`
//! and can be driven from spawned tasks.

use std::time::SystemTime;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::DriverError;
use crate::options::ConnectOptions;
use crate::result::QueryResult;
use crate::statement::Statement;

/// Capacity used by drivers for their fault broadcast channel.
pub const FAULT_CHANNEL_CAPACITY: usize = 16;

/// An unrecoverable error reported by a pool for one of its idle connections.
#[derive(Debug, Clone)]
pub struct PoolFault {
    /// Description of the failure.
    pub message: String,
    /// When the driver observed the failure.
    pub observed_at: SystemTime,
}

impl PoolFault {
    /// Create a fault observed now.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            observed_at: SystemTime::now(),
        }
    }
}

/// Builds pools.
#[async_trait]
pub trait PoolDriver: Send + Sync + 'static {
    /// The pool type this driver builds.
    type Pool: DbPool;

    /// Build a new pool from resolved options.
    async fn build(&self, options: &ConnectOptions) -> Result<Self::Pool, DriverError>;
}

/// A live pool of database connections.
#[async_trait]
pub trait DbPool: Send + Sync + 'static {
    /// The connection type handed out by this pool.
    type Connection: DbConnection;

    /// Check out a connection.
    async fn connect(&self) -> Result<Self::Connection, DriverError>;

    /// End the pool, closing all idle connections.
    ///
    /// Ending a pool twice is an error.
    async fn end(&self) -> Result<(), DriverError>;

    /// Subscribe to faults on idle connections.
    fn subscribe_faults(&self) -> broadcast::Receiver<PoolFault>;
}

/// A connection checked out of a [`DbPool`].
#[async_trait]
pub trait DbConnection: Send + Sized + 'static {
    /// Execute a statement.
    async fn query(&mut self, statement: &Statement) -> Result<QueryResult, DriverError>;

    /// Return the connection to its pool.
    ///
    /// Consuming `self` makes a second release impossible.
    fn release(self);
}
