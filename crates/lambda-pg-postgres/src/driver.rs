//! [`PoolDriver`] implementation over `deadpool` and `tokio-postgres`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use deadpool::Runtime;
use deadpool::managed::{Object, Pool};
use lambda_pg_types::driver::FAULT_CHANNEL_CAPACITY;
use lambda_pg_types::{
    ConnectOptions, DbConnection, DbPool, DriverError, PoolDriver, PoolFault, QueryResult,
    Statement,
};
use tokio::sync::broadcast;
use tokio_postgres::types::ToSql;

use crate::error::{map_pg_error, map_pool_error};
use crate::manager::PgManager;
use crate::types::{PgParam, decode_row};

/// Application name reported to the server.
pub const APPLICATION_NAME: &str = "lambda-pg";

/// Builds `deadpool` pools of plain-TCP `tokio-postgres` connections.
#[derive(Debug, Clone)]
pub struct PostgresDriver {
    application_name: String,
}

impl Default for PostgresDriver {
    fn default() -> Self {
        Self {
            application_name: APPLICATION_NAME.to_string(),
        }
    }
}

impl PostgresDriver {
    /// Create a driver with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the `application_name` reported to the server.
    #[must_use]
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = name.into();
        self
    }

    fn pg_config(&self, options: &ConnectOptions) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&options.host)
            .port(options.port)
            .user(&options.user)
            .dbname(options.database_or_user())
            .application_name(&self.application_name)
            .connect_timeout(options.connection_timeout);
        if let Some(password) = &options.password {
            config.password(password);
        }
        config
    }
}

#[async_trait]
impl PoolDriver for PostgresDriver {
    type Pool = PostgresPool;

    async fn build(&self, options: &ConnectOptions) -> Result<Self::Pool, DriverError> {
        let (faults, _) = broadcast::channel(FAULT_CHANNEL_CAPACITY);
        let manager = PgManager::new(self.pg_config(options), faults.clone());

        let pool = Pool::builder(manager)
            .max_size(options.max_size.max(1) as usize)
            .runtime(Runtime::Tokio1)
            .wait_timeout(Some(options.connection_timeout))
            .create_timeout(Some(options.connection_timeout))
            .recycle_timeout(Some(options.connection_timeout))
            .build()
            .map_err(|e| DriverError::Backend(e.to_string().into()))?;

        let pool = PostgresPool {
            pool,
            faults,
            ended: AtomicBool::new(false),
            wait_timeout: options.connection_timeout,
        };
        pool.warm_up(options.min_idle).await?;
        pool.spawn_reaper(options.idle_timeout);

        tracing::debug!(
            host = %options.host,
            port = options.port,
            database = options.database_or_user(),
            max_size = options.max_size,
            "built postgres pool"
        );
        Ok(pool)
    }
}

/// A `deadpool` pool of `tokio-postgres` connections.
pub struct PostgresPool {
    pool: Pool<PgManager>,
    faults: broadcast::Sender<PoolFault>,
    ended: AtomicBool,
    wait_timeout: Duration,
}

impl std::fmt::Debug for PostgresPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.pool.status();
        f.debug_struct("PostgresPool")
            .field("size", &status.size)
            .field("available", &status.available)
            .field("max_size", &status.max_size)
            .field("ended", &self.ended.load(Ordering::Relaxed))
            .finish()
    }
}

impl PostgresPool {
    /// Open `count` connections up front and return them to the pool.
    async fn warm_up(&self, count: u32) -> Result<(), DriverError> {
        let mut opened = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let object = self
                .pool
                .get()
                .await
                .map_err(|e| map_pool_error(e, self.wait_timeout))?;
            opened.push(object);
        }
        Ok(())
    }

    /// Close connections idle for longer than `idle_timeout`.
    fn spawn_reaper(&self, idle_timeout: Duration) {
        if idle_timeout.is_zero() {
            return;
        }
        let pool = self.pool.clone();
        let period = (idle_timeout / 2).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if pool.is_closed() {
                    break;
                }
                let result = pool.retain(|_, metrics| metrics.last_used() < idle_timeout);
                if !result.removed.is_empty() {
                    tracing::debug!(closed = result.removed.len(), "closed idle connections");
                }
            }
        });
    }

    /// Current pool status.
    #[must_use]
    pub fn status(&self) -> deadpool::Status {
        self.pool.status()
    }
}

impl Drop for PostgresPool {
    fn drop(&mut self) {
        self.pool.close();
    }
}

#[async_trait]
impl DbPool for PostgresPool {
    type Connection = PostgresConnection;

    async fn connect(&self) -> Result<Self::Connection, DriverError> {
        if self.ended.load(Ordering::SeqCst) {
            return Err(DriverError::Closed);
        }
        let object = self
            .pool
            .get()
            .await
            .map_err(|e| map_pool_error(e, self.wait_timeout))?;
        object.busy.store(true, Ordering::SeqCst);
        Ok(PostgresConnection { object })
    }

    async fn end(&self) -> Result<(), DriverError> {
        if self.ended.swap(true, Ordering::SeqCst) {
            return Err(DriverError::Closed);
        }
        self.pool.close();
        tracing::debug!("ended postgres pool");
        Ok(())
    }

    fn subscribe_faults(&self) -> broadcast::Receiver<PoolFault> {
        self.faults.subscribe()
    }
}

/// A connection checked out of a [`PostgresPool`].
pub struct PostgresConnection {
    object: Object<PgManager>,
}

impl std::fmt::Debug for PostgresConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConnection")
            .field("connection", &*self.object)
            .finish()
    }
}

#[async_trait]
impl DbConnection for PostgresConnection {
    async fn query(&mut self, statement: &Statement) -> Result<QueryResult, DriverError> {
        let client = &self.object.client;
        let params: Vec<PgParam<'_>> = statement.params().iter().map(PgParam).collect();
        let refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let prepared = client
            .prepare(statement.text())
            .await
            .map_err(map_pg_error)?;
        let command = command_tag(statement.text());

        let result = if prepared.columns().is_empty() {
            let affected = client
                .execute(&prepared, &refs)
                .await
                .map_err(map_pg_error)?;
            QueryResult::affected(affected)
        } else {
            let rows = client
                .query(&prepared, &refs)
                .await
                .map_err(map_pg_error)?;
            let mut result = QueryResult::new(prepared.columns().iter().map(|c| c.name()));
            for row in &rows {
                result.push_row(decode_row(row)?);
            }
            result
        };

        Ok(match command {
            Some(tag) => result.with_command(tag),
            None => result,
        })
    }

    fn release(self) {
        self.object.busy.store(false, Ordering::SeqCst);
        drop(self.object);
    }
}

/// The leading keyword of a statement, upper-cased.
fn command_tag(sql: &str) -> Option<String> {
    sql.split_whitespace()
        .next()
        .map(|word| word.trim_end_matches(';').to_ascii_uppercase())
        .filter(|word| !word.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_tag() {
        assert_eq!(command_tag("  insert into t values (1)").as_deref(), Some("INSERT"));
        assert_eq!(command_tag("COMMIT;").as_deref(), Some("COMMIT"));
        assert_eq!(command_tag("   "), None);
    }

    #[test]
    fn test_pg_config_uses_options() {
        let options = ConnectOptions::new("db.internal", 6432, "app")
            .password("token")
            .database("orders");
        let config = PostgresDriver::new().pg_config(&options);
        assert_eq!(config.get_user(), Some("app"));
        assert_eq!(config.get_dbname(), Some("orders"));
        assert_eq!(config.get_ports(), &[6432]);
        assert_eq!(config.get_password(), Some(&b"token"[..]));
        assert_eq!(config.get_application_name(), Some(APPLICATION_NAME));
    }

    #[test]
    fn test_pg_config_defaults_database_to_user() {
        let options = ConnectOptions::new("db.internal", 5432, "app");
        let config = PostgresDriver::new().pg_config(&options);
        assert_eq!(config.get_dbname(), Some("app"));
        assert_eq!(config.get_password(), None);
    }
}
