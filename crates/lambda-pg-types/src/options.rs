//! Resolved connection options handed to a driver.

use std::fmt;
use std::time::Duration;

/// Immutable snapshot of everything a driver needs to build a pool.
///
/// Produced from the mutable pool configuration at build time, with the
/// password already resolved (static password or freshly signed token).
#[derive(Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct ConnectOptions {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Database user.
    pub user: String,
    /// Password or authentication token.
    pub password: Option<String>,
    /// Database name; drivers default it to the user name when absent.
    pub database: Option<String>,
    /// Maximum number of pooled connections.
    pub max_size: u32,
    /// Minimum number of idle connections to keep.
    pub min_idle: u32,
    /// How long an idle connection may live.
    pub idle_timeout: Duration,
    /// How long to wait when establishing or checking out a connection.
    pub connection_timeout: Duration,
}

impl ConnectOptions {
    /// Create options for a host and user with pool sizing defaults.
    pub fn new(host: impl Into<String>, port: u16, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            password: None,
            database: None,
            max_size: 10,
            min_idle: 0,
            idle_timeout: Duration::from_millis(120_000),
            connection_timeout: Duration::from_millis(10_000),
        }
    }

    /// Set the password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the database name.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the pool size bounds.
    #[must_use]
    pub fn size(mut self, min_idle: u32, max_size: u32) -> Self {
        self.min_idle = min_idle;
        self.max_size = max_size;
        self
    }

    /// Set the idle and connection timeouts.
    #[must_use]
    pub fn timeouts(mut self, idle_timeout: Duration, connection_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self.connection_timeout = connection_timeout;
        self
    }

    /// Database name, falling back to the user name.
    #[must_use]
    pub fn database_or_user(&self) -> &str {
        self.database.as_deref().unwrap_or(&self.user)
    }
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never expose the password or token
        f.debug_struct("ConnectOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("database", &self.database)
            .field("max_size", &self.max_size)
            .field("min_idle", &self.min_idle)
            .field("idle_timeout", &self.idle_timeout)
            .field("connection_timeout", &self.connection_timeout)
            .finish()
    }
}
