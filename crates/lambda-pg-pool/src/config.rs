//! Pool configuration.

use std::fmt;
use std::time::Duration;

use lambda_pg_auth::{AuthError, TokenRequest};
use lambda_pg_types::ConnectOptions;
use serde::Deserialize;

use crate::error::PoolError;

/// Default maximum number of pooled connections.
pub const DEFAULT_MAX: u32 = 10;
/// Default minimum number of idle connections.
pub const DEFAULT_MIN: u32 = 0;
/// Default idle connection timeout.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(120_000);
/// Default connection timeout.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_millis(10_000);
/// Default PostgreSQL port.
pub const DEFAULT_PORT: u16 = 5432;
/// Default cloud region used for token signing.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Configuration for the managed pool.
///
/// This struct is marked `#[non_exhaustive]` to allow adding new fields
/// in future minor versions without breaking changes. Use the builder
/// pattern methods, [`Default::default()`] or [`PoolConfig::from_env()`] to
/// construct instances, and [`PoolConfigPatch`] to override a subset of
/// fields at runtime.
#[derive(Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct PoolConfig {
    /// Maximum number of connections allowed.
    pub max: u32,

    /// Minimum number of idle connections to maintain.
    pub min: u32,

    /// Time a connection can be idle before being closed.
    pub idle_timeout: Duration,

    /// Time to wait when establishing or checking out a connection.
    pub connection_timeout: Duration,

    /// Server hostname.
    pub host: Option<String>,

    /// Server port.
    pub port: u16,

    /// Database user.
    pub user: Option<String>,

    /// Static password. When absent, a token is fetched for every new pool.
    pub password: Option<String>,

    /// Database name.
    pub database: Option<String>,

    /// Cloud region of the database, used for token signing.
    pub region: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max: DEFAULT_MAX,
            min: DEFAULT_MIN,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            host: None,
            port: DEFAULT_PORT,
            user: None,
            password: None,
            database: None,
            region: DEFAULT_REGION.to_string(),
        }
    }
}

impl fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfig")
            .field("max", &self.max)
            .field("min", &self.min)
            .field("idle_timeout", &self.idle_timeout)
            .field("connection_timeout", &self.connection_timeout)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("database", &self.database)
            .field("region", &self.region)
            .finish()
    }
}

impl PoolConfig {
    /// Create a new pool configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration from the `PG*` environment variables.
    ///
    /// Reads `PGHOST`, `PGPORT`, `PGUSER`, `PGPASSWORD`, `PGDATABASE` and
    /// `REGION` (falling back to `AWS_REGION`). Unset variables keep their
    /// defaults.
    pub fn from_env() -> Result<Self, PoolError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create a configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PoolError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::default().with_fallbacks_from(lookup)
    }

    /// Fill fields the configuration leaves unset from the `PG*`
    /// environment variables.
    ///
    /// Explicit values win. `port` and `region` count as unset while they
    /// hold their defaults.
    pub fn with_env_fallbacks(self) -> Result<Self, PoolError> {
        self.with_fallbacks_from(|key| std::env::var(key).ok())
    }

    /// Variant of [`with_env_fallbacks`](Self::with_env_fallbacks) with an
    /// arbitrary variable lookup.
    pub fn with_fallbacks_from<F>(mut self, lookup: F) -> Result<Self, PoolError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        self.host = self.host.or_else(|| var("PGHOST"));
        self.user = self.user.or_else(|| var("PGUSER"));
        self.password = self.password.or_else(|| var("PGPASSWORD"));
        self.database = self.database.or_else(|| var("PGDATABASE"));
        if self.port == DEFAULT_PORT {
            if let Some(port) = var("PGPORT") {
                self.port = port
                    .parse()
                    .map_err(|_| PoolError::Configuration(format!("invalid PGPORT: {port}")))?;
            }
        }
        if self.region == DEFAULT_REGION {
            if let Some(region) = var("REGION").or_else(|| var("AWS_REGION")) {
                self.region = region;
            }
        }
        Ok(self)
    }

    /// Set the minimum number of idle connections.
    #[must_use]
    pub fn min(mut self, count: u32) -> Self {
        self.min = count;
        self
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub fn max(mut self, count: u32) -> Self {
        self.max = count;
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the server hostname.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the server port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the database user.
    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set a static password, disabling token fetches.
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

    /// Set the region used for token signing.
    #[must_use]
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Overwrite every field the patch sets.
    pub fn apply(&mut self, patch: PoolConfigPatch) {
        let PoolConfigPatch {
            max,
            min,
            idle_timeout_ms,
            connection_timeout_ms,
            host,
            port,
            user,
            password,
            database,
            region,
        } = patch;

        if let Some(max) = max {
            self.max = max;
        }
        if let Some(min) = min {
            self.min = min;
        }
        if let Some(ms) = idle_timeout_ms {
            self.idle_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = connection_timeout_ms {
            self.connection_timeout = Duration::from_millis(ms);
        }
        if host.is_some() {
            self.host = host;
        }
        if let Some(port) = port {
            self.port = port;
        }
        if user.is_some() {
            self.user = user;
        }
        if password.is_some() {
            self.password = password;
        }
        if database.is_some() {
            self.database = database;
        }
        if let Some(region) = region {
            self.region = region;
        }
    }

    /// Builder-style variant of [`apply`](Self::apply).
    #[must_use]
    pub fn merged(mut self, patch: PoolConfigPatch) -> Self {
        self.apply(patch);
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max == 0 {
            return Err(PoolError::Configuration(
                "max must be greater than 0".into(),
            ));
        }
        if self.min > self.max {
            return Err(PoolError::Configuration(
                "min cannot be greater than max".into(),
            ));
        }
        Ok(())
    }

    /// Signing coordinates for a token provider.
    pub fn token_request(&self) -> Result<TokenRequest, AuthError> {
        TokenRequest::from_parts(
            self.host.as_deref(),
            Some(self.port),
            self.user.as_deref(),
            Some(&self.region),
        )
    }

    /// Freeze the configuration into driver options with the resolved
    /// password.
    pub fn connect_options(&self, password: Option<String>) -> Result<ConnectOptions, PoolError> {
        let host = self
            .host
            .as_deref()
            .ok_or_else(|| PoolError::Configuration("host is required".into()))?;
        let user = self
            .user
            .as_deref()
            .ok_or_else(|| PoolError::Configuration("user is required".into()))?;

        let mut options = ConnectOptions::new(host, self.port, user)
            .size(self.min, self.max)
            .timeouts(self.idle_timeout, self.connection_timeout);
        if let Some(password) = password {
            options = options.password(password);
        }
        if let Some(database) = &self.database {
            options = options.database(database.clone());
        }
        Ok(options)
    }
}

/// A partial [`PoolConfig`] override.
///
/// Deserializes from JSON fragments; the camelCase `idleTimeoutMillis` and
/// `connectionTimeoutMillis` spellings are accepted as aliases.
///
/// ```rust
/// use lambda_pg_pool::PoolConfigPatch;
///
/// let patch: PoolConfigPatch =
///     serde_json::from_str(r#"{"max": 2, "idleTimeoutMillis": 5000}"#).unwrap();
/// assert_eq!(patch.max, Some(2));
/// assert_eq!(patch.idle_timeout_ms, Some(5000));
/// ```
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct PoolConfigPatch {
    /// Maximum number of connections.
    pub max: Option<u32>,
    /// Minimum number of idle connections.
    pub min: Option<u32>,
    /// Idle timeout in milliseconds.
    #[serde(alias = "idleTimeoutMillis")]
    pub idle_timeout_ms: Option<u64>,
    /// Connection timeout in milliseconds.
    #[serde(alias = "connectionTimeoutMillis")]
    pub connection_timeout_ms: Option<u64>,
    /// Server hostname.
    pub host: Option<String>,
    /// Server port.
    pub port: Option<u16>,
    /// Database user.
    pub user: Option<String>,
    /// Static password.
    pub password: Option<String>,
    /// Database name.
    pub database: Option<String>,
    /// Cloud region.
    pub region: Option<String>,
}

impl fmt::Debug for PoolConfigPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfigPatch")
            .field("max", &self.max)
            .field("min", &self.min)
            .field("idle_timeout_ms", &self.idle_timeout_ms)
            .field("connection_timeout_ms", &self.connection_timeout_ms)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("database", &self.database)
            .field("region", &self.region)
            .finish()
    }
}

impl PoolConfigPatch {
    /// Create an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the maximum number of connections.
    #[must_use]
    pub fn max(mut self, count: u32) -> Self {
        self.max = Some(count);
        self
    }

    /// Override the minimum number of idle connections.
    #[must_use]
    pub fn min(mut self, count: u32) -> Self {
        self.min = Some(count);
        self
    }

    /// Override the idle timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Override the connection timeout.
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Override the hostname.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Override the port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Override the user.
    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Override the password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Override the database name.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Override the region.
    #[must_use]
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Check whether the patch overrides nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
