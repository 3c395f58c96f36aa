//! Pool error types.

use lambda_pg_auth::AuthError;
use lambda_pg_types::DriverError;
use thiserror::Error;

/// Errors that can occur while managing the pool lifecycle.
///
/// The `WAIT` outcome of the best-effort protocol is not an error; it is
/// reported as [`Ensured::Wait`](crate::Ensured::Wait).
#[derive(Debug, Error)]
pub enum PoolError {
    /// A credential token could not be obtained.
    #[error("credential error: {0}")]
    Credential(#[from] AuthError),

    /// The driver failed to build a pool.
    #[error("error on connecting to database: {source}")]
    Init {
        /// Underlying driver error.
        #[source]
        source: DriverError,
    },

    /// Pool configuration error.
    #[error("pool configuration error: {0}")]
    Configuration(String),

    /// The manager has been closed.
    #[error("pool manager is closed")]
    Closed,
}

impl PoolError {
    /// Check if retrying later may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Init { source } => source.is_connection(),
            Self::Credential(err) => !err.is_incomplete_input(),
            Self::Configuration(_) | Self::Closed => false,
        }
    }
}
