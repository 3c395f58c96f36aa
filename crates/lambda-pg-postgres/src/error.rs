//! Mapping of driver-specific errors onto [`DriverError`].

use std::time::Duration;

use deadpool::managed::PoolError;
use lambda_pg_types::DriverError;

/// Map a `tokio-postgres` error.
///
/// Server errors keep their message and SQLSTATE code.
pub(crate) fn map_pg_error(e: tokio_postgres::Error) -> DriverError {
    if let Some(db) = e.as_db_error() {
        return DriverError::Statement {
            message: db.message().to_string(),
            code: Some(db.code().code().to_string()),
        };
    }
    if e.is_closed() {
        return DriverError::Connection(e.to_string());
    }
    DriverError::Backend(Box::new(e))
}

/// Map a checkout failure.
pub(crate) fn map_pool_error(e: PoolError<DriverError>, wait: Duration) -> DriverError {
    match e {
        PoolError::Backend(e) => e,
        PoolError::Timeout(_) => DriverError::Timeout(wait),
        PoolError::Closed => DriverError::Closed,
        other => DriverError::Connection(other.to_string()),
    }
}
