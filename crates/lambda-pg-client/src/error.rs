//! Client error types.

use lambda_pg_pool::PoolError;
use lambda_pg_types::{DriverError, TypeError};
use thiserror::Error;

/// Errors that can occur during client operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The pool could not be initialized.
    #[error("pool error: {0}")]
    Pool(#[from] PoolError),

    /// No pool was present after waiting for a concurrent initialization.
    #[error("no pool available after waiting for initialization")]
    PoolUnavailable,

    /// A dependent query refers to a query that does not precede it.
    #[error("query {index} depends on query {depends_on}, which does not precede it")]
    DependencyOrder {
        /// Position of the offending query in the batch.
        index: usize,
        /// The referenced position.
        depends_on: usize,
    },

    /// A connection could not be checked out of the pool.
    #[error("failed to acquire connection: {0}")]
    Acquire(#[source] DriverError),

    /// The server rejected or failed a statement.
    #[error(
        "statement{} failed: {source}",
        .index.map(|i| format!(" {i}")).unwrap_or_default()
    )]
    Statement {
        /// Position in the batch, for transactional execution.
        index: Option<usize>,
        /// Underlying driver error.
        #[source]
        source: DriverError,
    },

    /// A transaction failed and so did its rollback.
    #[error("{original}; rollback also failed: {rollback}")]
    Rollback {
        /// The failure that triggered the rollback.
        #[source]
        original: Box<Error>,
        /// The rollback failure.
        rollback: DriverError,
    },

    /// Type conversion error.
    #[error("type error: {0}")]
    Type(#[from] TypeError),
}

impl Error {
    /// Check if this error is transient and may succeed on retry.
    ///
    /// Transient errors include pool initialization and connection
    /// failures. Statement failures reported by the server are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Pool(e) => e.is_transient(),
            Self::PoolUnavailable => true,
            Self::Acquire(e) | Self::Statement { source: e, .. } => e.is_connection(),
            Self::Rollback { original, .. } => original.is_transient(),
            Self::DependencyOrder { .. } | Self::Type(_) => false,
        }
    }

    /// Position of the failing statement in a transaction batch.
    #[must_use]
    pub fn statement_index(&self) -> Option<usize> {
        match self {
            Self::Statement { index, .. } => *index,
            Self::Rollback { original, .. } => original.statement_index(),
            _ => None,
        }
    }

    /// SQLSTATE code reported by the server, if any.
    #[must_use]
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Statement { source, .. } => source.code(),
            Self::Rollback { original, .. } => original.sql_state(),
            _ => None,
        }
    }

    /// Check if this is a rollback failure.
    #[must_use]
    pub fn is_rollback_failure(&self) -> bool {
        matches!(self, Self::Rollback { .. })
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn statement_error(index: Option<usize>, code: &str) -> Error {
        Error::Statement {
            index,
            source: DriverError::Statement {
                message: "duplicate key value".into(),
                code: Some(code.into()),
            },
        }
    }

    #[test]
    fn test_statement_error_display() {
        assert_eq!(
            statement_error(Some(2), "23505").to_string(),
            "statement 2 failed: statement failed: duplicate key value"
        );
        assert_eq!(
            statement_error(None, "23505").to_string(),
            "statement failed: statement failed: duplicate key value"
        );
    }

    #[test]
    fn test_rollback_error_carries_original() {
        let err = Error::Rollback {
            original: Box::new(statement_error(Some(1), "40001")),
            rollback: DriverError::Closed,
        };
        assert_eq!(err.statement_index(), Some(1));
        assert_eq!(err.sql_state(), Some("40001"));
        assert!(err.is_rollback_failure());
        assert!(err.to_string().ends_with("rollback also failed: pool is closed"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(Error::Acquire(DriverError::Connection("reset".into())).is_transient());
        assert!(Error::PoolUnavailable.is_transient());
        assert!(!statement_error(None, "42P01").is_transient());
        assert!(
            !Error::DependencyOrder {
                index: 0,
                depends_on: 0
            }
            .is_transient()
        );
    }
}
