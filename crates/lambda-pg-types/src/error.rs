//! Type conversion and driver error types.

use std::time::Duration;

use thiserror::Error;

/// Boxed error used to carry backend-specific failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur during value conversion.
#[derive(Debug, Error)]
pub enum TypeError {
    /// Value is null when non-null was expected.
    #[error("unexpected null value")]
    UnexpectedNull,

    /// Type mismatch during conversion.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Expected type name.
        expected: &'static str,
        /// Actual type name.
        actual: String,
    },

    /// Value is out of range for target type.
    #[error("value out of range for {target_type}")]
    OutOfRange {
        /// Target type name.
        target_type: &'static str,
    },

    /// Text could not be parsed as JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// No column with the requested name.
    #[error("column not found: {0}")]
    ColumnNotFound(String),

    /// Column index past the end of the row.
    #[error("column index {index} out of range for row of {len} columns")]
    ColumnIndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of columns in the row.
        len: usize,
    },
}

/// Errors reported by a database driver.
#[derive(Debug, Error)]
pub enum DriverError {
    /// A connection could not be established or checked out.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The server rejected or failed a statement.
    #[error("statement failed: {message}")]
    Statement {
        /// Server message.
        message: String,
        /// SQLSTATE code, when the server reported one.
        code: Option<String>,
    },

    /// The pool has been ended.
    #[error("pool is closed")]
    Closed,

    /// The driver gave up waiting.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Any other backend failure.
    #[error("driver error: {0}")]
    Backend(#[source] BoxError),
}

impl DriverError {
    /// Create a statement error without a SQLSTATE code.
    pub fn statement(message: impl Into<String>) -> Self {
        Self::Statement {
            message: message.into(),
            code: None,
        }
    }

    /// Get the SQLSTATE code if this is a statement error that carries one.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Statement { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Check if this error concerns the connection rather than a statement.
    #[must_use]
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Closed | Self::Timeout(_))
    }
}
