//! Tracing instrumentation for database operations.
//!
//! Executors run inside `tracing` spans named after the operation and
//! carrying attributes that follow the OpenTelemetry database semantic
//! conventions, so any subscriber (including an OpenTelemetry bridge)
//! receives structured data.
//!
//! ## Semantic Conventions
//!
//! - `db.system`: "postgresql"
//! - `db.statement`: SQL statement (sanitized if configured)
//! - `db.operation`: Query operation type (SELECT, INSERT, etc.)
//! - `db.postgresql.batch_size`: Number of statements in a transaction

use tracing::Span;

/// Database system identifier for PostgreSQL.
pub const DB_SYSTEM: &str = "postgresql";

/// Span names for database operations.
pub mod span_names {
    /// Span name for pool readiness (ensure, wait, acquire).
    pub const ACQUIRE: &str = "pg.acquire";
    /// Span name for single statement execution.
    pub const QUERY: &str = "pg.query";
    /// Span name for a transactional batch.
    pub const TRANSACTION: &str = "pg.transaction";
    /// Span name for one statement inside a transaction.
    pub const STATEMENT: &str = "pg.statement";
    /// Span name for rolling back a transaction.
    pub const ROLLBACK: &str = "pg.rollback";
}

/// Attribute keys recorded on a span after it is created.
pub mod attributes {
    /// Number of rows affected.
    pub const DB_ROWS_AFFECTED: &str = "db.rows_affected";
}

/// Span for getting a ready pool and checking a connection out of it.
#[must_use]
pub fn acquire_span() -> Span {
    tracing::debug_span!(span_names::ACQUIRE, db.system = DB_SYSTEM)
}

/// Span for rolling back a failed transaction.
#[must_use]
pub fn rollback_span() -> Span {
    tracing::debug_span!(span_names::ROLLBACK, db.system = DB_SYSTEM)
}

/// Configuration for SQL statement sanitization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizationConfig {
    /// Whether to sanitize SQL statements.
    pub enabled: bool,
    /// Maximum length of statement to record.
    pub max_length: usize,
    /// Placeholder to use for sanitized values.
    pub placeholder: String,
}

impl Default for SanitizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_length: 2048,
            placeholder: "?".to_string(),
        }
    }
}

impl SanitizationConfig {
    /// Create a configuration that doesn't sanitize statements.
    #[must_use]
    pub fn no_sanitization() -> Self {
        Self {
            enabled: false,
            max_length: usize::MAX,
            placeholder: String::new(),
        }
    }

    /// Sanitize a SQL statement according to the configuration.
    #[must_use]
    pub fn sanitize(&self, sql: &str) -> String {
        if !self.enabled {
            return truncate_string(sql, self.max_length);
        }

        let sanitized = sanitize_sql(sql, &self.placeholder);
        truncate_string(&sanitized, self.max_length)
    }

    /// Span for a single statement.
    #[must_use]
    pub fn query_span(&self, sql: &str) -> Span {
        tracing::info_span!(
            span_names::QUERY,
            db.system = DB_SYSTEM,
            db.operation = extract_operation(sql),
            db.statement = %self.sanitize(sql),
            db.rows_affected = tracing::field::Empty,
        )
    }

    /// Span for a transactional batch.
    #[must_use]
    pub fn transaction_span(&self, batch_size: usize, isolation_level: &str) -> Span {
        tracing::info_span!(
            span_names::TRANSACTION,
            db.system = DB_SYSTEM,
            db.postgresql.batch_size = batch_size,
            db.postgresql.isolation_level = isolation_level,
        )
    }

    /// Span for one statement of a batch.
    #[must_use]
    pub fn statement_span(&self, index: usize, sql: &str) -> Span {
        tracing::debug_span!(
            span_names::STATEMENT,
            index,
            db.operation = extract_operation(sql),
            db.statement = %self.sanitize(sql),
        )
    }
}

/// Sanitize SQL by replacing literal values with placeholders.
///
/// Single-quoted strings and numeric literals are replaced. Double-quoted
/// identifiers and `$n` parameter markers are kept.
fn sanitize_sql(sql: &str, placeholder: &str) -> String {
    let mut result = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            if c == '\'' {
                // Check for escaped quote
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    continue;
                }
                in_string = false;
                result.push_str(placeholder);
            }
            continue;
        }

        if c == '\'' {
            in_string = true;
            continue;
        }

        if c.is_ascii_digit()
            && !result.ends_with(|ch: char| ch.is_alphanumeric() || ch == '_' || ch == '$')
        {
            while chars
                .peek()
                .is_some_and(|ch| ch.is_ascii_digit() || *ch == '.')
            {
                chars.next();
            }
            result.push_str(placeholder);
            continue;
        }

        result.push(c);
    }

    // If we ended in a string, close it
    if in_string {
        result.push_str(placeholder);
    }

    result
}

/// Truncate a string to at most `max_len` bytes, on a character boundary.
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len.saturating_sub(3);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

/// Extract the operation type from a SQL statement.
#[must_use]
pub fn extract_operation(sql: &str) -> &'static str {
    let sql_upper = sql.trim_start().to_ascii_uppercase();

    const OPERATIONS: &[&str] = &[
        "SELECT", "INSERT", "UPDATE", "DELETE", "WITH", "BEGIN", "COMMIT", "ROLLBACK", "CREATE",
        "ALTER", "DROP", "TRUNCATE", "CALL",
    ];
    OPERATIONS
        .iter()
        .find(|op| sql_upper.starts_with(**op))
        .copied()
        .unwrap_or("OTHER")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_operation() {
        assert_eq!(extract_operation("SELECT * FROM users"), "SELECT");
        assert_eq!(extract_operation("  select id from users"), "SELECT");
        assert_eq!(extract_operation("INSERT INTO users VALUES (1)"), "INSERT");
        assert_eq!(extract_operation("UPDATE users SET name = 'foo'"), "UPDATE");
        assert_eq!(extract_operation("DELETE FROM users"), "DELETE");
        assert_eq!(extract_operation("WITH t AS (SELECT 1) SELECT * FROM t"), "WITH");
        assert_eq!(extract_operation("BEGIN ISOLATION LEVEL SERIALIZABLE"), "BEGIN");
        assert_eq!(extract_operation("COMMIT"), "COMMIT");
        assert_eq!(extract_operation("ROLLBACK"), "ROLLBACK");
        assert_eq!(extract_operation("CREATE TABLE foo"), "CREATE");
        assert_eq!(extract_operation("unknown stuff"), "OTHER");
    }

    #[test]
    fn test_sanitize_sql() {
        let placeholder = "?";

        // String literals
        assert_eq!(
            sanitize_sql("SELECT * FROM users WHERE name = 'Alice'", placeholder),
            "SELECT * FROM users WHERE name = ?"
        );

        // Escaped quotes
        assert_eq!(
            sanitize_sql("SELECT * WHERE name = 'O''Brien'", placeholder),
            "SELECT * WHERE name = ?"
        );

        // Numbers
        assert_eq!(
            sanitize_sql("SELECT * WHERE id = 123 LIMIT 10", placeholder),
            "SELECT * WHERE id = ? LIMIT ?"
        );

        // Parameter markers and quoted identifiers survive
        assert_eq!(
            sanitize_sql("SELECT \"col1\" FROM t2 WHERE id = $1", placeholder),
            "SELECT \"col1\" FROM t2 WHERE id = $1"
        );
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("hello", 10), "hello");
        assert_eq!(truncate_string("hello world", 8), "hello...");
        assert_eq!(truncate_string("hi", 2), "hi");
        // Multi-byte characters are never split
        assert_eq!(truncate_string("ééééé", 6), "é...");
    }

    #[test]
    fn test_sanitization_config_no_sanitization() {
        let config = SanitizationConfig::no_sanitization();
        assert!(!config.enabled);

        let sql = "SELECT * FROM users WHERE name = 'Alice'";
        assert_eq!(config.sanitize(sql), sql);
    }

    #[test]
    fn test_spans_use_named_constants() {
        let config = SanitizationConfig::default();
        tracing::subscriber::with_default(tracing_subscriber::registry(), || {
            let name = |span: Span| span.metadata().map(|m| m.name());
            assert_eq!(name(config.query_span("SELECT 1")), Some(span_names::QUERY));
            assert_eq!(
                name(config.transaction_span(2, "READ COMMITTED")),
                Some(span_names::TRANSACTION)
            );
            assert_eq!(
                name(config.statement_span(0, "INSERT INTO t VALUES (1)")),
                Some(span_names::STATEMENT)
            );
            assert_eq!(name(acquire_span()), Some(span_names::ACQUIRE));
            assert_eq!(name(rollback_span()), Some(span_names::ROLLBACK));
        });
    }

    #[test]
    fn test_query_span_declares_rows_affected() {
        let config = SanitizationConfig::default();
        tracing::subscriber::with_default(tracing_subscriber::registry(), || {
            let span = config.query_span("UPDATE t SET a = 1");
            assert!(span.has_field(attributes::DB_ROWS_AFFECTED));
        });
    }
}
