//! Batch items for transactional execution.
//!
//! A batch is an ordered list of [`QuerySpec`]s. Raw items run as given.
//! Dependent items name an earlier item by position and may carry a
//! resolver that rewrites the statement from that item's result, which is
//! how an `INSERT ... RETURNING id` feeds the next statement of the same
//! transaction.

use std::fmt;
use std::sync::Arc;

use lambda_pg_types::{QueryResult, Statement};

/// Rewrites a dependent statement from the result it depends on.
pub type Resolver = Arc<dyn Fn(&Statement, &QueryResult) -> Statement + Send + Sync>;

/// A statement whose final form depends on an earlier result.
#[derive(Clone)]
pub struct DependentQuery {
    /// The statement as written.
    pub statement: Statement,
    /// Zero-based position of the batch item this one depends on.
    pub depends_on: usize,
    resolver: Option<Resolver>,
}

impl DependentQuery {
    /// Create a dependent query without a resolver.
    ///
    /// Without a resolver the statement runs as written.
    pub fn new(statement: impl Into<Statement>, depends_on: usize) -> Self {
        Self {
            statement: statement.into(),
            depends_on,
            resolver: None,
        }
    }

    /// Attach a resolver.
    #[must_use]
    pub fn with_resolver<F>(mut self, resolve: F) -> Self
    where
        F: Fn(&Statement, &QueryResult) -> Statement + Send + Sync + 'static,
    {
        self.resolver = Some(Arc::new(resolve));
        self
    }

    /// Check if a resolver is attached.
    #[must_use]
    pub fn has_resolver(&self) -> bool {
        self.resolver.is_some()
    }

    /// Compute the statement to execute given the result depended on.
    #[must_use]
    pub fn resolve(&self, previous: &QueryResult) -> Option<Statement> {
        self.resolver
            .as_ref()
            .map(|resolve| resolve(&self.statement, previous))
    }
}

impl fmt::Debug for DependentQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependentQuery")
            .field("statement", &self.statement)
            .field("depends_on", &self.depends_on)
            .field("resolver", &self.resolver.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// One item of a transaction batch.
#[derive(Debug, Clone)]
pub enum QuerySpec {
    /// Execute the statement as given.
    Raw(Statement),
    /// Execute a statement derived from an earlier result.
    Dependent(DependentQuery),
}

impl QuerySpec {
    /// Create a raw item.
    pub fn raw(statement: impl Into<Statement>) -> Self {
        Self::Raw(statement.into())
    }

    /// Create a dependent item with a resolver.
    pub fn dependent<F>(statement: impl Into<Statement>, depends_on: usize, resolve: F) -> Self
    where
        F: Fn(&Statement, &QueryResult) -> Statement + Send + Sync + 'static,
    {
        Self::Dependent(DependentQuery::new(statement, depends_on).with_resolver(resolve))
    }

    /// The statement as written.
    #[must_use]
    pub fn statement(&self) -> &Statement {
        match self {
            Self::Raw(statement) => statement,
            Self::Dependent(query) => &query.statement,
        }
    }

    /// Position this item depends on, if any.
    #[must_use]
    pub fn depends_on(&self) -> Option<usize> {
        match self {
            Self::Raw(_) => None,
            Self::Dependent(query) => Some(query.depends_on),
        }
    }
}

impl From<Statement> for QuerySpec {
    fn from(statement: Statement) -> Self {
        Self::Raw(statement)
    }
}

impl From<&str> for QuerySpec {
    fn from(sql: &str) -> Self {
        Self::Raw(Statement::new(sql))
    }
}

impl From<DependentQuery> for QuerySpec {
    fn from(query: DependentQuery) -> Self {
        Self::Dependent(query)
    }
}
