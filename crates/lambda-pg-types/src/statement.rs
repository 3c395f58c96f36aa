//! SQL statement with bound parameters.

use crate::value::Value;

/// A SQL statement and its positional parameters (`$1`, `$2`, ...).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statement {
    text: String,
    params: Vec<Value>,
}

impl Statement {
    /// Create a statement without parameters.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Vec::new(),
        }
    }

    /// Create a statement with parameters.
    pub fn with_params(text: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            text: text.into(),
            params,
        }
    }

    /// Append a parameter.
    #[must_use]
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    /// Get the SQL text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Get the bound parameters.
    #[must_use]
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Split into text and parameters.
    #[must_use]
    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.text, self.params)
    }
}

impl From<&str> for Statement {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Statement {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}
