//! Query results.

use std::sync::Arc;

use crate::error::TypeError;
use crate::from_value::FromValue;
use crate::value::Value;

/// Something that can address a column in a [`Row`].
pub trait ColumnIndex {
    /// Resolve to a zero-based position within `columns`.
    fn position(&self, columns: &[String]) -> Result<usize, TypeError>;
}

impl ColumnIndex for usize {
    fn position(&self, columns: &[String]) -> Result<usize, TypeError> {
        if *self < columns.len() {
            Ok(*self)
        } else {
            Err(TypeError::ColumnIndexOutOfRange {
                index: *self,
                len: columns.len(),
            })
        }
    }
}

impl ColumnIndex for &str {
    fn position(&self, columns: &[String]) -> Result<usize, TypeError> {
        columns
            .iter()
            .position(|c| c == self)
            .ok_or_else(|| TypeError::ColumnNotFound((*self).to_string()))
    }
}

/// A single result row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    /// Get a typed column value by position or name.
    pub fn get<T: FromValue>(&self, index: impl ColumnIndex) -> Result<T, TypeError> {
        let position = index.position(&self.columns)?;
        match self.values.get(position) {
            Some(value) => T::from_value(value),
            None => Err(TypeError::ColumnIndexOutOfRange {
                index: position,
                len: self.values.len(),
            }),
        }
    }

    /// Get the raw value at a position.
    #[must_use]
    pub fn value(&self, position: usize) -> Option<&Value> {
        self.values.get(position)
    }

    /// Get all values in column order.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Get the column names.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of columns in the row.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Render the row as a JSON object keyed by column name.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .columns
            .iter()
            .zip(&self.values)
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect();
        serde_json::Value::Object(map)
    }
}

/// The outcome of a single statement.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    columns: Arc<[String]>,
    rows: Vec<Row>,
    rows_affected: u64,
    command: Option<String>,
}

impl QueryResult {
    /// Create an empty result with the given column names.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
            rows_affected: 0,
            command: None,
        }
    }

    /// Create a result for a statement that returns no rows.
    #[must_use]
    pub fn affected(rows_affected: u64) -> Self {
        Self {
            columns: Arc::from(Vec::new()),
            rows: Vec::new(),
            rows_affected,
            command: None,
        }
    }

    /// Append a row. Missing trailing values are padded with NULL.
    pub fn push_row(&mut self, mut values: Vec<Value>) {
        values.resize(self.columns.len(), Value::Null);
        self.rows.push(Row {
            columns: Arc::clone(&self.columns),
            values,
        });
        self.rows_affected = self.rows.len() as u64;
    }

    /// Builder-style variant of [`push_row`](Self::push_row).
    #[must_use]
    pub fn with_row(mut self, values: Vec<Value>) -> Self {
        self.push_row(values);
        self
    }

    /// Set the number of rows affected.
    #[must_use]
    pub fn with_rows_affected(mut self, rows_affected: u64) -> Self {
        self.rows_affected = rows_affected;
        self
    }

    /// Set the command tag (`INSERT`, `SELECT`, ...).
    #[must_use]
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Get the rows.
    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Get the first row, if any.
    #[must_use]
    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    /// Get the column names.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows returned or affected.
    #[must_use]
    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    /// Get the command tag, if the driver reported one.
    #[must_use]
    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    /// Number of rows returned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if no rows were returned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Consume the result and return its rows.
    #[must_use]
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample() -> QueryResult {
        QueryResult::new(["id", "name"])
            .with_row(vec![Value::Int(1), Value::Text("alice".into())])
            .with_row(vec![Value::Int(2)])
    }

    #[test]
    fn test_get_by_position_and_name() {
        let result = sample();
        let row = result.first().unwrap();
        assert_eq!(row.get::<i32>(0).unwrap(), 1);
        assert_eq!(row.get::<String>("name").unwrap(), "alice");
    }

    #[test]
    fn test_short_rows_are_padded() {
        let result = sample();
        assert_eq!(result.len(), 2);
        assert_eq!(result.rows_affected(), 2);
        let row = &result.rows()[1];
        assert_eq!(row.get::<Option<String>>("name").unwrap(), None);
    }

    #[test]
    fn test_missing_column() {
        let result = sample();
        let row = result.first().unwrap();
        assert!(matches!(
            row.get::<i32>("email"),
            Err(TypeError::ColumnNotFound(name)) if name == "email"
        ));
        assert!(matches!(
            row.get::<i32>(5),
            Err(TypeError::ColumnIndexOutOfRange { index: 5, len: 2 })
        ));
    }

    #[test]
    fn test_affected_only() {
        let result = QueryResult::affected(3).with_command("UPDATE");
        assert!(result.is_empty());
        assert_eq!(result.rows_affected(), 3);
        assert_eq!(result.command(), Some("UPDATE"));
    }

    #[test]
    fn test_row_to_json() {
        let result = sample();
        assert_eq!(
            result.first().unwrap().to_json(),
            serde_json::json!({"id": 1, "name": "alice"})
        );
    }
}
