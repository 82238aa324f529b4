//! The data source seam: something that runs a relational statement.

use std::collections::BTreeMap;

use serde::Serialize;
use strata_core::Value;

use crate::error::QueryResult;
use crate::sql::SelectStatement;

/// One result row, keyed by output column name.
pub type Row = BTreeMap<String, Value>;

/// Builds a row from column/value pairs.
pub fn row<K: Into<String>>(columns: impl IntoIterator<Item = (K, Value)>) -> Row {
    columns.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// The rows produced by one statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RowSet {
    /// Output column names in selection order.
    pub columns: Vec<String>,
    /// The rows.
    pub rows: Vec<Row>,
}

impl RowSet {
    /// Creates an empty row set with the given columns.
    #[must_use]
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns, rows: Vec::new() }
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true when there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterates over the rows.
    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }
}

/// Executes relational statements against one store.
pub trait DataSource: Send + Sync {
    /// Runs `statement` to completion.
    fn execute(&self, statement: &SelectStatement) -> QueryResult<RowSet>;
}
