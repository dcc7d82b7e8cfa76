//! Relation type for query results.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use quill_core::{Row, Value};

/// An ordered set of rows under named columns.
///
/// Rows keep the locator of the stored row they came from; rows built by
/// joins and aggregates carry `DUMMY_ROW_ID`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Relation {
    columns: Vec<String>,
    rows: Vec<Row>,
    /// Tables the rows were read from, in join order.
    tables: Vec<String>,
    /// Table whose value each column holds, when known.
    origins: Vec<Option<String>>,
}

impl Relation {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            tables: Vec::new(),
            origins: Vec::new(),
        }
    }

    /// Creates a relation over rows of one table.
    pub fn from_table(table: impl Into<String>, columns: Vec<String>, rows: Vec<Row>) -> Self {
        let table = table.into();
        Self {
            origins: vec![Some(table.clone()); columns.len()],
            columns,
            rows,
            tables: vec![table],
        }
    }

    /// Creates a relation from bare value vectors.
    pub fn from_values(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let rows = rows.into_iter().enumerate().map(|(i, v)| Row::new(i as u64, v)).collect();
        Self::new(columns, rows)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    pub(crate) fn with_tables(mut self, tables: Vec<String>) -> Self {
        self.tables = tables;
        self
    }

    pub(crate) fn with_origins(mut self, origins: Vec<Option<String>>) -> Self {
        self.origins = origins;
        self
    }

    /// Table whose value the column at `index` holds. Columns of a
    /// single-table relation all belong to that table.
    pub fn origin(&self, index: usize) -> Option<&str> {
        match self.origins.get(index) {
            Some(origin) => origin.as_deref(),
            None if self.tables.len() == 1 && index < self.columns.len() => Some(self.tables[0].as_str()),
            None => None,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter()
    }

    /// Position of a column. `table.column` only matches a column that
    /// holds that table's value.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        if let Some(idx) = self.columns.iter().position(|c| c == name) {
            return Some(idx);
        }
        let (table, column) = name.split_once('.')?;
        (0..self.columns.len()).find(|&i| self.columns[i] == column && self.origin(i) == Some(table))
    }

    /// Value of `column` in row `row`.
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)
    }

    /// All values of the column at `index`, in row order.
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows.iter().filter_map(move |r| r.get(index))
    }

    /// Rows as `(column, value)` pairs in column order.
    pub fn records(&self) -> Vec<Vec<(&str, &Value)>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .map(String::as_str)
                    .zip(row.values().iter())
                    .collect()
            })
            .collect()
    }

    pub fn truncate(&mut self, len: usize) {
        self.rows.truncate(len);
    }
}

impl IntoIterator for Relation {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

struct RecordRef<'a> {
    columns: &'a [String],
    row: &'a Row,
}

impl Serialize for RecordRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in self.columns.iter().zip(self.row.values()) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Serializes as a sequence of row objects whose keys follow column order.
impl Serialize for Relation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for row in &self.rows {
            seq.serialize_element(&RecordRef {
                columns: &self.columns,
                row,
            })?;
        }
        seq.end()
    }
}
