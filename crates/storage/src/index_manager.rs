//! Key indexes of a row store.
//!
//! One unique `HashIndex<Value>` per key column (the primary key and each
//! unique column). The indexes are derived from the row set: they are built
//! from a full pass on load and can be rebuilt at any time.

use quill_core::schema::Table;
use quill_core::{Error, Result, Row, RowId, Value};
use quill_index::{HashIndex, Index, IndexError};

#[derive(Clone, Debug)]
struct KeyIndex {
    column: usize,
    name: String,
    index: HashIndex<Value>,
}

/// Point-lookup indexes over a table's key columns.
#[derive(Clone, Debug, Default)]
pub struct IndexManager {
    indexes: Vec<KeyIndex>,
}

impl IndexManager {
    /// Creates empty indexes for every key column of `schema`.
    pub fn new(schema: &Table) -> Self {
        let indexes = schema
            .key_column_indices()
            .into_iter()
            .map(|column| KeyIndex {
                column,
                name: schema.columns()[column].name().to_string(),
                index: HashIndex::new(true),
            })
            .collect();
        Self { indexes }
    }

    /// Builds indexes from a full pass over `rows`.
    pub fn build<'a>(schema: &Table, rows: impl IntoIterator<Item = &'a Row>) -> Result<Self> {
        let mut manager = Self::new(schema);
        for row in rows {
            manager.on_insert(row)?;
        }
        Ok(manager)
    }

    /// Discards and rebuilds every index.
    pub fn rebuild<'a>(&mut self, schema: &Table, rows: impl IntoIterator<Item = &'a Row>) -> Result<()> {
        *self = Self::build(schema, rows)?;
        Ok(())
    }

    /// Whether `column` has an index.
    pub fn covers(&self, column: usize) -> bool {
        self.indexes.iter().any(|k| k.column == column)
    }

    pub fn indexed_columns(&self) -> impl Iterator<Item = &str> + '_ {
        self.indexes.iter().map(|k| k.name.as_str())
    }

    /// Locators stored under `key` in the index on `column`, or None if the
    /// column is not indexed. An absent key yields an empty vector.
    pub fn lookup(&self, column: usize, key: &Value) -> Option<Vec<RowId>> {
        self.indexes
            .iter()
            .find(|k| k.column == column)
            .map(|k| k.index.get(key))
    }

    /// Fails with `ConstraintViolation` if any key value of `values` is
    /// already taken by a row other than `except`.
    pub fn check_unique(&self, values: &[Value], except: Option<RowId>) -> Result<()> {
        for key in &self.indexes {
            let value = &values[key.column];
            let holders = key.index.get(value);
            if holders.iter().any(|id| Some(*id) != except) {
                return Err(Error::constraint_violation(&key.name, value.clone()));
            }
        }
        Ok(())
    }

    /// Adds the mappings of a new row. Either every index gains the row or,
    /// on a duplicate, none does.
    pub fn on_insert(&mut self, row: &Row) -> Result<()> {
        for i in 0..self.indexes.len() {
            let key = &mut self.indexes[i];
            let value = row.values()[key.column].clone();
            if let Err(IndexError::DuplicateKey) = key.index.add(value.clone(), row.id()) {
                let column = key.name.clone();
                for done in &mut self.indexes[..i] {
                    done.index.remove(&row.values()[done.column], Some(row.id()));
                }
                return Err(Error::constraint_violation(column, value));
            }
        }
        Ok(())
    }

    /// Removes the mappings of a deleted row.
    pub fn on_delete(&mut self, row: &Row) {
        for key in &mut self.indexes {
            key.index.remove(&row.values()[key.column], Some(row.id()));
        }
    }

    /// Moves mappings whose key value changed; unchanged keys are left alone.
    /// The stale mapping is removed before the new one is added.
    pub fn on_update(&mut self, old: &Row, new: &Row) -> Result<()> {
        let mut moved: Vec<usize> = Vec::new();
        for i in 0..self.indexes.len() {
            let key = &mut self.indexes[i];
            let before = &old.values()[key.column];
            let after = &new.values()[key.column];
            if before == after {
                continue;
            }
            key.index.remove(before, Some(old.id()));
            if key.index.add(after.clone(), new.id()).is_err() {
                key.index
                    .add(before.clone(), old.id())
                    .map_err(|_| Error::constraint_violation(&key.name, before.clone()))?;
                let err = Error::constraint_violation(&key.name, after.clone());
                for &j in &moved {
                    let done = &mut self.indexes[j];
                    done.index.remove(&new.values()[done.column], Some(new.id()));
                    let _ = done.index.add(old.values()[done.column].clone(), old.id());
                }
                return Err(err);
            }
            moved.push(i);
        }
        Ok(())
    }

    /// Cheap consistency check: every index must hold exactly one entry per row.
    pub fn is_consistent_with(&self, row_count: usize) -> bool {
        self.indexes.iter().all(|k| k.index.len() == row_count)
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }
}
