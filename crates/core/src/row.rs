//! Row structure for Quill.
//!
//! A `Row` is a positional value vector aligned with its table's column
//! order, tagged with the locator the owning store assigned to it.

use crate::value::Value;

/// Locator of a row inside its store.
///
/// Assigned monotonically by the store on insert, so ascending ids follow
/// insertion order.
pub type RowId = u64;

/// Row id used for rows that don't live in a store, such as join output.
pub const DUMMY_ROW_ID: RowId = u64::MAX;

/// A row in a table or in a query result.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    id: RowId,
    values: Vec<Value>,
}

impl Row {
    pub fn new(id: RowId, values: Vec<Value>) -> Self {
        Self { id, values }
    }

    /// Creates a row that is not backed by a store.
    pub fn dummy(values: Vec<Value>) -> Self {
        Self::new(DUMMY_ROW_ID, values)
    }

    #[inline]
    pub fn id(&self) -> RowId {
        self.id
    }

    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Gets a value at the given column index.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Sets a value at the given column index; returns false when out of range.
    pub fn set(&mut self, index: usize, value: Value) -> bool {
        match self.values.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Appends a value, used when a column is added to the table.
    pub fn push(&mut self, value: Value) {
        self.values.push(value);
    }

    /// Removes the value at `index`, used when a column is dropped.
    pub fn remove(&mut self, index: usize) -> Option<Value> {
        if index < self.values.len() {
            Some(self.values.remove(index))
        } else {
            None
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
