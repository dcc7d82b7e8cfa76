//! Staging log of a transaction.
//!
//! Writes issued under BEGIN are recorded as [`StagedOp`]s, in the order
//! they were issued, and replayed against fresh copies of the stores at
//! COMMIT.

use std::collections::BTreeSet;

use quill_core::{Predicate, Result, Value};

use crate::row_store::RowStore;

/// One staged write.
#[derive(Clone, Debug, PartialEq)]
pub enum StagedOp {
    Insert {
        table: String,
        values: Vec<Value>,
    },
    Update {
        table: String,
        predicate: Option<Predicate>,
        assignments: Vec<(String, Value)>,
    },
    Delete {
        table: String,
        predicate: Option<Predicate>,
    },
}

impl StagedOp {
    pub fn table(&self) -> &str {
        match self {
            StagedOp::Insert { table, .. }
            | StagedOp::Update { table, .. }
            | StagedOp::Delete { table, .. } => table,
        }
    }

    /// Applies the write to `store`, returning the number of rows affected.
    pub fn apply(&self, store: &mut RowStore) -> Result<usize> {
        match self {
            StagedOp::Insert { values, .. } => store.insert(values.clone()).map(|_| 1),
            StagedOp::Update {
                predicate,
                assignments,
                ..
            } => store.update(predicate.as_ref(), assignments),
            StagedOp::Delete { predicate, .. } => store.delete(predicate.as_ref()),
        }
    }
}

/// Ordered log of staged writes.
#[derive(Clone, Debug, Default)]
pub struct Journal {
    entries: Vec<StagedOp>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, op: StagedOp) {
        self.entries.push(op);
    }

    pub fn entries(&self) -> &[StagedOp] {
        &self.entries
    }

    /// Tables touched by the log, in name order.
    pub fn tables(&self) -> BTreeSet<String> {
        self.entries.iter().map(|op| op.table().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Discards every staged write.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
