//! Nested Loop Join implementation.

use quill_core::Value;

use super::{join_key, JoinLayout};
use crate::executor::Relation;

/// Nested Loop Join executor.
///
/// Compares every pair of rows, O(N×M). Kept as the reference the hash
/// join is checked against, and for non-equi conditions. On a
/// column-name collision the right row's value is kept.
#[derive(Clone, Debug)]
pub struct NestedLoopJoin {
    left_key_index: usize,
    right_key_index: usize,
}

impl NestedLoopJoin {
    pub fn new(left_key_index: usize, right_key_index: usize) -> Self {
        Self {
            left_key_index,
            right_key_index,
        }
    }

    /// Executes the join with equality comparison of the join keys.
    pub fn execute(&self, left: Relation, right: Relation) -> Relation {
        self.execute_with_predicate(left, right, |l, r| match (join_key(l), join_key(r)) {
            (Some(l), Some(r)) => l == r,
            _ => false,
        })
    }

    /// Executes the join with a custom key predicate. Null keys never
    /// match.
    pub fn execute_with_predicate<F>(&self, left: Relation, right: Relation, predicate: F) -> Relation
    where
        F: Fn(&Value, &Value) -> bool,
    {
        let layout = JoinLayout::new(left.columns(), right.columns());
        let mut rows = Vec::new();

        // Block-based nested loop for better cache locality
        const BLOCK_SIZE: usize = 256;
        for block in right.rows().chunks(BLOCK_SIZE) {
            for left_row in left.rows() {
                let left_val = match left_row.get(self.left_key_index) {
                    Some(v) if !v.is_null() => v,
                    _ => continue,
                };
                for right_row in block {
                    if let Some(right_val) = right_row.get(self.right_key_index) {
                        if !right_val.is_null() && predicate(left_val, right_val) {
                            rows.push(layout.merge(left_row, right_row, true));
                        }
                    }
                }
            }
        }

        layout.finish(&left, &right, rows, true)
    }
}
