//! Hash Join implementation.

use std::borrow::Cow;

use hashbrown::HashMap;
use quill_core::Value;
use tracing::trace;

use super::{join_key, JoinLayout};
use crate::executor::Relation;

/// Which input the hash table is built over.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildSide {
    /// The smaller input; the right one when both have the same size.
    Auto,
    Left,
    Right,
}

/// Hash Join executor.
///
/// Implements the classic equi-join:
/// 1. Build phase: map each join-key value of the build input to every
///    build row carrying it (duplicate keys keep all rows)
/// 2. Probe phase: scan the other input once and emit one merged row per
///    matching build row
///
/// On a column-name collision the probe row's value is kept.
#[derive(Clone, Debug)]
pub struct HashJoin {
    left_key_index: usize,
    right_key_index: usize,
    build: BuildSide,
}

impl HashJoin {
    /// Creates an inner hash join on `left[left_key_index] = right[right_key_index]`.
    pub fn new(left_key_index: usize, right_key_index: usize) -> Self {
        Self {
            left_key_index,
            right_key_index,
            build: BuildSide::Auto,
        }
    }

    /// Forces the build side instead of picking the smaller input.
    pub fn with_build_side(mut self, build: BuildSide) -> Self {
        self.build = build;
        self
    }

    /// The build side used for inputs of the given sizes.
    pub fn resolve_build_side(&self, left_len: usize, right_len: usize) -> BuildSide {
        match self.build {
            BuildSide::Auto if left_len < right_len => BuildSide::Left,
            BuildSide::Auto => BuildSide::Right,
            side => side,
        }
    }

    /// Executes the hash join.
    pub fn execute(&self, left: Relation, right: Relation) -> Relation {
        let layout = JoinLayout::new(left.columns(), right.columns());
        let side = self.resolve_build_side(left.len(), right.len());
        let build_left = side == BuildSide::Left;
        let (build_rel, probe_rel, build_key_idx, probe_key_idx) = if build_left {
            (&left, &right, self.left_key_index, self.right_key_index)
        } else {
            (&right, &left, self.right_key_index, self.left_key_index)
        };

        // Build phase
        let mut hash_table: HashMap<Cow<'_, Value>, Vec<u32>> = HashMap::with_capacity(build_rel.len());
        for (idx, row) in build_rel.rows().iter().enumerate() {
            if let Some(key) = row.get(build_key_idx).and_then(join_key) {
                hash_table.entry(key).or_default().push(idx as u32);
            }
        }
        trace!(
            build_left,
            build_rows = build_rel.len(),
            distinct_keys = hash_table.len(),
            "hash join build phase done"
        );

        // Probe phase
        let mut rows = Vec::with_capacity(probe_rel.len());
        for probe_row in probe_rel.rows() {
            let key = match probe_row.get(probe_key_idx).and_then(join_key) {
                Some(key) => key,
                None => continue,
            };
            if let Some(build_indices) = hash_table.get(&*key) {
                for &build_idx in build_indices {
                    let build_row = &build_rel.rows()[build_idx as usize];
                    let merged = if build_left {
                        layout.merge(build_row, probe_row, true)
                    } else {
                        layout.merge(probe_row, build_row, false)
                    };
                    rows.push(merged);
                }
            }
        }

        layout.finish(&left, &right, rows, build_left)
    }
}
