//! JOIN algorithm implementations.
//!
//! Both algorithms produce the same layout: every column of the left
//! input, followed by the right input's columns whose names are not
//! already present. A right column that shares a name with a left column
//! is folded into it, and which side's value survives depends on the
//! algorithm (see [`HashJoin`] and [`NestedLoopJoin`]).

mod hash;
mod nested;

use std::borrow::Cow;

use quill_core::{Row, Value};

use crate::executor::Relation;

pub use hash::{BuildSide, HashJoin};
pub use nested::NestedLoopJoin;

#[derive(Clone, Copy, Debug)]
enum Slot {
    Append,
    Shared(usize),
}

/// Output layout of a join of two column lists.
#[derive(Clone, Debug)]
pub(crate) struct JoinLayout {
    columns: Vec<String>,
    right_slots: Vec<Slot>,
}

impl JoinLayout {
    pub(crate) fn new(left: &[String], right: &[String]) -> Self {
        let mut columns = left.to_vec();
        let right_slots = right
            .iter()
            .map(|name| match left.iter().position(|c| c == name) {
                Some(idx) => Slot::Shared(idx),
                None => {
                    columns.push(name.clone());
                    Slot::Append
                }
            })
            .collect();
        Self { columns, right_slots }
    }

    pub(crate) fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Merges a matched pair. Shared columns take the right value when
    /// `prefer_right` is set, the left value otherwise.
    pub(crate) fn merge(&self, left: &Row, right: &Row, prefer_right: bool) -> Row {
        let mut values = Vec::with_capacity(self.columns.len());
        values.extend(left.values().iter().cloned());
        for (slot, value) in self.right_slots.iter().zip(right.values()) {
            match *slot {
                Slot::Append => values.push(value.clone()),
                Slot::Shared(idx) if prefer_right => values[idx] = value.clone(),
                Slot::Shared(_) => {}
            }
        }
        Row::dummy(values)
    }

    /// Joins the rows and records, for every output column, which input
    /// table its value comes from.
    pub(crate) fn finish(&self, left: &Relation, right: &Relation, rows: Vec<Row>, prefer_right: bool) -> Relation {
        let mut origins: Vec<Option<String>> = (0..left.columns().len())
            .map(|i| left.origin(i).map(str::to_string))
            .collect();
        for (j, slot) in self.right_slots.iter().enumerate() {
            let origin = right.origin(j).map(str::to_string);
            match *slot {
                Slot::Append => origins.push(origin),
                Slot::Shared(idx) if prefer_right => origins[idx] = origin,
                Slot::Shared(_) => {}
            }
        }
        let mut tables = left.tables().to_vec();
        tables.extend(right.tables().iter().cloned());
        Relation::new(self.columns.clone(), rows)
            .with_tables(tables)
            .with_origins(origins)
    }
}

/// Equality key of a join column value. Nulls never match; an integral
/// float matches the equal int.
pub(crate) fn join_key(value: &Value) -> Option<Cow<'_, Value>> {
    match value {
        Value::Null => None,
        Value::Float(f) if f.fract() == 0.0 && f.is_finite() && f.abs() < i64::MAX as f64 => {
            Some(Cow::Owned(Value::Int(*f as i64)))
        }
        _ => Some(Cow::Borrowed(value)),
    }
}
