//! WHERE conditions and join conditions.

use quill_core::{CompareOp, Predicate, Value};
use serde::{Deserialize, Serialize};

use super::SelectQuery;

/// A WHERE condition as handed over by the parser.
///
/// `InSubquery` is resolved into a plain membership [`Predicate`] before
/// the outer table is scanned.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Compare {
        column: String,
        op: CompareOp,
        value: Value,
    },
    InList {
        column: String,
        values: Vec<Value>,
    },
    InSubquery {
        column: String,
        subquery: Box<SelectQuery>,
    },
}

impl Condition {
    pub fn compare(column: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Condition::Compare {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn equals(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Eq, value)
    }

    pub fn in_list(column: impl Into<String>, values: Vec<Value>) -> Self {
        Condition::InList {
            column: column.into(),
            values,
        }
    }

    pub fn in_subquery(column: impl Into<String>, subquery: SelectQuery) -> Self {
        Condition::InSubquery {
            column: column.into(),
            subquery: Box::new(subquery),
        }
    }

    pub fn column(&self) -> &str {
        match self {
            Condition::Compare { column, .. }
            | Condition::InList { column, .. }
            | Condition::InSubquery { column, .. } => column,
        }
    }

    /// Converts to a predicate without executing anything. Returns None
    /// for subquery conditions.
    pub fn to_predicate(&self) -> Option<Predicate> {
        match self {
            Condition::Compare { column, op, value } => Some(Predicate::compare(column.clone(), *op, value.clone())),
            Condition::InList { column, values } => Some(Predicate::is_in(column.clone(), values.clone())),
            Condition::InSubquery { .. } => None,
        }
    }

    /// Nesting depth of subqueries below this condition.
    pub fn depth(&self) -> usize {
        match self {
            Condition::InSubquery { subquery, .. } => {
                1 + subquery.condition.as_ref().map_or(0, Condition::depth)
            }
            _ => 0,
        }
    }
}

/// `left_table.left_column = right_table.right_column`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinCondition {
    pub left_table: String,
    pub left_column: String,
    pub right_table: String,
    pub right_column: String,
}

impl JoinCondition {
    pub fn new(
        left_table: impl Into<String>,
        left_column: impl Into<String>,
        right_table: impl Into<String>,
        right_column: impl Into<String>,
    ) -> Self {
        Self {
            left_table: left_table.into(),
            left_column: left_column.into(),
            right_table: right_table.into(),
            right_column: right_column.into(),
        }
    }

    /// The same condition written the other way round.
    pub fn flipped(&self) -> Self {
        Self::new(
            self.right_table.clone(),
            self.right_column.clone(),
            self.left_table.clone(),
            self.left_column.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_predicate() {
        let c = Condition::compare("age", CompareOp::Gt, 30i64);
        assert_eq!(c.to_predicate(), Some(Predicate::compare("age", CompareOp::Gt, 30i64)));
        let sub = Condition::in_subquery("id", SelectQuery::columns("t", &["id"]));
        assert_eq!(sub.to_predicate(), None);
        assert_eq!(sub.column(), "id");
    }

    #[test]
    fn test_depth() {
        let inner = SelectQuery::columns("c", &["id"]).filter(Condition::equals("x", 1i64));
        let middle = SelectQuery::columns("b", &["id"]).filter(Condition::in_subquery("id", inner));
        let outer = Condition::in_subquery("id", middle);
        assert_eq!(outer.depth(), 2);
        assert_eq!(Condition::equals("a", 1i64).depth(), 0);
    }

    #[test]
    fn test_flipped() {
        let on = JoinCondition::new("students", "course_id", "courses", "id");
        let back = on.flipped();
        assert_eq!(back.left_table, "courses");
        assert_eq!(back.right_column, "course_id");
        assert_eq!(back.flipped(), on);
    }
}
