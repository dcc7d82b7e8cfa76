//! Row predicates.
//!
//! A [`Predicate`] names its column; [`Predicate::bind`] resolves it
//! against a table schema into a [`BoundPredicate`] that evaluates rows by
//! position. Binding is where unknown columns and incomparable literals
//! are rejected, so evaluation itself never fails.

use core::cmp::Ordering;
use core::fmt;
use core::str::FromStr;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::row::Row;
use crate::schema::Table;
use crate::types::DataType;
use crate::value::Value;

/// Comparison operator of a `column op literal` predicate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    /// Whether `lhs op rhs` holds given `lhs.cmp(rhs) == ord`.
    #[inline]
    pub fn matches(&self, ord: Ordering) -> bool {
        match self {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Ne => ord != Ordering::Equal,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Le => ord != Ordering::Greater,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Ge => ord != Ordering::Less,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for CompareOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "=" | "==" => Ok(CompareOp::Eq),
            "!=" | "<>" => Ok(CompareOp::Ne),
            "<" => Ok(CompareOp::Lt),
            "<=" => Ok(CompareOp::Le),
            ">" => Ok(CompareOp::Gt),
            ">=" => Ok(CompareOp::Ge),
            other => Err(Error::schema(format!("unsupported operator: {}", other))),
        }
    }
}

/// An unbound single-column predicate.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    /// `column op value`
    Compare {
        column: String,
        op: CompareOp,
        value: Value,
    },
    /// `column IN (values...)`
    In { column: String, values: Vec<Value> },
}

impl Predicate {
    pub fn compare(column: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Predicate::Compare {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    /// Shorthand for `column = value`.
    pub fn equals(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Eq, value)
    }

    pub fn is_in(column: impl Into<String>, values: Vec<Value>) -> Self {
        Predicate::In {
            column: column.into(),
            values,
        }
    }

    pub fn column(&self) -> &str {
        match self {
            Predicate::Compare { column, .. } | Predicate::In { column, .. } => column,
        }
    }

    /// Resolves the column against `table` and checks the literal(s).
    pub fn bind(&self, table: &Table) -> Result<BoundPredicate> {
        let column = table.column_index(self.column())?;
        let data_type = table.columns()[column].data_type();
        let test = match self {
            Predicate::Compare { column: name, op, value } => {
                if !comparable(data_type, value) {
                    return Err(Error::type_mismatch(format!(
                        "cannot compare column '{}' of type {} with {} {}",
                        name,
                        data_type,
                        value.type_name(),
                        value
                    )));
                }
                let literal = value.normalize_for(data_type).unwrap_or_else(|| value.clone());
                Test::Compare(*op, literal)
            }
            // Members that no value of the column could equal are dropped.
            Predicate::In { values, .. } => Test::In(
                values
                    .iter()
                    .filter_map(|v| v.normalize_for(data_type))
                    .collect(),
            ),
        };
        Ok(BoundPredicate {
            column,
            data_type,
            test,
        })
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Compare { column, op, value } => write!(f, "{} {} {}", column, op, value),
            Predicate::In { column, values } => write!(f, "{} IN ({} values)", column, values.len()),
        }
    }
}

fn comparable(data_type: DataType, value: &Value) -> bool {
    match value.data_type() {
        None => false,
        Some(dt) => dt.is_numeric() == data_type.is_numeric(),
    }
}

#[derive(Clone, Debug)]
enum Test {
    Compare(CompareOp, Value),
    In(HashSet<Value>),
}

/// A predicate resolved to a column position.
#[derive(Clone, Debug)]
pub struct BoundPredicate {
    column: usize,
    data_type: DataType,
    test: Test,
}

impl BoundPredicate {
    #[inline]
    pub fn column_index(&self) -> usize {
        self.column
    }

    pub fn eval(&self, row: &Row) -> bool {
        self.eval_values(row.values())
    }

    pub fn eval_values(&self, values: &[Value]) -> bool {
        let value = match values.get(self.column) {
            Some(v) => v,
            None => return false,
        };
        match &self.test {
            Test::Compare(op, literal) => value.sql_cmp(literal).map_or(false, |o| op.matches(o)),
            Test::In(set) => set.contains(value),
        }
    }

    /// Keys an index on this column could answer the predicate with:
    /// `Some` for equality and membership tests, `None` otherwise.
    pub fn equality_keys(&self) -> Option<Vec<&Value>> {
        match &self.test {
            Test::Compare(CompareOp::Eq, literal) => {
                if literal.data_type() == Some(self.data_type) {
                    Some(vec![literal])
                } else {
                    // e.g. `int_col = 1.5`, which no stored value equals
                    Some(Vec::new())
                }
            }
            Test::Compare(..) => None,
            Test::In(set) => Some(set.iter().collect()),
        }
    }
}
