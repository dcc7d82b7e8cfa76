//! `IN (subquery)` resolution.
//!
//! A nested SELECT runs to completion before the query that contains it
//! scans anything. Its single output column becomes the literal value set
//! of an ordinary membership predicate. Nested subqueries resolve the same
//! way, innermost first.

use hashbrown::HashSet;
use quill_core::{Error, Predicate, Result, Value};
use tracing::debug;

use crate::ast::{Condition, SelectQuery};
use crate::executor::{DataSource, QueryExecutor};

impl<'a, D: DataSource + ?Sized> QueryExecutor<'a, D> {
    /// Turns a condition into a predicate, executing any subquery first.
    pub fn resolve_condition(&mut self, condition: &Condition) -> Result<Predicate> {
        match condition {
            Condition::Compare { column, op, value } => Ok(Predicate::compare(column.clone(), *op, value.clone())),
            Condition::InList { column, values } => Ok(Predicate::is_in(column.clone(), values.clone())),
            Condition::InSubquery { column, subquery } => {
                let values = self.subquery_values(subquery)?;
                debug!(column = %column, table = %subquery.table, values = values.len(), "resolved subquery");
                Ok(Predicate::is_in(column.clone(), values))
            }
        }
    }

    /// Distinct values of a one-column subquery, in first-seen order.
    fn subquery_values(&mut self, subquery: &SelectQuery) -> Result<Vec<Value>> {
        let relation = self.select(subquery)?;
        if relation.columns().len() != 1 {
            return Err(Error::schema(format!(
                "subquery on '{}' must select exactly one column, got {}",
                subquery.table,
                relation.columns().len()
            )));
        }
        let mut seen = HashSet::with_capacity(relation.len());
        Ok(relation
            .into_iter()
            .filter_map(|row| row.into_values().into_iter().next())
            .filter(|v| !v.is_null() && seen.insert(v.clone()))
            .collect())
    }
}
