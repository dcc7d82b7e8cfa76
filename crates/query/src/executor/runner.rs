//! Query runner - evaluates SELECT and JOIN commands against a data source.
//!
//! The [`QueryExecutor`] reads tables only through a [`DataSource`]. The
//! source decides how a table is reached (locks, cache reloads, a
//! transaction's working copy); the executor only sees schemas and rows.

use hashbrown::HashMap;
use quill_core::schema::Table;
use quill_core::{Error, Predicate, Result, Row, Value};
use tracing::debug;

use crate::ast::{AggregateFunc, Condition, JoinCondition, SelectItem, SelectQuery};
use crate::executor::{AggregateExecutor, BuildSide, HashJoin, ProjectExecutor, Relation};

/// Data source trait for providing table schemas and rows.
pub trait DataSource {
    /// Returns the current schema of a table.
    fn schema(&mut self, table: &str) -> Result<Table>;

    /// Returns the rows of `table` matching `predicate`, at most `limit`
    /// of them, in row order.
    fn scan(&mut self, table: &str, predicate: Option<&Predicate>, limit: Option<usize>) -> Result<Vec<Row>>;
}

/// Evaluates queries over a [`DataSource`].
pub struct QueryExecutor<'a, D: DataSource + ?Sized> {
    pub(crate) source: &'a mut D,
}

impl<'a, D: DataSource + ?Sized> QueryExecutor<'a, D> {
    pub fn new(source: &'a mut D) -> Self {
        Self { source }
    }

    /// Runs a SELECT: filtered scan with projection, or an aggregate when
    /// the SELECT list holds aggregate calls.
    pub fn select(&mut self, query: &SelectQuery) -> Result<Relation> {
        let schema = self.source.schema(&query.table)?;
        if query.is_aggregate() {
            let executor = AggregateExecutor::from_items(&schema, &query.items)?;
            let mut result = self.run_aggregate(&schema, &executor, query.condition.as_ref())?;
            if let Some(limit) = query.limit {
                result.truncate(limit);
            }
            return Ok(result);
        }

        let projection = projection(&schema, &query.items)?;
        let predicate = self.resolve_optional(query.condition.as_ref())?;
        let rows = self.source.scan(&query.table, predicate.as_ref(), query.limit)?;
        debug!(table = %query.table, rows = rows.len(), "select");
        let relation = Relation::from_table(schema.name(), schema.column_names(), rows);
        Ok(match projection {
            Some(project) => project.execute(relation),
            None => relation,
        })
    }

    /// Computes aggregate calls over the rows of `table` matching
    /// `condition`.
    pub fn aggregate(
        &mut self,
        table: &str,
        calls: &[(AggregateFunc, Option<String>)],
        condition: Option<&Condition>,
    ) -> Result<Relation> {
        let schema = self.source.schema(table)?;
        let executor = AggregateExecutor::new(&schema, calls)?;
        self.run_aggregate(&schema, &executor, condition)
    }

    fn run_aggregate(&mut self, schema: &Table, executor: &AggregateExecutor, condition: Option<&Condition>) -> Result<Relation> {
        let predicate = self.resolve_optional(condition)?;
        let rows = self.source.scan(schema.name(), predicate.as_ref(), None)?;
        debug!(table = schema.name(), rows = rows.len(), "aggregate");
        Ok(executor.execute(&rows)?.with_tables(vec![schema.name().to_string()]))
    }

    /// Equi-joins `left` and `right` with a hash join, then keeps
    /// `columns` (all of them when empty).
    pub fn join(&mut self, left: &str, right: &str, on: &JoinCondition, columns: &[String]) -> Result<Relation> {
        let on = if on.left_table == left && on.right_table == right {
            on.clone()
        } else if on.left_table == right && on.right_table == left {
            on.flipped()
        } else {
            return Err(Error::schema(format!(
                "join condition {}.{} = {}.{} does not relate '{}' and '{}'",
                on.left_table, on.left_column, on.right_table, on.right_column, left, right
            )));
        };

        let left_schema = self.source.schema(left)?;
        let right_schema = self.source.schema(right)?;
        let left_key = left_schema.column_index(&on.left_column)?;
        let right_key = right_schema.column_index(&on.right_column)?;
        let left_type = left_schema.columns()[left_key].data_type();
        let right_type = right_schema.columns()[right_key].data_type();
        if left_type.is_numeric() != right_type.is_numeric() {
            return Err(Error::type_mismatch(format!(
                "cannot join {}.{} ({}) with {}.{} ({})",
                left, on.left_column, left_type, right, on.right_column, right_type
            )));
        }

        let picks = columns
            .iter()
            .map(|name| JoinPick::resolve(name, left, &left_schema, right, &right_schema))
            .collect::<Result<Vec<_>>>()?;

        let left_rows = self.source.scan(left, None, None)?;
        let right_rows = self.source.scan(right, None, None)?;
        let join = HashJoin::new(left_key, right_key);
        let build = join.resolve_build_side(left_rows.len(), right_rows.len());
        debug!(
            left,
            right,
            left_rows = left_rows.len(),
            right_rows = right_rows.len(),
            build = ?build,
            "hash join"
        );
        if picks.is_empty() {
            return Ok(join.execute(
                Relation::from_table(left, left_schema.column_names(), left_rows),
                Relation::from_table(right, right_schema.column_names(), right_rows),
            ));
        }

        // Qualified input columns never fold, so each side's value stays
        // reachable for the projection.
        let result = join.execute(
            Relation::from_table(left, qualified(left, &left_schema), left_rows),
            Relation::from_table(right, qualified(right, &right_schema), right_rows),
        );
        let probe = if build == BuildSide::Left { right } else { left };
        let mut indices = Vec::with_capacity(picks.len());
        let mut names = Vec::with_capacity(picks.len());
        for pick in &picks {
            let (table, column) = match pick {
                JoinPick::Left(column) => (left, column),
                JoinPick::Right(column) => (right, column),
                JoinPick::Shared(column) => (probe, column),
            };
            let wanted = format!("{}.{}", table, column);
            let idx = result
                .columns()
                .iter()
                .position(|c| *c == wanted)
                .ok_or_else(|| Error::schema(format!("unknown column '{}' in result", wanted)))?;
            indices.push(idx);
            names.push(column.clone());
        }
        Ok(ProjectExecutor::new(indices, names).execute(result))
    }

    fn resolve_optional(&mut self, condition: Option<&Condition>) -> Result<Option<Predicate>> {
        condition.map(|c| self.resolve_condition(c)).transpose()
    }
}

/// Projection for a plain SELECT list; None when every column is kept in
/// table order.
fn projection(schema: &Table, items: &[SelectItem]) -> Result<Option<ProjectExecutor>> {
    if items.iter().all(|item| matches!(item, SelectItem::Star)) {
        return Ok(None);
    }
    let mut names = Vec::new();
    for item in items {
        match item {
            SelectItem::Star => names.extend(schema.column_names()),
            SelectItem::Column(name) => names.push(name.clone()),
            SelectItem::Aggregate { .. } => {
                return Err(Error::schema("cannot mix aggregate and plain columns in one SELECT"))
            }
        }
    }
    let shape = Relation::from_table(schema.name(), schema.column_names(), Vec::new());
    if let Some(missing) = names.iter().find(|n| shape.column_index(n).is_none()) {
        return Err(Error::column_not_found(schema.name(), missing));
    }
    ProjectExecutor::by_name(&shape, &names).map(Some)
}

/// An in-memory data source for tests and benchmarks.
#[derive(Debug, Default)]
pub struct InMemoryDataSource {
    tables: HashMap<String, (Table, Vec<Row>)>,
}

impl InMemoryDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table; every row is checked against the schema.
    pub fn add_table(&mut self, table: Table, rows: Vec<Vec<Value>>) -> Result<()> {
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(i, values)| Ok(Row::new(i as u64, table.check_row(values)?)))
            .collect::<Result<Vec<_>>>()?;
        self.tables.insert(table.name().to_string(), (table, rows));
        Ok(())
    }

    fn get(&self, table: &str) -> Result<&(Table, Vec<Row>)> {
        self.tables.get(table).ok_or_else(|| Error::table_not_found(table))
    }
}

impl DataSource for InMemoryDataSource {
    fn schema(&mut self, table: &str) -> Result<Table> {
        Ok(self.get(table)?.0.clone())
    }

    fn scan(&mut self, table: &str, predicate: Option<&Predicate>, limit: Option<usize>) -> Result<Vec<Row>> {
        let (schema, rows) = self.get(table)?;
        let bound = predicate.map(|p| p.bind(schema)).transpose()?;
        Ok(rows
            .iter()
            .filter(|row| bound.as_ref().map_or(true, |b| b.eval(row)))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }
}

/// Where a projected join column is read from.
enum JoinPick {
    Left(String),
    Right(String),
    /// Present in both inputs; the merged row keeps the probe side's value.
    Shared(String),
}

impl JoinPick {
    fn resolve(name: &str, left: &str, left_schema: &Table, right: &str, right_schema: &Table) -> Result<Self> {
        let unknown = || Error::schema(format!("unknown column '{}' in result", name));
        if let Some((table, column)) = name.split_once('.') {
            return if table == left && left_schema.get_column_index(column).is_some() {
                Ok(JoinPick::Left(column.to_string()))
            } else if table == right && right_schema.get_column_index(column).is_some() {
                Ok(JoinPick::Right(column.to_string()))
            } else {
                Err(unknown())
            };
        }
        match (
            left_schema.get_column_index(name).is_some(),
            right_schema.get_column_index(name).is_some(),
        ) {
            (true, true) => Ok(JoinPick::Shared(name.to_string())),
            (true, false) => Ok(JoinPick::Left(name.to_string())),
            (false, true) => Ok(JoinPick::Right(name.to_string())),
            (false, false) => Err(unknown()),
        }
    }
}

fn qualified(table: &str, schema: &Table) -> Vec<String> {
    schema
        .column_names()
        .into_iter()
        .map(|column| format!("{}.{}", table, column))
        .collect()
}
