//! Project executor.

use quill_core::{Error, Result, Row, Value};

use crate::executor::Relation;

/// Project executor - reduces rows to a subset of columns, in the order
/// requested.
pub struct ProjectExecutor {
    column_indices: Vec<usize>,
    names: Vec<String>,
}

impl ProjectExecutor {
    /// Creates a projection from explicit column positions.
    pub fn new(column_indices: Vec<usize>, names: Vec<String>) -> Self {
        Self { column_indices, names }
    }

    /// Resolves `columns` against the input's column names. An unknown
    /// column is a schema error; the input has not been read yet.
    pub fn by_name<S: AsRef<str>>(input: &Relation, columns: &[S]) -> Result<Self> {
        let mut indices = Vec::with_capacity(columns.len());
        let mut names = Vec::with_capacity(columns.len());
        for column in columns {
            let column = column.as_ref();
            let idx = input
                .column_index(column)
                .ok_or_else(|| Error::schema(format!("unknown column '{}' in result", column)))?;
            indices.push(idx);
            names.push(input.columns()[idx].clone());
        }
        Ok(Self::new(indices, names))
    }

    /// Executes the projection on the input relation.
    pub fn execute(&self, input: Relation) -> Relation {
        let tables = input.tables().to_vec();
        let origins = self
            .column_indices
            .iter()
            .map(|&idx| input.origin(idx).map(str::to_string))
            .collect();
        let rows = input
            .into_iter()
            .map(|row| {
                let values: Vec<Value> = self
                    .column_indices
                    .iter()
                    .map(|&idx| row.get(idx).cloned().unwrap_or(Value::Null))
                    .collect();
                Row::new(row.id(), values)
            })
            .collect();
        Relation::new(self.names.clone(), rows)
            .with_tables(tables)
            .with_origins(origins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Relation {
        Relation::from_table(
            "users",
            vec!["id".into(), "name".into(), "age".into()],
            vec![
                Row::new(1, vec![Value::Int(1), Value::from("Alice"), Value::Int(25)]),
                Row::new(2, vec![Value::Int(2), Value::from("Bob"), Value::Int(30)]),
            ],
        )
    }

    #[test]
    fn test_project_executor() {
        let executor = ProjectExecutor::new(vec![0, 2], vec!["id".into(), "age".into()]);
        let result = executor.execute(users());

        assert_eq!(result.len(), 2);
        assert_eq!(result.columns(), ["id", "age"]);
        let first = &result.rows()[0];
        assert_eq!(first.len(), 2);
        assert_eq!(first.id(), 1);
        assert_eq!(first.get(1), Some(&Value::Int(25)));
    }

    #[test]
    fn test_project_keeps_requested_order() {
        let input = users();
        let executor = ProjectExecutor::by_name(&input, &["age", "users.name"]).unwrap();
        let result = executor.execute(input);
        assert_eq!(result.columns(), ["age", "name"]);
        assert_eq!(result.rows()[1].values(), &[Value::Int(30), Value::from("Bob")]);
    }

    #[test]
    fn test_project_unknown_column() {
        let err = ProjectExecutor::by_name(&users(), &["salary"]).err().unwrap();
        assert_eq!(err.kind(), quill_core::ErrorKind::Schema);
    }
}
