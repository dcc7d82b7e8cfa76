//! Aggregate executor.

use core::cmp::Ordering;

use quill_core::schema::Table;
use quill_core::{DataType, Error, Result, Row, Value};

use crate::ast::{AggregateFunc, SelectItem};
use crate::executor::Relation;

/// One resolved aggregate call.
#[derive(Clone, Debug)]
struct AggregateCall {
    func: AggregateFunc,
    /// Column position, None for `COUNT(*)`.
    column: Option<usize>,
    data_type: Option<DataType>,
    name: String,
}

/// Aggregate executor - computes `COUNT`, `SUM`, `AVG`, `MIN` and `MAX`
/// over a whole input in a single pass.
///
/// Calls are checked against the table schema on construction, so a
/// numeric aggregate over a string column fails before any row is read.
#[derive(Clone, Debug)]
pub struct AggregateExecutor {
    calls: Vec<AggregateCall>,
}

impl AggregateExecutor {
    /// Resolves `calls` against `table`.
    pub fn new(table: &Table, calls: &[(AggregateFunc, Option<String>)]) -> Result<Self> {
        let calls = calls
            .iter()
            .map(|(func, column)| resolve(table, *func, column.as_deref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { calls })
    }

    /// Builds an executor from a SELECT list that holds only aggregates.
    pub fn from_items(table: &Table, items: &[SelectItem]) -> Result<Self> {
        let mut calls = Vec::with_capacity(items.len());
        for item in items {
            match item {
                SelectItem::Aggregate { func, column } => calls.push((*func, column.clone())),
                other => {
                    return Err(Error::schema(format!(
                        "cannot mix aggregate and plain column '{}' in one SELECT",
                        other.output_name()
                    )))
                }
            }
        }
        Self::new(table, &calls)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.calls.iter().map(|c| c.name.clone()).collect()
    }

    /// Computes every aggregate over `rows`, producing one result row.
    pub fn execute<'a>(&self, rows: impl IntoIterator<Item = &'a Row>) -> Result<Relation> {
        let mut accumulators: Vec<Accumulator> = self.calls.iter().map(Accumulator::new).collect();
        for row in rows {
            for (call, acc) in self.calls.iter().zip(accumulators.iter_mut()) {
                let value = match call.column {
                    Some(idx) => match row.get(idx) {
                        Some(v) if !v.is_null() => Some(v),
                        _ => continue,
                    },
                    None => None,
                };
                acc.update(value, call)?;
            }
        }
        let values = accumulators.into_iter().map(Accumulator::finish).collect();
        Ok(Relation::new(self.column_names(), vec![Row::dummy(values)]))
    }
}

fn resolve(table: &Table, func: AggregateFunc, column: Option<&str>) -> Result<AggregateCall> {
    let name = SelectItem::aggregate(func, column).output_name();
    let column = match column {
        None if func == AggregateFunc::Count => {
            return Ok(AggregateCall {
                func,
                column: None,
                data_type: None,
                name,
            })
        }
        None => return Err(Error::schema(format!("{} requires a column", func))),
        Some(column) => column,
    };
    let idx = table.column_index(column)?;
    let data_type = table.columns()[idx].data_type();
    if func.requires_numeric() && !data_type.is_numeric() {
        return Err(Error::type_mismatch(format!(
            "{} over non-numeric column '{}' of type {}",
            func, column, data_type
        )));
    }
    Ok(AggregateCall {
        func,
        column: Some(idx),
        data_type: Some(data_type),
        name,
    })
}

#[derive(Debug)]
enum Accumulator {
    Count(i64),
    SumInt(i64),
    SumFloat(f64),
    Avg { sum: f64, count: u64 },
    Min(Option<Value>),
    Max(Option<Value>),
}

impl Accumulator {
    fn new(call: &AggregateCall) -> Self {
        match call.func {
            AggregateFunc::Count => Accumulator::Count(0),
            AggregateFunc::Sum if call.data_type == Some(DataType::Int) => Accumulator::SumInt(0),
            AggregateFunc::Sum => Accumulator::SumFloat(0.0),
            AggregateFunc::Avg => Accumulator::Avg { sum: 0.0, count: 0 },
            AggregateFunc::Min => Accumulator::Min(None),
            AggregateFunc::Max => Accumulator::Max(None),
        }
    }

    /// `value` is None only for `COUNT(*)`.
    fn update(&mut self, value: Option<&Value>, call: &AggregateCall) -> Result<()> {
        match self {
            Accumulator::Count(n) => *n += 1,
            Accumulator::SumInt(sum) => {
                let v = value.and_then(Value::as_i64).unwrap_or(0);
                *sum = sum
                    .checked_add(v)
                    .ok_or_else(|| Error::type_mismatch(format!("{} overflows int", call.name)))?;
            }
            Accumulator::SumFloat(sum) => *sum += value.and_then(Value::as_f64).unwrap_or(0.0),
            Accumulator::Avg { sum, count } => {
                if let Some(v) = value.and_then(Value::as_f64) {
                    *sum += v;
                    *count += 1;
                }
            }
            Accumulator::Min(best) => keep_if(best, value, Ordering::Less),
            Accumulator::Max(best) => keep_if(best, value, Ordering::Greater),
        }
        Ok(())
    }

    fn finish(self) -> Value {
        match self {
            Accumulator::Count(n) => Value::Int(n),
            Accumulator::SumInt(sum) => Value::Int(sum),
            Accumulator::SumFloat(sum) => Value::Float(sum),
            Accumulator::Avg { count: 0, .. } => Value::Null,
            Accumulator::Avg { sum, count } => Value::Float(sum / count as f64),
            Accumulator::Min(v) | Accumulator::Max(v) => v.unwrap_or(Value::Null),
        }
    }
}

fn keep_if(best: &mut Option<Value>, candidate: Option<&Value>, wanted: Ordering) {
    let candidate = match candidate {
        Some(v) => v,
        None => return,
    };
    let replace = match best {
        None => true,
        Some(current) => candidate.sql_cmp(current) == Some(wanted),
    };
    if replace {
        *best = Some(candidate.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::schema::TableBuilder;
    use quill_core::ErrorKind;

    fn table() -> Table {
        TableBuilder::new("t")
            .unwrap()
            .add_column("n", DataType::Int)
            .unwrap()
            .add_column("f", DataType::Float)
            .unwrap()
            .add_column("s", DataType::Str)
            .unwrap()
            .build()
            .unwrap()
    }

    fn rows() -> Vec<Row> {
        vec![
            Row::new(0, vec![Value::Int(30), Value::Float(1.5), Value::from("c")]),
            Row::new(1, vec![Value::Int(10), Value::Float(2.5), Value::from("a")]),
            Row::new(2, vec![Value::Int(20), Value::Float(-1.0), Value::from("b")]),
        ]
    }

    fn run(calls: &[(AggregateFunc, Option<&str>)], rows: &[Row]) -> Vec<Value> {
        let calls: Vec<_> = calls.iter().map(|(f, c)| (*f, c.map(str::to_string))).collect();
        let executor = AggregateExecutor::new(&table(), &calls).unwrap();
        let result = executor.execute(rows).unwrap();
        assert_eq!(result.len(), 1);
        result.rows()[0].values().to_vec()
    }

    #[test]
    fn test_count() {
        let values = run(&[(AggregateFunc::Count, None), (AggregateFunc::Count, Some("s"))], &rows());
        assert_eq!(values, vec![Value::Int(3), Value::Int(3)]);
    }

    #[test]
    fn test_count_column_skips_nulls() {
        let mut rows = rows();
        rows[1].set(0, Value::Null);
        let values = run(&[(AggregateFunc::Count, Some("n")), (AggregateFunc::Sum, Some("n"))], &rows);
        assert_eq!(values, vec![Value::Int(2), Value::Int(50)]);
    }

    #[test]
    fn test_sum_keeps_column_type() {
        let values = run(&[(AggregateFunc::Sum, Some("n")), (AggregateFunc::Sum, Some("f"))], &rows());
        assert_eq!(values, vec![Value::Int(60), Value::Float(3.0)]);
    }

    #[test]
    fn test_avg() {
        let values = run(&[(AggregateFunc::Avg, Some("n"))], &rows());
        assert_eq!(values, vec![Value::Float(20.0)]);
    }

    #[test]
    fn test_min_max() {
        let values = run(
            &[
                (AggregateFunc::Min, Some("n")),
                (AggregateFunc::Max, Some("n")),
                (AggregateFunc::Min, Some("f")),
            ],
            &rows(),
        );
        assert_eq!(values, vec![Value::Int(10), Value::Int(30), Value::Float(-1.0)]);
    }

    #[test]
    fn test_empty_input() {
        let values = run(
            &[
                (AggregateFunc::Count, None),
                (AggregateFunc::Sum, Some("n")),
                (AggregateFunc::Avg, Some("n")),
                (AggregateFunc::Min, Some("f")),
                (AggregateFunc::Max, Some("f")),
            ],
            &[],
        );
        assert_eq!(values, vec![Value::Int(0), Value::Int(0), Value::Null, Value::Null, Value::Null]);
    }

    #[test]
    fn test_non_numeric_column_rejected_up_front() {
        for func in [AggregateFunc::Sum, AggregateFunc::Avg, AggregateFunc::Min, AggregateFunc::Max] {
            let err = AggregateExecutor::new(&table(), &[(func, Some("s".to_string()))]).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::TypeMismatch);
        }
        let err = AggregateExecutor::new(&table(), &[(AggregateFunc::Sum, None)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
    }

    #[test]
    fn test_sum_overflow() {
        let rows = vec![
            Row::new(0, vec![Value::Int(i64::MAX), Value::Float(0.0), Value::from("")]),
            Row::new(1, vec![Value::Int(1), Value::Float(0.0), Value::from("")]),
        ];
        let executor = AggregateExecutor::new(&table(), &[(AggregateFunc::Sum, Some("n".into()))]).unwrap();
        assert_eq!(executor.execute(&rows).unwrap_err().kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_from_items_rejects_mixing() {
        let items = vec![SelectItem::aggregate(AggregateFunc::Count, None), SelectItem::column("n")];
        let err = AggregateExecutor::from_items(&table(), &items).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);

        let items = vec![SelectItem::aggregate(AggregateFunc::Max, Some("f"))];
        let executor = AggregateExecutor::from_items(&table(), &items).unwrap();
        assert_eq!(executor.column_names(), vec!["MAX(f)"]);
    }
}
