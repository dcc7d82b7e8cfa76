//! SELECT lists and queries.

use core::fmt;
use core::str::FromStr;

use quill_core::Error;
use serde::{Deserialize, Serialize};

use super::Condition;

/// Aggregate functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AggregateFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunc {
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunc::Count => "COUNT",
            AggregateFunc::Sum => "SUM",
            AggregateFunc::Avg => "AVG",
            AggregateFunc::Min => "MIN",
            AggregateFunc::Max => "MAX",
        }
    }

    /// Whether the function only accepts numeric columns.
    pub fn requires_numeric(&self) -> bool {
        !matches!(self, AggregateFunc::Count)
    }
}

impl fmt::Display for AggregateFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AggregateFunc {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "COUNT" => Ok(AggregateFunc::Count),
            "SUM" => Ok(AggregateFunc::Sum),
            "AVG" => Ok(AggregateFunc::Avg),
            "MIN" => Ok(AggregateFunc::Min),
            "MAX" => Ok(AggregateFunc::Max),
            _ => Err(Error::schema(format!("unknown aggregate function '{}'", s))),
        }
    }
}

/// One entry of a SELECT list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectItem {
    /// `*`
    Star,
    Column(String),
    /// `FUNC(column)`, or `COUNT(*)` when `column` is None.
    Aggregate {
        func: AggregateFunc,
        column: Option<String>,
    },
}

impl SelectItem {
    pub fn column(name: impl Into<String>) -> Self {
        SelectItem::Column(name.into())
    }

    pub fn aggregate(func: AggregateFunc, column: Option<&str>) -> Self {
        SelectItem::Aggregate {
            func,
            column: column.map(str::to_string),
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, SelectItem::Aggregate { .. })
    }

    /// Result column name: the column itself, or `FUNC(col)` / `COUNT(*)`.
    pub fn output_name(&self) -> String {
        match self {
            SelectItem::Star => "*".to_string(),
            SelectItem::Column(name) => name.clone(),
            SelectItem::Aggregate { func, column } => {
                format!("{}({})", func, column.as_deref().unwrap_or("*"))
            }
        }
    }
}

/// `SELECT items FROM table [WHERE condition] [LIMIT n]`.
///
/// An empty item list selects every column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SelectQuery {
    pub table: String,
    #[serde(default)]
    pub items: Vec<SelectItem>,
    #[serde(default)]
    pub condition: Option<Condition>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl SelectQuery {
    /// `SELECT * FROM table`.
    pub fn all(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            items: Vec::new(),
            condition: None,
            limit: None,
        }
    }

    /// `SELECT columns... FROM table`.
    pub fn columns<S: AsRef<str>>(table: impl Into<String>, columns: &[S]) -> Self {
        let mut query = Self::all(table);
        query.items = columns.iter().map(|c| SelectItem::column(c.as_ref())).collect();
        query
    }

    pub fn item(mut self, item: SelectItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn is_aggregate(&self) -> bool {
        self.items.iter().any(SelectItem::is_aggregate)
    }
}
