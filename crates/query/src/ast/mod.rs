//! Command AST consumed by the executor.

mod command;
mod expr;
mod predicate;

pub use command::{ColumnDef, Command, CommandKind};
pub use expr::{AggregateFunc, SelectItem, SelectQuery};
pub use predicate::{Condition, JoinCondition};
