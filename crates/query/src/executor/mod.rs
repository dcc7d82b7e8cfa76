//! Query executor module.

mod aggregate;
pub mod join;
mod project;
mod relation;
mod runner;
mod subquery;

pub use aggregate::AggregateExecutor;
pub use join::{BuildSide, HashJoin, NestedLoopJoin};
pub use project::ProjectExecutor;
pub use relation::Relation;
pub use runner::{DataSource, InMemoryDataSource, QueryExecutor};
