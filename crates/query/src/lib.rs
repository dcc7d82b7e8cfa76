//! Quill Query - query execution for the Quill storage engine.
//!
//! This crate evaluates structured commands against tables exposed through
//! a [`DataSource`](executor::DataSource):
//!
//! - `ast`: the command surface handed over by an external parser
//! - `executor`: projection, hash join, aggregates and `IN (subquery)`
//!   resolution
//!
//! The engine never parses text. Commands are built directly or
//! deserialized from their serde representation.

pub mod ast;
pub mod executor;

pub use ast::{
    AggregateFunc, ColumnDef, Command, CommandKind, Condition, JoinCondition, SelectItem, SelectQuery,
};
pub use executor::{DataSource, QueryExecutor, Relation};
