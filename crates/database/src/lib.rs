//! Quill Database - the session handle of the Quill storage engine.
//!
//! This crate ties the layers together for one data directory:
//!
//! - `DatabaseConfig`: data directory, metadata file and lock timing, from
//!   code or TOML
//! - `Catalog`: the `metadata.json` descriptor of every table
//! - `Database`: opens the directory, recovers interrupted commits and
//!   dispatches structured commands
//! - `ExecutionResult`: rows, affected-row count, status or table names
//!
//! # Example
//!
//! ```rust
//! use quill_core::{DataType, Value};
//! use quill_database::{Database, DatabaseConfig, ExecutionResult};
//! use quill_query::ast::{ColumnDef, Command, SelectQuery};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let mut db = Database::open(DatabaseConfig::new(dir.path())).unwrap();
//!
//! db.execute(Command::CreateTable {
//!     table: "users".into(),
//!     columns: vec![ColumnDef::new("id", DataType::Int), ColumnDef::new("name", DataType::Str)],
//!     primary_key: Some("id".into()),
//!     unique: vec![],
//!     foreign_keys: Default::default(),
//! })
//! .unwrap();
//!
//! db.execute(Command::Insert {
//!     table: "users".into(),
//!     columns: None,
//!     values: vec![Value::Int(1), Value::from("Alice")],
//! })
//! .unwrap();
//!
//! let result = db.execute(Command::Select(SelectQuery::all("users"))).unwrap();
//! assert_eq!(result.rows().map(|r| r.len()), Some(1));
//! assert_eq!(
//!     db.execute(Command::ShowTables).unwrap(),
//!     ExecutionResult::Tables(vec!["users".to_string()])
//! );
//! ```

pub mod catalog;
pub mod config;
pub mod database;
pub mod query_engine;

pub use catalog::{Catalog, TableDescriptor};
pub use config::DatabaseConfig;
pub use database::{Database, ExecutionResult, DESCRIBE_COLUMNS};
pub use query_engine::TableCacheDataSource;
pub use quill_core::{Error, ErrorKind, Result};
