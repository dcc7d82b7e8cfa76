//! Quill Core - core types and schema definitions for the Quill storage engine.
//!
//! - `DataType`: declared column types (`int`, `str`, `float`)
//! - `Value`: tagged cell values, checked against the declared type at every mutation
//! - `Row`: a positional row tagged with its store locator
//! - `schema`: column and table definitions with DDL helpers
//! - `Predicate`: single-column filters, bound to a schema before evaluation
//! - `Error`: the error taxonomy shared by every layer
//!
//! # Example
//!
//! ```rust
//! use quill_core::{DataType, Predicate, Row, Value};
//! use quill_core::schema::TableBuilder;
//!
//! let table = TableBuilder::new("users")
//!     .unwrap()
//!     .add_column("id", DataType::Int)
//!     .unwrap()
//!     .add_column("name", DataType::Str)
//!     .unwrap()
//!     .primary_key("id")
//!     .unwrap()
//!     .build()
//!     .unwrap();
//!
//! let values = table.check_row(vec![Value::Int(1), Value::from("Alice")]).unwrap();
//! let row = Row::new(0, values);
//!
//! let by_id = Predicate::equals("id", 1i64).bind(&table).unwrap();
//! assert!(by_id.eval(&row));
//! ```

mod error;
mod predicate;
mod row;
pub mod schema;
mod types;
mod value;

pub use error::{Error, ErrorKind, Result};
pub use predicate::{BoundPredicate, CompareOp, Predicate};
pub use row::{Row, RowId, DUMMY_ROW_ID};
pub use types::DataType;
pub use value::Value;
