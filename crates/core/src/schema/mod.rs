//! Schema module for Quill.
//!
//! Column and table definitions, plus the DDL mutations (add, drop and
//! rename column, rename table) that keep key designations consistent.

mod column;
mod table;

pub use column::Column;
pub use table::{check_name, Table, TableBuilder};
