//! Error types for Quill.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::value::Value;

/// Result type alias for Quill operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error types for Quill operations.
///
/// Every engine operation fails with exactly one of these; see
/// [`Error::kind`] for the coarse classification.
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown table or column, duplicate column, invalid DDL.
    #[error("schema error: {message}")]
    Schema { message: String },

    /// Value does not match the declared column type, or an arithmetic
    /// aggregate was applied to a non-numeric column.
    #[error("type mismatch: {message}")]
    TypeMismatch { message: String },

    /// Primary-key or unique-column duplicate.
    #[error("constraint violation: duplicate value {value} for unique column {column}")]
    ConstraintViolation { column: String, value: Value },

    /// Table lock could not be acquired before the timeout.
    #[error("database busy: lock on table {table} not acquired within {waited:?}")]
    DatabaseBusy { table: String, waited: Duration },

    /// Misuse of BEGIN/COMMIT/ROLLBACK, or a staged operation failed at commit.
    #[error("transaction error: {message}")]
    Transaction {
        message: String,
        #[source]
        cause: Option<Box<Error>>,
    },

    /// Durable table file exists but cannot be read as the expected format.
    #[error("corrupted storage for table {table}: {message}")]
    IoCorruption { table: String, message: String },

    /// Invalid database configuration.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Operating-system failure while reading or writing durable state.
    #[error("I/O failure while {context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

/// Coarse error classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Schema,
    TypeMismatch,
    ConstraintViolation,
    DatabaseBusy,
    Transaction,
    IoCorruption,
    Config,
    Io,
}

impl Error {
    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Schema { .. } => ErrorKind::Schema,
            Error::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Error::ConstraintViolation { .. } => ErrorKind::ConstraintViolation,
            Error::DatabaseBusy { .. } => ErrorKind::DatabaseBusy,
            Error::Transaction { .. } => ErrorKind::Transaction,
            Error::IoCorruption { .. } => ErrorKind::IoCorruption,
            Error::Config { .. } => ErrorKind::Config,
            Error::Io { .. } => ErrorKind::Io,
        }
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Error::Schema {
            message: message.into(),
        }
    }

    pub fn table_not_found(name: &str) -> Self {
        Error::schema(format!("table '{}' does not exist", name))
    }

    pub fn table_exists(name: &str) -> Self {
        Error::schema(format!("table '{}' already exists", name))
    }

    pub fn column_not_found(table: &str, column: &str) -> Self {
        Error::schema(format!("column '{}' does not exist in table '{}'", column, table))
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Error::TypeMismatch {
            message: message.into(),
        }
    }

    /// Mismatch between a column's declared type and a supplied value.
    pub fn column_type_mismatch(column: &str, expected: crate::DataType, got: &Value) -> Self {
        Error::type_mismatch(format!(
            "column '{}' expects {}, got {} {}",
            column,
            expected,
            got.type_name(),
            got
        ))
    }

    pub fn constraint_violation(column: impl Into<String>, value: Value) -> Self {
        Error::ConstraintViolation {
            column: column.into(),
            value,
        }
    }

    pub fn busy(table: impl Into<String>, waited: Duration) -> Self {
        Error::DatabaseBusy {
            table: table.into(),
            waited,
        }
    }

    pub fn transaction(message: impl Into<String>) -> Self {
        Error::Transaction {
            message: message.into(),
            cause: None,
        }
    }

    /// Transaction aborted because a staged operation failed.
    pub fn commit_aborted(cause: Error) -> Self {
        Error::Transaction {
            message: format!("commit aborted: {}", cause),
            cause: Some(Box::new(cause)),
        }
    }

    pub fn corruption(table: impl Into<String>, message: impl Into<String>) -> Self {
        Error::IoCorruption {
            table: table.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }
}
