//! Data type definitions for Quill.
//!
//! A column is declared with one of three types. The textual names (`int`,
//! `str`, `float`) are the ones used by the metadata descriptor.

use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Supported column types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// 64-bit signed integer
    Int,
    /// UTF-8 string
    Str,
    /// 64-bit floating point number
    Float,
}

impl DataType {
    /// Returns the descriptor name of this type.
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Int => "int",
            DataType::Str => "str",
            DataType::Float => "float",
        }
    }

    /// Returns whether values of this type take part in arithmetic aggregates.
    #[inline]
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int | DataType::Float)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "int" | "integer" => Ok(DataType::Int),
            "str" | "string" | "text" => Ok(DataType::Str),
            "float" | "real" | "double" => Ok(DataType::Float),
            other => Err(Error::schema(format!("unknown column type: {}", other))),
        }
    }
}
