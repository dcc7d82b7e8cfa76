//! Column definition for Quill schema.

use crate::types::DataType;
use crate::value::Value;

/// A column definition in a table schema.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    name: String,
    data_type: DataType,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Value given to existing rows when this column is added.
    pub fn default_value(&self) -> Value {
        Value::default_for_type(self.data_type)
    }

    pub(crate) fn rename(&mut self, name: String) {
        self.name = name;
    }
}
