//! Table definition for Quill schema.

use std::collections::BTreeMap;

use super::column::Column;
use crate::error::{Error, Result};
use crate::types::DataType;
use crate::value::Value;

/// Validates that a table or column name is a plain identifier.
pub fn check_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let first = match chars.next() {
        Some(c) => c,
        None => return Err(Error::schema("name cannot be empty")),
    };
    if !first.is_ascii_alphabetic() && first != '_' {
        return Err(Error::schema(format!(
            "name must start with a letter or underscore: {}",
            name
        )));
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::schema(format!("name contains invalid characters: {}", name)));
    }
    Ok(())
}

/// A table definition.
///
/// Column order is significant: row value vectors are aligned with it.
#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
    primary_key: Option<String>,
    unique: Vec<String>,
    /// column -> "referenced_table.referenced_column", never dereferenced
    foreign_keys: BTreeMap<String, String>,
}

impl Table {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name().to_string()).collect()
    }

    #[inline]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    pub fn get_column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name() == name)
    }

    /// Like [`Table::get_column_index`], failing with a schema error.
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.get_column_index(name)
            .ok_or_else(|| Error::column_not_found(&self.name, name))
    }

    pub fn primary_key(&self) -> Option<&str> {
        self.primary_key.as_deref()
    }

    pub fn unique_columns(&self) -> &[String] {
        &self.unique
    }

    pub fn foreign_keys(&self) -> &BTreeMap<String, String> {
        &self.foreign_keys
    }

    /// Positions of the columns whose values must be unique: the primary
    /// key first, then the unique columns in declaration order.
    pub fn key_column_indices(&self) -> Vec<usize> {
        let mut keys: Vec<usize> = Vec::new();
        let names = self.primary_key.iter().chain(self.unique.iter());
        for name in names {
            if let Some(idx) = self.get_column_index(name) {
                if !keys.contains(&idx) {
                    keys.push(idx);
                }
            }
        }
        keys
    }

    /// Checks a value against the declared type of column `index` and
    /// returns it in stored form.
    pub fn check_value(&self, index: usize, value: Value) -> Result<Value> {
        let column = self
            .columns
            .get(index)
            .ok_or_else(|| Error::schema(format!("column position {} out of range", index)))?;
        let data_type = column.data_type();
        match value.clone().cast_for_column(data_type) {
            Some(v) => Ok(v),
            None => Err(Error::column_type_mismatch(column.name(), data_type, &value)),
        }
    }

    /// Validates a positional row: exactly one value per column, each
    /// matching its declared type.
    pub fn check_row(&self, values: Vec<Value>) -> Result<Vec<Value>> {
        if values.len() != self.columns.len() {
            return Err(Error::schema(format!(
                "table '{}' has {} columns but {} values were supplied",
                self.name,
                self.columns.len(),
                values.len()
            )));
        }
        values
            .into_iter()
            .enumerate()
            .map(|(i, v)| self.check_value(i, v))
            .collect()
    }

    /// Builds a positional row from named values. The names must cover
    /// exactly the table's columns.
    pub fn row_from_named(&self, named: Vec<(String, Value)>) -> Result<Vec<Value>> {
        let mut slots: Vec<Option<Value>> = vec![None; self.columns.len()];
        for (name, value) in named {
            let idx = self.column_index(&name)?;
            if slots[idx].is_some() {
                return Err(Error::schema(format!("column '{}' supplied twice", name)));
            }
            slots[idx] = Some(value);
        }
        let mut values = Vec::with_capacity(slots.len());
        for (slot, column) in slots.into_iter().zip(&self.columns) {
            match slot {
                Some(v) => values.push(v),
                None => {
                    return Err(Error::schema(format!(
                        "missing value for column '{}' of table '{}'",
                        column.name(),
                        self.name
                    )))
                }
            }
        }
        self.check_row(values)
    }

    /// Appends a column. Existing rows must be extended with
    /// [`Column::default_value`] by the caller.
    pub fn add_column(&mut self, name: &str, data_type: DataType) -> Result<&Column> {
        check_name(name)?;
        if self.get_column(name).is_some() {
            return Err(Error::schema(format!(
                "column '{}' already exists in table '{}'",
                name, self.name
            )));
        }
        self.columns.push(Column::new(name, data_type));
        Ok(&self.columns[self.columns.len() - 1])
    }

    /// Removes a column and every key designation on it. Returns the
    /// position the column occupied.
    pub fn drop_column(&mut self, name: &str) -> Result<usize> {
        let idx = self.column_index(name)?;
        if self.primary_key.as_deref() == Some(name) {
            return Err(Error::schema(format!(
                "cannot drop primary key column '{}' of table '{}'",
                name, self.name
            )));
        }
        if self.columns.len() == 1 {
            return Err(Error::schema(format!(
                "cannot drop the only column of table '{}'",
                self.name
            )));
        }
        self.columns.remove(idx);
        self.unique.retain(|c| c != name);
        self.foreign_keys.remove(name);
        Ok(idx)
    }

    /// Renames a column, carrying its key designations along.
    pub fn rename_column(&mut self, old: &str, new: &str) -> Result<usize> {
        check_name(new)?;
        let idx = self.column_index(old)?;
        if old != new && self.get_column(new).is_some() {
            return Err(Error::schema(format!(
                "column '{}' already exists in table '{}'",
                new, self.name
            )));
        }
        self.columns[idx].rename(new.to_string());
        if self.primary_key.as_deref() == Some(old) {
            self.primary_key = Some(new.to_string());
        }
        for unique in self.unique.iter_mut() {
            if unique == old {
                *unique = new.to_string();
            }
        }
        if let Some(target) = self.foreign_keys.remove(old) {
            self.foreign_keys.insert(new.to_string(), target);
        }
        Ok(idx)
    }

    pub fn rename(&mut self, name: &str) -> Result<()> {
        check_name(name)?;
        self.name = name.to_string();
        Ok(())
    }
}

/// Builder for creating table definitions.
pub struct TableBuilder {
    name: String,
    columns: Vec<Column>,
    primary_key: Option<String>,
    unique: Vec<String>,
    foreign_keys: BTreeMap<String, String>,
}

impl TableBuilder {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        check_name(&name)?;
        Ok(Self {
            name,
            columns: Vec::new(),
            primary_key: None,
            unique: Vec::new(),
            foreign_keys: BTreeMap::new(),
        })
    }

    pub fn add_column(mut self, name: impl Into<String>, data_type: DataType) -> Result<Self> {
        let name = name.into();
        check_name(&name)?;
        if self.columns.iter().any(|c| c.name() == name) {
            return Err(Error::schema(format!("duplicate column: {}", name)));
        }
        self.columns.push(Column::new(name, data_type));
        Ok(self)
    }

    pub fn primary_key(mut self, column: &str) -> Result<Self> {
        self.require_column(column)?;
        if self.primary_key.is_some() {
            return Err(Error::schema(format!(
                "table '{}' already has a primary key",
                self.name
            )));
        }
        self.primary_key = Some(column.to_string());
        Ok(self)
    }

    pub fn unique(mut self, column: &str) -> Result<Self> {
        self.require_column(column)?;
        if !self.unique.iter().any(|c| c == column) {
            self.unique.push(column.to_string());
        }
        Ok(self)
    }

    /// Records a foreign-key reference of the form `table.column`. The
    /// target is not checked for existence.
    pub fn foreign_key(mut self, column: &str, references: &str) -> Result<Self> {
        self.require_column(column)?;
        match references.split_once('.') {
            Some((table, col)) if check_name(table).is_ok() && check_name(col).is_ok() => {}
            _ => {
                return Err(Error::schema(format!(
                    "foreign key reference must be table.column, got '{}'",
                    references
                )))
            }
        }
        self.foreign_keys
            .insert(column.to_string(), references.to_string());
        Ok(self)
    }

    fn require_column(&self, column: &str) -> Result<()> {
        if self.columns.iter().any(|c| c.name() == column) {
            Ok(())
        } else {
            Err(Error::column_not_found(&self.name, column))
        }
    }

    pub fn build(self) -> Result<Table> {
        if self.columns.is_empty() {
            return Err(Error::schema(format!(
                "table '{}' must declare at least one column",
                self.name
            )));
        }
        Ok(Table {
            name: self.name,
            columns: self.columns,
            primary_key: self.primary_key,
            unique: self.unique,
            foreign_keys: self.foreign_keys,
        })
    }
}
