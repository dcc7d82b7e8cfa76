//! Metadata descriptor.
//!
//! `metadata.json` maps every table name to its column list, column types
//! and key designations. It is read when a database opens, to know which
//! tables exist and how to decode their files, and rewritten through an
//! atomic replace after every schema change.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use quill_core::schema::{Table, TableBuilder};
use quill_core::{DataType, Error, Result};
use quill_storage::file;
use serde::{Deserialize, Serialize};

/// Descriptor of one table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Column names in table order.
    pub columns: Vec<String>,
    pub column_types: BTreeMap<String, DataType>,
    #[serde(default)]
    pub primary_key: Option<String>,
    #[serde(default)]
    pub unique_columns: Vec<String>,
    /// column -> "referenced_table.referenced_column"
    #[serde(default)]
    pub foreign_keys: BTreeMap<String, String>,
}

impl TableDescriptor {
    pub fn from_table(table: &Table) -> Self {
        Self {
            columns: table.column_names(),
            column_types: table
                .columns()
                .iter()
                .map(|c| (c.name().to_string(), c.data_type()))
                .collect(),
            primary_key: table.primary_key().map(str::to_string),
            unique_columns: table.unique_columns().to_vec(),
            foreign_keys: table.foreign_keys().clone(),
        }
    }

    /// Rebuilds the schema of table `name`.
    pub fn to_table(&self, name: &str) -> Result<Table> {
        let mut builder = TableBuilder::new(name)?;
        for column in &self.columns {
            let data_type = self.column_types.get(column).copied().ok_or_else(|| {
                Error::schema(format!("no type recorded for column '{}' of table '{}'", column, name))
            })?;
            builder = builder.add_column(column.as_str(), data_type)?;
        }
        if let Some(pk) = &self.primary_key {
            builder = builder.primary_key(pk)?;
        }
        for column in &self.unique_columns {
            builder = builder.unique(column)?;
        }
        for (column, references) in &self.foreign_keys {
            builder = builder.foreign_key(column, references)?;
        }
        builder.build()
    }
}

/// The metadata descriptor of a data directory.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    tables: BTreeMap<String, TableDescriptor>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_schemas<'a>(schemas: impl IntoIterator<Item = &'a Table>) -> Self {
        Self {
            tables: schemas
                .into_iter()
                .map(|t| (t.name().to_string(), TableDescriptor::from_table(t)))
                .collect(),
        }
    }

    /// Reads the descriptor at `path`; a missing file is an empty catalog.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(Error::io(format!("reading {}", path.display()), e)),
        };
        serde_json::from_slice(&bytes).map_err(|e| Error::corruption(metadata_name(path), e.to_string()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|e| Error::io("encoding metadata", e.into()))?;
        file::write_atomic(path, &bytes)
    }

    /// Schemas of every described table, in name order.
    pub fn schemas(&self) -> Result<Vec<Table>> {
        self.tables
            .iter()
            .map(|(name, descriptor)| {
                descriptor
                    .to_table(name)
                    .map_err(|e| Error::corruption(name.as_str(), format!("invalid metadata: {}", e)))
            })
            .collect()
    }

    /// Records `table`, replacing any previous descriptor of that name.
    pub fn insert(&mut self, table: &Table) {
        self.tables
            .insert(table.name().to_string(), TableDescriptor::from_table(table));
    }

    pub fn remove(&mut self, name: &str) -> Option<TableDescriptor> {
        self.tables.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.tables.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

fn metadata_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("metadata")
        .to_string()
}
