//! Table registry.
//!
//! `TableCache` owns the open `RowStore` of every table of a data directory.
//! A table whose durable file turned out corrupted stays registered as
//! quarantined: every access to it fails with `IoCorruption` until it is
//! repaired or dropped, while the other tables stay usable.

use std::collections::BTreeMap;

use quill_core::schema::Table;
use quill_core::{Error, Result};

use crate::row_store::RowStore;

#[derive(Debug)]
enum Slot {
    Ready(RowStore),
    Quarantined { schema: Table, reason: String },
}

/// Registry of open table stores.
#[derive(Debug, Default)]
pub struct TableCache {
    tables: BTreeMap<String, Slot>,
}

impl TableCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a newly created or opened store.
    pub fn insert(&mut self, store: RowStore) -> Result<()> {
        let name = store.name().to_string();
        if self.tables.contains_key(&name) {
            return Err(Error::table_exists(&name));
        }
        self.tables.insert(name, Slot::Ready(store));
        Ok(())
    }

    /// Registers or swaps in a store, replacing whatever was there.
    pub fn replace(&mut self, store: RowStore) {
        self.tables.insert(store.name().to_string(), Slot::Ready(store));
    }

    /// Marks a table unusable because its durable file is corrupted.
    pub fn quarantine(&mut self, schema: Table, reason: impl Into<String>) {
        self.tables.insert(
            schema.name().to_string(),
            Slot::Quarantined {
                schema,
                reason: reason.into(),
            },
        );
    }

    fn unusable(name: &str, reason: &str) -> Error {
        Error::corruption(name, format!("table is quarantined: {}", reason))
    }

    pub fn get(&self, name: &str) -> Result<&RowStore> {
        match self.tables.get(name) {
            Some(Slot::Ready(store)) => Ok(store),
            Some(Slot::Quarantined { reason, .. }) => Err(Self::unusable(name, reason)),
            None => Err(Error::table_not_found(name)),
        }
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut RowStore> {
        match self.tables.get_mut(name) {
            Some(Slot::Ready(store)) => Ok(store),
            Some(Slot::Quarantined { reason, .. }) => Err(Self::unusable(name, reason)),
            None => Err(Error::table_not_found(name)),
        }
    }

    /// Schema of a table, available even while it is quarantined.
    pub fn schema(&self, name: &str) -> Result<&Table> {
        match self.tables.get(name) {
            Some(Slot::Ready(store)) => Ok(store.schema()),
            Some(Slot::Quarantined { schema, .. }) => Ok(schema),
            None => Err(Error::table_not_found(name)),
        }
    }

    /// Unregisters a table. Returns its store unless it was quarantined.
    pub fn remove(&mut self, name: &str) -> Result<Option<RowStore>> {
        match self.tables.remove(name) {
            Some(Slot::Ready(store)) => Ok(Some(store)),
            Some(Slot::Quarantined { .. }) => Ok(None),
            None => Err(Error::table_not_found(name)),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn is_quarantined(&self, name: &str) -> bool {
        matches!(self.tables.get(name), Some(Slot::Quarantined { .. }))
    }

    /// Table names in sorted order.
    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    /// Schemas of every registered table, quarantined ones included.
    pub fn schemas(&self) -> impl Iterator<Item = &Table> + '_ {
        self.tables.values().map(|slot| match slot {
            Slot::Ready(store) => store.schema(),
            Slot::Quarantined { schema, .. } => schema,
        })
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
