//! Row storage for Quill.
//!
//! A `RowStore` holds the authoritative row set of one table, keeps its key
//! indexes in step with every mutation, and persists the whole set through
//! an atomic file replace after each successful change. A mutation whose
//! persistence fails is reverted in memory, so memory and disk agree.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::ops::Bound;
use std::path::{Path, PathBuf};

use quill_core::schema::Table;
use quill_core::{BoundPredicate, DataType, Error, Predicate, Result, Row, RowId, Value};
use tracing::{debug, info, warn};

use crate::file::{self, FileStamp};
use crate::index_manager::IndexManager;

/// Row storage for a single table.
#[derive(Clone, Debug)]
pub struct RowStore {
    schema: Table,
    path: PathBuf,
    rows: BTreeMap<RowId, Row>,
    next_id: RowId,
    indexes: IndexManager,
    /// Set when a read noticed the indexes disagree with the rows.
    index_stale: Cell<bool>,
    /// Stamp of the durable file as of the last load or save.
    stamp: Option<FileStamp>,
    /// Detached stores (transaction working copies) never touch disk.
    durable: bool,
}

impl RowStore {
    /// Creates a new empty table and writes its durable file.
    pub fn create(dir: &Path, schema: Table) -> Result<Self> {
        let mut store = Self::empty(dir, schema);
        store.save()?;
        info!(table = store.name(), "created table");
        Ok(store)
    }

    /// Opens a table, loading its durable file if one exists.
    pub fn open(dir: &Path, schema: Table) -> Result<Self> {
        let mut store = Self::empty(dir, schema);
        store.load()?;
        Ok(store)
    }

    fn empty(dir: &Path, schema: Table) -> Self {
        Self {
            path: file::table_path(dir, schema.name()),
            indexes: IndexManager::new(&schema),
            schema,
            rows: BTreeMap::new(),
            next_id: 0,
            index_stale: Cell::new(false),
            stamp: None,
            durable: true,
        }
    }

    pub fn schema(&self) -> &Table {
        &self.schema
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_durable(&self) -> bool {
        self.durable
    }

    /// Reads the durable file into memory, replacing the current rows.
    ///
    /// A missing file yields an empty table. A file that cannot be parsed
    /// as this table's rows, or that violates a key constraint, fails with
    /// `IoCorruption` and leaves the store unchanged.
    pub fn load(&mut self) -> Result<()> {
        let stamp = file::stamp(&self.path)?;
        let decoded = match fs::read(&self.path) {
            Ok(bytes) => file::decode_rows(&self.schema, &bytes)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(Error::io(format!("reading {}", self.path.display()), e)),
        };

        let rows: BTreeMap<RowId, Row> = decoded
            .into_iter()
            .enumerate()
            .map(|(i, values)| (i as RowId, Row::new(i as RowId, values)))
            .collect();
        let indexes = IndexManager::build(&self.schema, rows.values()).map_err(|e| {
            Error::corruption(self.schema.name(), format!("durable rows break a key: {}", e))
        })?;

        self.next_id = rows.len() as RowId;
        self.rows = rows;
        self.indexes = indexes;
        self.index_stale.set(false);
        self.stamp = stamp;
        debug!(table = self.name(), rows = self.rows.len(), "loaded table");
        Ok(())
    }

    /// Reloads if another process replaced the durable file since this
    /// store last loaded or saved it. Returns whether a reload happened.
    pub fn reload_if_changed(&mut self) -> Result<bool> {
        if !self.durable {
            return Ok(false);
        }
        let current = file::stamp(&self.path)?;
        if current == self.stamp {
            return Ok(false);
        }
        debug!(table = self.name(), "durable file changed on disk, reloading");
        self.load()?;
        Ok(true)
    }

    /// Serializes the full row set in durable format.
    pub fn encode(&self) -> Result<Vec<u8>> {
        file::encode_rows(&self.schema, self.rows.values())
    }

    /// Writes the full row set through an atomic replace.
    pub fn save(&mut self) -> Result<()> {
        if !self.durable {
            return Ok(());
        }
        let bytes = self.encode()?;
        file::write_atomic(&self.path, &bytes)?;
        self.stamp = file::stamp(&self.path)?;
        debug!(table = self.name(), rows = self.rows.len(), bytes = bytes.len(), "saved table");
        Ok(())
    }

    /// Returns an in-memory copy that never persists, used as a
    /// transaction working copy.
    pub fn detached(&self) -> Self {
        let mut copy = self.clone();
        copy.durable = false;
        copy
    }

    /// Turns a working copy back into a durable store once its rows have
    /// been written by other means (the commit log).
    pub fn attach(&mut self) {
        self.durable = true;
        // An unknown stamp only forces a reload on next use.
        self.stamp = match file::stamp(&self.path) {
            Ok(stamp) => stamp,
            Err(e) => {
                debug!(table = self.name(), error = %e, "file stamp unavailable, table will reload");
                None
            }
        };
    }

    fn bind(&self, predicate: Option<&Predicate>) -> Result<Option<BoundPredicate>> {
        predicate.map(|p| p.bind(&self.schema)).transpose()
    }

    fn ensure_indexes(&mut self) -> Result<()> {
        if self.index_stale.get() || !self.indexes.is_consistent_with(self.rows.len()) {
            warn!(table = self.name(), "index inconsistent with rows, rebuilding");
            self.indexes.rebuild(&self.schema, self.rows.values())?;
            self.index_stale.set(false);
        }
        Ok(())
    }

    /// Forces a full index rebuild from the row set.
    pub fn rebuild_indexes(&mut self) -> Result<()> {
        self.indexes.rebuild(&self.schema, self.rows.values())?;
        self.index_stale.set(false);
        Ok(())
    }

    /// Candidate locators for an index-answerable predicate, verified
    /// against the rows. None means a full scan is needed.
    fn index_candidates(&self, predicate: &BoundPredicate) -> Option<Vec<RowId>> {
        let column = predicate.column_index();
        if !self.indexes.covers(column) || self.index_stale.get() {
            return None;
        }
        let keys = predicate.equality_keys()?;
        let mut ids = Vec::new();
        for key in keys {
            let found = self.indexes.lookup(column, key)?;
            for id in found {
                match self.rows.get(&id) {
                    Some(row) if row.get(column) == Some(key) => ids.push(id),
                    _ => {
                        warn!(table = self.name(), row_id = id, "stale index entry");
                        self.index_stale.set(true);
                        return None;
                    }
                }
            }
        }
        ids.sort_unstable();
        ids.dedup();
        Some(ids)
    }

    /// Locators of the rows matching `predicate`, in insertion order.
    fn matching_ids(&self, predicate: Option<&BoundPredicate>) -> Vec<RowId> {
        match predicate {
            None => self.rows.keys().copied().collect(),
            Some(p) => match self.index_candidates(p) {
                Some(ids) => ids,
                None => self
                    .rows
                    .iter()
                    .filter(|(_, row)| p.eval(row))
                    .map(|(id, _)| *id)
                    .collect(),
            },
        }
    }

    /// Rows whose indexed `column` equals `key`, answered from the index.
    pub fn lookup(&mut self, column: &str, key: &Value) -> Result<Vec<&Row>> {
        self.ensure_indexes()?;
        let idx = self.schema.column_index(column)?;
        let predicate = Predicate::equals(column, key.clone()).bind(&self.schema)?;
        if !self.indexes.covers(idx) {
            return Err(Error::schema(format!(
                "column '{}' of table '{}' is not indexed",
                column,
                self.name()
            )));
        }
        let ids = match self.index_candidates(&predicate) {
            Some(ids) => ids,
            None => {
                self.rebuild_indexes()?;
                self.index_candidates(&predicate).unwrap_or_default()
            }
        };
        Ok(ids.iter().filter_map(|id| self.rows.get(id)).collect())
    }

    /// Lazily scans the rows matching an optional predicate, stopping after
    /// `limit` rows when given. Equality and membership predicates on an
    /// indexed column are answered from the index.
    pub fn scan(&self, predicate: Option<&Predicate>, limit: Option<usize>) -> Result<Scan<'_>> {
        let predicate = self.bind(predicate)?;
        let source = match predicate.as_ref().and_then(|p| self.index_candidates(p)) {
            Some(ids) => Source::Candidates(ids),
            None => Source::Full,
        };
        Ok(Scan {
            store: self,
            source,
            predicate,
            limit,
            cursor: None,
            position: 0,
            emitted: 0,
        })
    }

    /// Validates and appends one row, then persists.
    pub fn insert(&mut self, values: Vec<Value>) -> Result<RowId> {
        self.ensure_indexes()?;
        let values = self.schema.check_row(values)?;
        self.indexes.check_unique(&values, None)?;

        let id = self.next_id;
        let row = Row::new(id, values);
        self.indexes.on_insert(&row)?;
        self.rows.insert(id, row);
        self.next_id += 1;

        if let Err(e) = self.save() {
            if let Some(row) = self.rows.remove(&id) {
                self.indexes.on_delete(&row);
            }
            self.next_id = id;
            return Err(e);
        }
        Ok(id)
    }

    /// Applies `assignments` to every row matching `predicate` (all rows
    /// when None), then persists. Returns the number of rows modified.
    pub fn update(&mut self, predicate: Option<&Predicate>, assignments: &[(String, Value)]) -> Result<usize> {
        self.ensure_indexes()?;
        let predicate = self.bind(predicate)?;
        let mut resolved = Vec::with_capacity(assignments.len());
        for (column, value) in assignments {
            let idx = self.schema.column_index(column)?;
            resolved.push((idx, self.schema.check_value(idx, value.clone())?));
        }

        let ids = self.matching_ids(predicate.as_ref());
        if ids.is_empty() {
            return Ok(0);
        }

        // Assigning one value to a key column of several rows can never be unique.
        if ids.len() > 1 {
            for (idx, value) in &resolved {
                if self.indexes.covers(*idx) {
                    let column = self.schema.columns()[*idx].name().to_string();
                    return Err(Error::constraint_violation(column, value.clone()));
                }
            }
        }

        let mut originals: Vec<Row> = Vec::with_capacity(ids.len());
        for id in &ids {
            let old = match self.rows.get(id) {
                Some(row) => row.clone(),
                None => continue,
            };
            let mut new = old.clone();
            for (idx, value) in &resolved {
                new.set(*idx, value.clone());
            }
            if let Err(e) = self.indexes.on_update(&old, &new) {
                self.restore(originals);
                return Err(e);
            }
            self.rows.insert(*id, new);
            originals.push(old);
        }

        let count = originals.len();
        if let Err(e) = self.save() {
            self.restore(originals);
            return Err(e);
        }
        Ok(count)
    }

    /// Puts back rows replaced by a failed update.
    fn restore(&mut self, originals: Vec<Row>) {
        for old in originals {
            if let Some(current) = self.rows.insert(old.id(), old.clone()) {
                if self.indexes.on_update(&current, &old).is_err() {
                    self.index_stale.set(true);
                }
            }
        }
    }

    /// Removes every row matching `predicate` (all rows when None), then
    /// persists. Returns the number of rows removed.
    pub fn delete(&mut self, predicate: Option<&Predicate>) -> Result<usize> {
        self.ensure_indexes()?;
        let predicate = self.bind(predicate)?;
        let ids = self.matching_ids(predicate.as_ref());
        if ids.is_empty() {
            return Ok(0);
        }

        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(row) = self.rows.remove(&id) {
                self.indexes.on_delete(&row);
                removed.push(row);
            }
        }

        let count = removed.len();
        if let Err(e) = self.save() {
            for row in removed {
                if self.indexes.on_insert(&row).is_err() {
                    self.index_stale.set(true);
                }
                self.rows.insert(row.id(), row);
            }
            return Err(e);
        }
        Ok(count)
    }

    /// Runs a schema change plus the matching row rewrite, restoring both
    /// if the rewrite cannot be persisted.
    fn alter<F>(&mut self, change: F) -> Result<()>
    where
        F: FnOnce(&mut Table, &mut BTreeMap<RowId, Row>) -> Result<()>,
    {
        let schema = self.schema.clone();
        let rows = self.rows.clone();
        let result = change(&mut self.schema, &mut self.rows)
            .and_then(|()| self.indexes.rebuild(&self.schema, self.rows.values()))
            .and_then(|()| self.save());
        if let Err(e) = result {
            self.schema = schema;
            self.rows = rows;
            self.indexes.rebuild(&self.schema, self.rows.values())?;
            return Err(e);
        }
        Ok(())
    }

    /// Appends a column; every existing row gains the type's default value.
    pub fn add_column(&mut self, name: &str, data_type: DataType) -> Result<()> {
        self.alter(|schema, rows| {
            let default = schema.add_column(name, data_type)?.default_value();
            for row in rows.values_mut() {
                row.push(default.clone());
            }
            Ok(())
        })?;
        info!(table = self.name(), column = name, %data_type, "added column");
        Ok(())
    }

    /// Drops a non-key column from the schema and every row.
    pub fn drop_column(&mut self, name: &str) -> Result<()> {
        self.alter(|schema, rows| {
            let idx = schema.drop_column(name)?;
            for row in rows.values_mut() {
                row.remove(idx);
            }
            Ok(())
        })?;
        info!(table = self.name(), column = name, "dropped column");
        Ok(())
    }

    /// Renames a column; row objects are rewritten under the new name.
    pub fn rename_column(&mut self, old: &str, new: &str) -> Result<()> {
        self.alter(|schema, _| schema.rename_column(old, new).map(|_| ()))?;
        info!(table = self.name(), from = old, to = new, "renamed column");
        Ok(())
    }

    /// Renames the table, moving its durable file.
    pub fn rename_table(&mut self, new_name: &str) -> Result<()> {
        let old_schema = self.schema.clone();
        let old_path = self.path.clone();
        let dir = old_path.parent().map(Path::to_path_buf).unwrap_or_default();
        self.schema.rename(new_name)?;
        self.path = file::table_path(&dir, new_name);
        if let Err(e) = self.save() {
            self.schema = old_schema;
            self.path = old_path;
            return Err(e);
        }
        file::remove_if_exists(&old_path)?;
        info!(from = old_schema.name(), to = new_name, "renamed table");
        Ok(())
    }

    /// Removes the durable file of this table.
    pub fn destroy(self) -> Result<()> {
        file::remove_if_exists(&self.path)?;
        info!(table = self.name(), "dropped table");
        Ok(())
    }
}

#[derive(Debug)]
enum Source {
    Full,
    Candidates(Vec<RowId>),
}

/// Lazy, restartable scan over a store's rows.
///
/// Rows are produced in insertion order. The scan never yields more than
/// the store held when it started, and stops early once `limit` is reached.
#[derive(Debug)]
pub struct Scan<'a> {
    store: &'a RowStore,
    source: Source,
    predicate: Option<BoundPredicate>,
    limit: Option<usize>,
    cursor: Option<RowId>,
    position: usize,
    emitted: usize,
}

impl<'a> Scan<'a> {
    /// Rewinds to the first row.
    pub fn restart(&mut self) {
        self.cursor = None;
        self.position = 0;
        self.emitted = 0;
    }

    /// Whether the scan is answered from an index.
    pub fn uses_index(&self) -> bool {
        matches!(self.source, Source::Candidates(_))
    }

    fn next_candidate(&mut self) -> Option<&'a Row> {
        let store: &'a RowStore = self.store;
        let rows = &store.rows;
        match &self.source {
            Source::Full => {
                let lower = match self.cursor {
                    Some(id) => Bound::Excluded(id),
                    None => Bound::Unbounded,
                };
                let (id, row) = rows.range((lower, Bound::Unbounded)).next()?;
                self.cursor = Some(*id);
                Some(row)
            }
            Source::Candidates(ids) => loop {
                let id = ids.get(self.position)?;
                self.position += 1;
                if let Some(row) = rows.get(id) {
                    return Some(row);
                }
            },
        }
    }
}

impl<'a> Iterator for Scan<'a> {
    type Item = &'a Row;

    fn next(&mut self) -> Option<&'a Row> {
        if self.limit.map_or(false, |limit| self.emitted >= limit) {
            return None;
        }
        loop {
            let row = self.next_candidate()?;
            if self.predicate.as_ref().map_or(true, |p| p.eval(row)) {
                self.emitted += 1;
                return Some(row);
            }
        }
    }
}
