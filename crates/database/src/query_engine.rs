//! Table access for the query executor.
//!
//! [`TableCacheDataSource`] is the [`DataSource`] the database hands to the
//! [`QueryExecutor`](quill_query::QueryExecutor). Tables written by the
//! active transaction are read from its working copy. Every other read
//! takes the table lock, picks up changes another process made to the
//! durable file, and scans the store.

use quill_core::schema::Table;
use quill_core::{ErrorKind, Predicate, Result, Row};
use quill_query::DataSource;
use quill_storage::{LockManager, RowStore, TableCache, TransactionManager};
use tracing::warn;

/// Returns the store of `table` after reloading it if its durable file
/// changed. The caller must hold the table lock. A table whose file turns
/// out corrupted is quarantined.
pub(crate) fn refresh<'c>(cache: &'c mut TableCache, table: &str) -> Result<&'c mut RowStore> {
    if let Err(e) = cache.get_mut(table)?.reload_if_changed() {
        if e.kind() == ErrorKind::IoCorruption {
            let schema = cache.schema(table)?.clone();
            warn!(table, error = %e, "quarantining table");
            cache.quarantine(schema, e.to_string());
        }
        return Err(e);
    }
    cache.get_mut(table)
}

/// DataSource implementation over the open stores of a database.
pub struct TableCacheDataSource<'a> {
    cache: &'a mut TableCache,
    locks: &'a LockManager,
    transactions: Option<&'a TransactionManager>,
}

impl<'a> TableCacheDataSource<'a> {
    pub fn new(cache: &'a mut TableCache, locks: &'a LockManager) -> Self {
        Self {
            cache,
            locks,
            transactions: None,
        }
    }

    /// Makes reads observe the staged writes of the active transaction.
    pub fn with_transactions(mut self, transactions: &'a TransactionManager) -> Self {
        self.transactions = Some(transactions);
        self
    }

    fn overlay(&self, table: &str) -> Option<&'a RowStore> {
        self.transactions.and_then(|tx| tx.overlay(table))
    }
}

impl<'a> DataSource for TableCacheDataSource<'a> {
    fn schema(&mut self, table: &str) -> Result<Table> {
        if let Some(store) = self.overlay(table) {
            return Ok(store.schema().clone());
        }
        Ok(self.cache.schema(table)?.clone())
    }

    fn scan(&mut self, table: &str, predicate: Option<&Predicate>, limit: Option<usize>) -> Result<Vec<Row>> {
        if let Some(store) = self.overlay(table) {
            return Ok(store.scan(predicate, limit)?.cloned().collect());
        }
        let _guard = self.locks.acquire(table)?;
        let store = refresh(self.cache, table)?;
        let rows: Vec<Row> = store.scan(predicate, limit)?.cloned().collect();
        Ok(rows)
    }
}
