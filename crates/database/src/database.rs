//! Database - main entry point for Quill operations.
//!
//! A [`Database`] owns everything one session needs for a data directory:
//! the open table stores, the lock manager, the commit log and the
//! session's transaction state. Commands are dispatched through
//! [`Database::execute`].
//!
//! Every access to a table store happens under that table's lock, after
//! picking up changes other processes made to its durable file. Schema
//! changes additionally hold the lock of the metadata descriptor while they
//! rewrite it, so that concurrent DDL on different tables does not lose
//! descriptor entries.

use std::collections::BTreeMap;
use std::fs;
use std::time::Duration;

use quill_core::schema::Table;
use quill_core::{DataType, Error, ErrorKind, Predicate, Result, Value};
use quill_query::{ColumnDef, Command, Condition, QueryExecutor, Relation};
use quill_storage::{file, CommitLog, LockManager, RowStore, TableCache, TransactionManager};
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, TableDescriptor};
use crate::config::DatabaseConfig;
use crate::query_engine::{refresh, TableCacheDataSource};

/// Column names of a DESCRIBE result.
pub const DESCRIBE_COLUMNS: [&str; 5] = ["column", "type", "primary_key", "unique", "references"];

/// Result of one command.
#[derive(Clone, Debug, PartialEq)]
pub enum ExecutionResult {
    /// Rows of SELECT, JOIN and DESCRIBE.
    Rows(Relation),
    /// Number of rows written by INSERT, UPDATE or DELETE.
    Affected(usize),
    /// Outcome of DDL and transaction control.
    Status(String),
    /// Table names of SHOW TABLES.
    Tables(Vec<String>),
}

impl ExecutionResult {
    pub fn rows(&self) -> Option<&Relation> {
        match self {
            ExecutionResult::Rows(relation) => Some(relation),
            _ => None,
        }
    }

    pub fn into_rows(self) -> Option<Relation> {
        match self {
            ExecutionResult::Rows(relation) => Some(relation),
            _ => None,
        }
    }

    pub fn affected(&self) -> Option<usize> {
        match self {
            ExecutionResult::Affected(n) => Some(*n),
            _ => None,
        }
    }
}

/// The database handle of one session.
#[derive(Debug)]
pub struct Database {
    config: DatabaseConfig,
    cache: TableCache,
    locks: LockManager,
    log: CommitLog,
    transactions: TransactionManager,
}

impl Database {
    /// Opens the data directory of `config`, creating it if needed.
    ///
    /// An interrupted commit is completed or discarded first. Tables whose
    /// durable file is corrupted stay registered but unusable; the others
    /// open normally.
    pub fn open(config: DatabaseConfig) -> Result<Self> {
        let dir = config.data_dir.clone();
        fs::create_dir_all(&dir).map_err(|e| Error::io(format!("creating {}", dir.display()), e))?;

        let locks = LockManager::new(&dir, config.lock_config());
        let log = CommitLog::new(&dir);
        let schemas = Catalog::load(&config.metadata_path())?.schemas()?;
        let names: Vec<&str> = schemas.iter().map(Table::name).collect();

        let mut cache = TableCache::new();
        {
            let _guards = locks.acquire_all(&names)?;
            log.recover()?;
            for schema in &schemas {
                match RowStore::open(&dir, schema.clone()) {
                    Ok(store) => cache.insert(store)?,
                    Err(e) if e.kind() == ErrorKind::IoCorruption => {
                        warn!(table = schema.name(), error = %e, "quarantining table");
                        cache.quarantine(schema.clone(), e.to_string());
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        info!(dir = %dir.display(), tables = cache.len(), "opened database");
        Ok(Self {
            config,
            cache,
            locks,
            log,
            transactions: TransactionManager::new(),
        })
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Names of all tables, in sorted order.
    pub fn table_names(&self) -> Vec<String> {
        self.cache.table_names()
    }

    pub fn in_transaction(&self) -> bool {
        self.transactions.is_active()
    }

    /// Whether `table` was found corrupted and is unusable.
    pub fn is_quarantined(&self, table: &str) -> bool {
        self.cache.is_quarantined(table)
    }

    /// Removes lock markers older than `max_age`, left behind by crashed
    /// processes. Returns the tables whose lock was reclaimed.
    pub fn reclaim_stale_locks(&self, max_age: Duration) -> Result<Vec<String>> {
        self.locks.reclaim_stale(max_age)
    }

    /// One row per column: name, type, key designations and foreign-key
    /// target. Works for quarantined tables too.
    pub fn describe(&self, table: &str) -> Result<Relation> {
        let schema = self.cache.schema(table)?;
        let flag = |set: bool| Value::from(if set { "YES" } else { "NO" });
        let rows = schema
            .columns()
            .iter()
            .map(|c| {
                vec![
                    Value::from(c.name()),
                    Value::from(c.data_type().name()),
                    flag(schema.primary_key() == Some(c.name())),
                    flag(schema.unique_columns().iter().any(|u| u == c.name())),
                    Value::from(schema.foreign_keys().get(c.name()).cloned()),
                ]
            })
            .collect();
        let columns = DESCRIBE_COLUMNS.iter().map(|c| c.to_string()).collect();
        Ok(Relation::from_values(columns, rows))
    }

    /// Executes one command.
    ///
    /// Writes issued between BEGIN and COMMIT are staged and become durable
    /// together at COMMIT. Schema changes are rejected inside a transaction.
    pub fn execute(&mut self, command: Command) -> Result<ExecutionResult> {
        let kind = command.kind();
        if command.is_ddl() && self.transactions.is_active() {
            return Err(Error::transaction(format!("{} is not allowed inside a transaction", kind)));
        }
        debug!(%kind, table = ?command.table(), "executing command");

        let result = match command {
            Command::CreateTable {
                table,
                columns,
                primary_key,
                unique,
                foreign_keys,
            } => self.create_table(&table, columns, primary_key, unique, foreign_keys),
            Command::Insert { table, columns, values } => self.insert(&table, columns, values),
            Command::Select(query) => self.query(|exec| exec.select(&query)).map(ExecutionResult::Rows),
            Command::Join {
                left,
                right,
                on,
                columns,
            } => self
                .query(|exec| exec.join(&left, &right, &on, &columns))
                .map(ExecutionResult::Rows),
            Command::Update {
                table,
                assignments,
                condition,
            } => self.update(&table, assignments, condition.as_ref()),
            Command::Delete { table, condition } => self.delete(&table, condition.as_ref()),
            Command::AlterAddColumn {
                table,
                column,
                data_type,
            } => self.add_column(&table, &column, data_type),
            Command::AlterDropColumn { table, column } => self
                .alter(&table, |store| store.drop_column(&column))
                .map(|()| status(format!("column '{}' dropped from '{}'", column, table))),
            Command::AlterRenameColumn { table, from, to } => self
                .alter(&table, |store| store.rename_column(&from, &to))
                .map(|()| status(format!("column '{}' of '{}' renamed to '{}'", from, table, to))),
            Command::RenameTable { table, to } => self.rename_table(&table, &to),
            Command::DropTable { table } => self.drop_table(&table),
            Command::Describe { table } => self.describe(&table).map(ExecutionResult::Rows),
            Command::ShowTables => Ok(ExecutionResult::Tables(self.table_names())),
            Command::Begin => self
                .transactions
                .begin()
                .map(|id| status(format!("transaction {} started", id))),
            Command::Commit => self
                .transactions
                .commit(&mut self.cache, &self.locks, &self.log)
                .map(|outcome| {
                    status(format!(
                        "transaction {} committed ({} operations)",
                        outcome.id, outcome.operations
                    ))
                }),
            Command::Rollback => self
                .transactions
                .rollback()
                .map(|id| status(format!("transaction {} rolled back", id))),
        };

        if let Err(e) = &result {
            debug!(%kind, error = %e, "command failed");
        }
        result
    }

    /// Runs `f` with an executor reading through locks, or through the
    /// working copies of the active transaction.
    fn query<T>(&mut self, f: impl FnOnce(&mut QueryExecutor<'_, TableCacheDataSource<'_>>) -> Result<T>) -> Result<T> {
        let mut source = TableCacheDataSource::new(&mut self.cache, &self.locks).with_transactions(&self.transactions);
        let mut executor = QueryExecutor::new(&mut source);
        f(&mut executor)
    }

    fn resolve(&mut self, condition: Option<&Condition>) -> Result<Option<Predicate>> {
        match condition {
            Some(condition) => self.query(|exec| exec.resolve_condition(condition)).map(Some),
            None => Ok(None),
        }
    }

    fn insert(&mut self, table: &str, columns: Option<Vec<String>>, values: Vec<Value>) -> Result<ExecutionResult> {
        let values = match columns {
            None => values,
            Some(columns) => {
                if columns.len() != values.len() {
                    return Err(Error::schema(format!(
                        "{} columns named but {} values supplied",
                        columns.len(),
                        values.len()
                    )));
                }
                self.cache
                    .schema(table)?
                    .row_from_named(columns.into_iter().zip(values).collect())?
            }
        };

        if self.transactions.is_active() {
            let (cache, locks) = (&mut self.cache, &self.locks);
            self.transactions
                .stage_insert(table, values, |name| snapshot(cache, locks, name))?;
        } else {
            let _guard = self.locks.acquire(table)?;
            refresh(&mut self.cache, table)?.insert(values)?;
        }
        Ok(ExecutionResult::Affected(1))
    }

    fn update(
        &mut self,
        table: &str,
        assignments: Vec<(String, Value)>,
        condition: Option<&Condition>,
    ) -> Result<ExecutionResult> {
        let predicate = self.resolve(condition)?;
        let affected = if self.transactions.is_active() {
            let (cache, locks) = (&mut self.cache, &self.locks);
            self.transactions
                .stage_update(table, predicate, assignments, |name| snapshot(cache, locks, name))?
        } else {
            let _guard = self.locks.acquire(table)?;
            refresh(&mut self.cache, table)?.update(predicate.as_ref(), &assignments)?
        };
        Ok(ExecutionResult::Affected(affected))
    }

    fn delete(&mut self, table: &str, condition: Option<&Condition>) -> Result<ExecutionResult> {
        let predicate = self.resolve(condition)?;
        let affected = if self.transactions.is_active() {
            let (cache, locks) = (&mut self.cache, &self.locks);
            self.transactions
                .stage_delete(table, predicate, |name| snapshot(cache, locks, name))?
        } else {
            let _guard = self.locks.acquire(table)?;
            refresh(&mut self.cache, table)?.delete(predicate.as_ref())?
        };
        Ok(ExecutionResult::Affected(affected))
    }

    fn create_table(
        &mut self,
        table: &str,
        columns: Vec<ColumnDef>,
        primary_key: Option<String>,
        unique: Vec<String>,
        foreign_keys: BTreeMap<String, String>,
    ) -> Result<ExecutionResult> {
        let mut column_types = BTreeMap::new();
        for column in &columns {
            if column_types.insert(column.name.clone(), column.data_type).is_some() {
                return Err(Error::schema(format!("duplicate column: {}", column.name)));
            }
        }
        let descriptor = TableDescriptor {
            columns: columns.into_iter().map(|c| c.name).collect(),
            column_types,
            primary_key,
            unique_columns: unique,
            foreign_keys,
        };
        let schema = descriptor.to_table(table)?;

        let path = self.config.metadata_path();
        let _catalog_guard = self.locks.acquire(&self.config.metadata_file)?;
        let mut catalog = Catalog::load(&path)?;
        if self.cache.contains(table) || catalog.contains(table) {
            return Err(Error::table_exists(table));
        }

        let _guard = self.locks.acquire(table)?;
        let store = RowStore::create(&self.config.data_dir, schema)?;
        catalog.insert(store.schema());
        if let Err(e) = catalog.save(&path) {
            if let Err(cleanup) = store.destroy() {
                warn!(table, error = %cleanup, "could not remove file of uncreated table");
            }
            return Err(e);
        }
        self.cache.insert(store)?;
        Ok(status(format!("table '{}' created", table)))
    }

    fn add_column(&mut self, table: &str, column: &str, data_type: DataType) -> Result<ExecutionResult> {
        self.alter(table, |store| store.add_column(column, data_type))?;
        Ok(status(format!("column '{}' added to '{}'", column, table)))
    }

    /// Applies a schema change to the store of `table` and records the new
    /// schema in the metadata descriptor.
    fn alter(&mut self, table: &str, change: impl FnOnce(&mut RowStore) -> Result<()>) -> Result<()> {
        let path = self.config.metadata_path();
        let _catalog_guard = self.locks.acquire(&self.config.metadata_file)?;
        let mut catalog = Catalog::load(&path)?;
        let _guard = self.locks.acquire(table)?;
        let store = refresh(&mut self.cache, table)?;
        change(&mut *store)?;
        catalog.insert(store.schema());
        catalog.save(&path)
    }

    fn rename_table(&mut self, table: &str, to: &str) -> Result<ExecutionResult> {
        let path = self.config.metadata_path();
        let _catalog_guard = self.locks.acquire(&self.config.metadata_file)?;
        let mut catalog = Catalog::load(&path)?;
        if self.cache.contains(to) || catalog.contains(to) {
            return Err(Error::table_exists(to));
        }

        let _guards = self.locks.acquire_all(&[table, to])?;
        refresh(&mut self.cache, table)?;
        let mut store = self
            .cache
            .remove(table)?
            .ok_or_else(|| Error::corruption(table, "table is quarantined"))?;
        let renamed = store.rename_table(to);
        if renamed.is_ok() {
            catalog.remove(table);
            catalog.insert(store.schema());
        }
        self.cache.replace(store);
        renamed?;
        catalog.save(&path)?;
        Ok(status(format!("table '{}' renamed to '{}'", table, to)))
    }

    fn drop_table(&mut self, table: &str) -> Result<ExecutionResult> {
        let path = self.config.metadata_path();
        let _catalog_guard = self.locks.acquire(&self.config.metadata_file)?;
        let mut catalog = Catalog::load(&path)?;
        let _guard = self.locks.acquire(table)?;

        match self.cache.remove(table)? {
            Some(store) => store.destroy()?,
            None => {
                file::remove_if_exists(&file::table_path(&self.config.data_dir, table))?;
            }
        }
        catalog.remove(table);
        catalog.save(&path)?;
        info!(table, "dropped table");
        Ok(status(format!("table '{}' dropped", table)))
    }
}

fn status(message: String) -> ExecutionResult {
    ExecutionResult::Status(message)
}

/// Current contents of `table`, read under its lock, as the base of a
/// transaction's working copy.
fn snapshot(cache: &mut TableCache, locks: &LockManager, table: &str) -> Result<RowStore> {
    let _guard = locks.acquire(table)?;
    Ok(refresh(cache, table)?.clone())
}
