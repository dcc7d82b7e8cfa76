//! Transaction management for Quill.
//!
//! A session has at most one active [`Transaction`]. Writes issued while it
//! is active are staged: they are applied to private working copies of the
//! touched tables, so the session reads its own writes, and recorded in a
//! [`Journal`]. COMMIT locks every touched table, replays the journal in
//! order against freshly loaded stores and makes all new table images
//! durable through the [`CommitLog`]. ROLLBACK discards everything.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use quill_core::{Error, Predicate, Result, Value};
use tracing::{debug, info, warn};

use crate::cache::TableCache;
use crate::commit_log::CommitLog;
use crate::journal::{Journal, StagedOp};
use crate::lock::LockManager;
use crate::row_store::RowStore;

static NEXT_TX_ID: AtomicU64 = AtomicU64::new(1);

/// Transaction ID type.
pub type TransactionId = u64;

/// Transaction state. `Committed` and `Aborted` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

/// An open staging context.
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    state: TransactionState,
    journal: Journal,
    /// Working copies of touched tables with the staged writes applied.
    overlays: BTreeMap<String, RowStore>,
}

impl Transaction {
    pub fn begin() -> Self {
        Self {
            id: NEXT_TX_ID.fetch_add(1, Ordering::SeqCst),
            state: TransactionState::Active,
            journal: Journal::new(),
            overlays: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// The working copy of `table`, if this transaction wrote to it.
    pub fn overlay(&self, table: &str) -> Option<&RowStore> {
        self.overlays.get(table)
    }

    fn check_active(&self) -> Result<()> {
        if !self.is_active() {
            return Err(Error::transaction("transaction is not active"));
        }
        Ok(())
    }

    /// Applies `op` to the working copy of its table and records it.
    ///
    /// `base` supplies the current store of a table touched for the first
    /// time. A write that fails validation is neither applied nor recorded.
    pub fn stage<F>(&mut self, op: StagedOp, base: F) -> Result<usize>
    where
        F: FnOnce(&str) -> Result<RowStore>,
    {
        self.check_active()?;
        let overlay = match self.overlays.entry(op.table().to_string()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => e.insert(base(op.table())?.detached()),
        };
        let affected = op.apply(overlay)?;
        debug!(tx = self.id, table = op.table(), affected, "staged write");
        self.journal.record(op);
        Ok(affected)
    }
}

/// Summary of a successful commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitOutcome {
    pub id: TransactionId,
    pub tables: Vec<String>,
    pub operations: usize,
}

/// Per-session transaction state machine.
#[derive(Debug, Default)]
pub struct TransactionManager {
    current: Option<Transaction>,
    last: Option<(TransactionId, TransactionState)>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a transaction. Fails if one is already active.
    pub fn begin(&mut self) -> Result<TransactionId> {
        if let Some(tx) = &self.current {
            return Err(Error::transaction(format!(
                "transaction {} is already active",
                tx.id()
            )));
        }
        let tx = Transaction::begin();
        let id = tx.id();
        self.current = Some(tx);
        info!(tx = id, "transaction started");
        Ok(id)
    }

    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    pub fn current(&self) -> Option<&Transaction> {
        self.current.as_ref()
    }

    /// State of the active transaction, or of the last finished one.
    pub fn state(&self) -> Option<TransactionState> {
        match &self.current {
            Some(tx) => Some(tx.state()),
            None => self.last.map(|(_, state)| state),
        }
    }

    /// Working copy of `table` in the active transaction, if any.
    pub fn overlay(&self, table: &str) -> Option<&RowStore> {
        self.current.as_ref().and_then(|tx| tx.overlay(table))
    }

    fn active_mut(&mut self, action: &str) -> Result<&mut Transaction> {
        self.current
            .as_mut()
            .ok_or_else(|| Error::transaction(format!("{} without an active transaction", action)))
    }

    /// Stages a write in the active transaction.
    pub fn stage<F>(&mut self, op: StagedOp, base: F) -> Result<usize>
    where
        F: FnOnce(&str) -> Result<RowStore>,
    {
        self.active_mut("write staging")?.stage(op, base)
    }

    pub fn stage_insert<F>(&mut self, table: &str, values: Vec<Value>, base: F) -> Result<usize>
    where
        F: FnOnce(&str) -> Result<RowStore>,
    {
        let op = StagedOp::Insert {
            table: table.to_string(),
            values,
        };
        self.stage(op, base)
    }

    pub fn stage_update<F>(
        &mut self,
        table: &str,
        predicate: Option<Predicate>,
        assignments: Vec<(String, Value)>,
        base: F,
    ) -> Result<usize>
    where
        F: FnOnce(&str) -> Result<RowStore>,
    {
        let op = StagedOp::Update {
            table: table.to_string(),
            predicate,
            assignments,
        };
        self.stage(op, base)
    }

    pub fn stage_delete<F>(&mut self, table: &str, predicate: Option<Predicate>, base: F) -> Result<usize>
    where
        F: FnOnce(&str) -> Result<RowStore>,
    {
        let op = StagedOp::Delete {
            table: table.to_string(),
            predicate,
        };
        self.stage(op, base)
    }

    fn finish(&mut self, mut tx: Transaction, state: TransactionState) {
        tx.state = state;
        tx.journal.clear();
        tx.overlays.clear();
        self.last = Some((tx.id, state));
    }

    /// Discards the active transaction.
    pub fn rollback(&mut self) -> Result<TransactionId> {
        self.active_mut("ROLLBACK")?;
        let tx = match self.current.take() {
            Some(tx) => tx,
            None => return Err(Error::transaction("ROLLBACK without an active transaction")),
        };
        let id = tx.id();
        info!(tx = id, discarded = tx.journal().len(), "transaction rolled back");
        self.finish(tx, TransactionState::Aborted);
        Ok(id)
    }

    /// Makes every staged write durable, or none of them.
    ///
    /// If the locks cannot be taken the error is returned unchanged and the
    /// transaction stays active, so COMMIT can be retried. If a staged write
    /// no longer validates against the current table contents, or the new
    /// images cannot be written, the transaction is aborted with a
    /// transaction error carrying the cause.
    pub fn commit(&mut self, cache: &mut TableCache, locks: &LockManager, log: &CommitLog) -> Result<CommitOutcome> {
        let tables: Vec<String> = self.active_mut("COMMIT")?.journal().tables().into_iter().collect();
        let _guards = locks.acquire_all(&tables)?;

        let tx = match self.current.take() {
            Some(tx) => tx,
            None => return Err(Error::transaction("COMMIT without an active transaction")),
        };
        let id = tx.id();
        let operations = tx.journal().len();

        let working = match replay(tx.journal(), cache, &tables) {
            Ok(working) => working,
            Err(e) => {
                warn!(tx = id, error = %e, "staged write failed at commit, aborting");
                self.finish(tx, TransactionState::Aborted);
                return Err(Error::commit_aborted(e));
            }
        };

        if let Err(e) = persist(&working, log) {
            warn!(tx = id, error = %e, "commit write failed, aborting");
            self.finish(tx, TransactionState::Aborted);
            return Err(Error::commit_aborted(e));
        }

        for (_, mut store) in working {
            store.attach();
            cache.replace(store);
        }
        info!(tx = id, tables = ?tables, operations, "transaction committed");
        self.finish(tx, TransactionState::Committed);
        Ok(CommitOutcome {
            id,
            tables,
            operations,
        })
    }
}

/// Replays the journal against fresh working copies of `tables`.
fn replay(journal: &Journal, cache: &mut TableCache, tables: &[String]) -> Result<BTreeMap<String, RowStore>> {
    let mut working = BTreeMap::new();
    for table in tables {
        let store = cache.get_mut(table)?;
        store.reload_if_changed()?;
        working.insert(table.clone(), store.detached());
    }
    for op in journal.entries() {
        let store = working
            .get_mut(op.table())
            .ok_or_else(|| Error::table_not_found(op.table()))?;
        op.apply(store)?;
    }
    Ok(working)
}

/// Writes all new images through the commit log.
fn persist(working: &BTreeMap<String, RowStore>, log: &CommitLog) -> Result<()> {
    let mut images = Vec::with_capacity(working.len());
    for (table, store) in working {
        images.push((table.clone(), store.encode()?));
    }
    log.commit(&images).map(|_| ())
}
