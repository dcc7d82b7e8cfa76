//! Index trait definitions.

use quill_core::RowId;
use thiserror::Error;

/// Point-lookup index from keys to row locators.
pub trait Index<K> {
    /// Adds a mapping. A unique index rejects a key that is already present.
    fn add(&mut self, key: K, row_id: RowId) -> Result<(), IndexError>;

    /// Returns every locator stored under `key`; empty when absent.
    fn get(&self, key: &K) -> Vec<RowId>;

    /// Removes one locator under `key`, or every locator when `row_id` is None.
    fn remove(&mut self, key: &K, row_id: Option<RowId>);

    fn contains_key(&self, key: &K) -> bool;

    /// Number of (key, locator) entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&mut self);
}

/// Errors raised by index maintenance.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum IndexError {
    #[error("duplicate key in unique index")]
    DuplicateKey,
}
