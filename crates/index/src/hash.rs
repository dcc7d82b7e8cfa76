//! Hash index implementation.
//!
//! Constant expected-time point lookups over a `hashbrown::HashMap`.

use core::hash::Hash;

use hashbrown::HashMap;
use quill_core::RowId;

use crate::stats::IndexStats;
use crate::traits::{Index, IndexError};

/// A hash-based index supporting unique and non-unique keys.
#[derive(Clone, Debug)]
pub struct HashIndex<K> {
    map: HashMap<K, Vec<RowId>>,
    unique: bool,
    stats: IndexStats,
}

impl<K: Eq + Hash + Clone> HashIndex<K> {
    pub fn new(unique: bool) -> Self {
        Self {
            map: HashMap::new(),
            unique,
            stats: IndexStats::new(),
        }
    }

    pub fn with_capacity(unique: bool, capacity: usize) -> Self {
        Self {
            map: HashMap::with_capacity(capacity),
            unique,
            stats: IndexStats::new(),
        }
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn stats(&self) -> &IndexStats {
        &self.stats
    }

    /// Iterates over every (key, locator) entry.
    pub fn entries(&self) -> impl Iterator<Item = (&K, RowId)> + '_ {
        self.map
            .iter()
            .flat_map(|(k, ids)| ids.iter().map(move |id| (k, *id)))
    }
}

impl<K: Eq + Hash + Clone> Index<K> for HashIndex<K> {
    fn add(&mut self, key: K, row_id: RowId) -> Result<(), IndexError> {
        if self.unique && self.map.contains_key(&key) {
            return Err(IndexError::DuplicateKey);
        }
        let ids = self.map.entry(key).or_default();
        let new_key = ids.is_empty();
        ids.push(row_id);
        self.stats.add_row(new_key);
        Ok(())
    }

    fn get(&self, key: &K) -> Vec<RowId> {
        self.map.get(key).cloned().unwrap_or_default()
    }

    fn remove(&mut self, key: &K, row_id: Option<RowId>) {
        match row_id {
            Some(id) => {
                if let Some(ids) = self.map.get_mut(key) {
                    let before = ids.len();
                    ids.retain(|&x| x != id);
                    let removed = before - ids.len();
                    let gone = ids.is_empty();
                    if gone {
                        self.map.remove(key);
                    }
                    if removed > 0 {
                        self.stats.remove_rows(removed, gone);
                    }
                }
            }
            None => {
                if let Some(ids) = self.map.remove(key) {
                    self.stats.remove_rows(ids.len(), true);
                }
            }
        }
    }

    fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    fn len(&self) -> usize {
        self.stats.total_rows()
    }

    fn clear(&mut self) {
        self.map.clear();
        self.stats.clear();
    }
}
