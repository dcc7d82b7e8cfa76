//! Index statistics.

/// Entry counters for an index.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexStats {
    total_rows: usize,
    distinct_keys: usize,
}

impl IndexStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of (key, locator) entries.
    pub fn total_rows(&self) -> usize {
        self.total_rows
    }

    pub fn distinct_keys(&self) -> usize {
        self.distinct_keys
    }

    pub(crate) fn add_row(&mut self, new_key: bool) {
        self.total_rows += 1;
        if new_key {
            self.distinct_keys += 1;
        }
    }

    pub(crate) fn remove_rows(&mut self, count: usize, key_gone: bool) {
        self.total_rows = self.total_rows.saturating_sub(count);
        if key_gone {
            self.distinct_keys = self.distinct_keys.saturating_sub(1);
        }
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }
}
