//! In-process mirror of the ledger's live set.
//!
//! A plain `HashMap` behind a `parking_lot::RwLock`: readers share the lock,
//! writers take it exclusively. Nothing here touches the ledger or fails; the
//! synchronized store decides when the mirror may change.

use super::ledger::Entry;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Key -> last-known live row.
#[derive(Debug, Default)]
pub struct MemoryMirror {
    data: RwLock<HashMap<String, Entry>>,
}

impl MemoryMirror {
    /// Creates an empty mirror.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole mirror with `rows`.
    ///
    /// The new map is built before the write lock is taken, so readers see
    /// either the old contents or the new ones, never a mix.
    pub fn load(&self, rows: Vec<Entry>) {
        let fresh: HashMap<String, Entry> = rows
            .into_iter()
            .filter(Entry::is_live)
            .map(|e| (e.key.clone(), e))
            .collect();
        *self.data.write() = fresh;
    }

    /// Returns the cached row for `key`.
    pub fn get(&self, key: &str) -> Option<Entry> {
        self.data.read().get(key).cloned()
    }

    /// Inserts or overwrites the row for `entry.key`.
    pub fn set(&self, entry: Entry) {
        self.data.write().insert(entry.key.clone(), entry);
    }

    /// Removes `key`. Returns whether it was present.
    pub fn delete(&self, key: &str) -> bool {
        self.data.write().remove(key).is_some()
    }

    /// Snapshot of every cached row, in no particular order.
    pub fn list(&self) -> Vec<Entry> {
        self.data.read().values().cloned().collect()
    }

    /// Number of cached rows.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Drops every cached row.
    pub fn clear(&self) {
        self.data.write().clear();
    }
}
