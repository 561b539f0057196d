//! Transaction overlays: sparse per-table and per-index views of a
//! transaction's pending writes. Overlays never touch committed state;
//! they are merged at commit or discarded at rollback.

use std::collections::{HashMap, HashSet};

use heron_common::types::RowKey;

/// Net effect of a transaction on one row. The overlay keeps the *net*
/// delta: insert-then-update collapses to Insert(new), insert-then-delete
/// removes the entry entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowDelta {
    /// Row did not exist in committed state when buffered.
    Insert(Vec<u8>),
    /// Row existed in committed state; payload replaced.
    Update(Vec<u8>),
    /// Row existed in committed state; tombstoned.
    Delete,
}

/// Per-table overlay of a transaction's pending row changes.
#[derive(Debug, Clone, Default)]
pub struct TableOverlay {
    entries: HashMap<RowKey, RowDelta>,
}

impl TableOverlay {
    pub fn delta(&self, key: &[u8]) -> Option<&RowDelta> {
        self.entries.get(key)
    }

    /// Effective payload under this overlay:
    /// `Some(Some(bytes))` — written by the transaction,
    /// `Some(None)`        — deleted by the transaction,
    /// `None`              — untouched, fall through to committed state.
    pub fn effective(&self, key: &[u8]) -> Option<Option<&[u8]>> {
        self.entries.get(key).map(|delta| match delta {
            RowDelta::Insert(v) | RowDelta::Update(v) => Some(v.as_slice()),
            RowDelta::Delete => None,
        })
    }

    /// Buffer an insert of a row the transaction effectively sees as
    /// absent. The caller has already checked both overlay and committed
    /// store for duplicates. Re-inserting a key the transaction deleted
    /// nets out to a replacement of the committed row.
    pub fn buffer_insert(&mut self, key: RowKey, value: Vec<u8>) {
        match self.entries.get(&key) {
            Some(RowDelta::Delete) => {
                self.entries.insert(key, RowDelta::Update(value));
            }
            _ => {
                self.entries.insert(key, RowDelta::Insert(value));
            }
        }
    }

    /// Buffer an update of an effective row.
    pub fn buffer_update(&mut self, key: RowKey, value: Vec<u8>) {
        match self.entries.get(&key) {
            Some(RowDelta::Insert(_)) => {
                self.entries.insert(key, RowDelta::Insert(value));
            }
            _ => {
                self.entries.insert(key, RowDelta::Update(value));
            }
        }
    }

    /// Buffer a delete of an effective row. Deleting a row the transaction
    /// itself inserted leaves no trace.
    pub fn buffer_delete(&mut self, key: &[u8]) {
        match self.entries.get(key) {
            Some(RowDelta::Insert(_)) => {
                self.entries.remove(key);
            }
            _ => {
                self.entries.insert(key.to_vec(), RowDelta::Delete);
            }
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &RowKey> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RowKey, &RowDelta)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-index overlay: index entries the transaction would add or remove.
/// Used only so the transaction's own index-assisted reads see its pending
/// rows; committed index state is rebuilt from row deltas at commit.
#[derive(Debug, Clone, Default)]
pub struct IndexOverlay {
    added: HashMap<Vec<u8>, HashSet<RowKey>>,
    removed: HashMap<Vec<u8>, HashSet<RowKey>>,
}

impl IndexOverlay {
    pub fn record_add(&mut self, value: Vec<u8>, key: RowKey) {
        if let Some(set) = self.removed.get_mut(&value) {
            if set.remove(&key) {
                if set.is_empty() {
                    self.removed.remove(&value);
                }
                return;
            }
        }
        self.added.entry(value).or_default().insert(key);
    }

    pub fn record_remove(&mut self, value: Vec<u8>, key: RowKey) {
        if let Some(set) = self.added.get_mut(&value) {
            if set.remove(&key) {
                if set.is_empty() {
                    self.added.remove(&value);
                }
                return;
            }
        }
        self.removed.entry(value).or_default().insert(key);
    }

    /// Merge this overlay into a committed candidate-key set.
    pub fn apply(&self, value: &[u8], mut base: HashSet<RowKey>) -> HashSet<RowKey> {
        if let Some(removed) = self.removed.get(value) {
            for key in removed {
                base.remove(key);
            }
        }
        if let Some(added) = self.added.get(value) {
            for key in added {
                base.insert(key.clone());
            }
        }
        base
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}
