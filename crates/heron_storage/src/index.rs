//! Secondary HASH index: encoded column value → set of primary keys.
//!
//! The entry map is a hint for equality predicates only; the scan executor
//! always re-checks the predicate against the resolved row, so maintenance
//! here can stay simple and idempotent. Insert of a present entry and
//! remove of an absent entry are deliberate no-ops, which lets a backfill
//! run concurrently with committed DML hooks without double-counting.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;

use heron_common::datum::{decode_row, encode_key, Datum};
use heron_common::error::StorageError;
use heron_common::schema::{IndexDef, TableDef};
use heron_common::types::RowKey;

use crate::overlay::IndexOverlay;

pub struct HashIndex {
    def: Arc<IndexDef>,
    /// Indexed column positions in the table's row payload.
    column_indices: Vec<usize>,
    entries: RwLock<HashMap<Vec<u8>, HashSet<RowKey>>>,
}

impl HashIndex {
    pub fn new(def: Arc<IndexDef>, table: &TableDef) -> Result<Self, StorageError> {
        let mut column_indices = Vec::with_capacity(def.columns.len());
        for col in &def.columns {
            let idx = table.find_column(col).ok_or_else(|| {
                StorageError::InvalidSchema(format!(
                    "index {} references unknown column {col} of table {}",
                    def.name, table.name
                ))
            })?;
            column_indices.push(idx);
        }
        if column_indices.is_empty() {
            return Err(StorageError::InvalidSchema(format!(
                "index {} has no columns",
                def.name
            )));
        }
        Ok(Self {
            def,
            column_indices,
            entries: RwLock::new(HashMap::new()),
        })
    }

    pub fn def(&self) -> &Arc<IndexDef> {
        &self.def
    }

    /// Extract and encode the indexed value from a row payload.
    pub fn indexed_value(&self, row_bytes: &[u8]) -> Result<Vec<u8>, StorageError> {
        let values = decode_row(row_bytes)?;
        let mut picked: Vec<Datum> = Vec::with_capacity(self.column_indices.len());
        for &idx in &self.column_indices {
            let datum = values.get(idx).ok_or_else(|| {
                StorageError::Codec(format!(
                    "row too short for index {} (missing column {idx})",
                    self.def.name
                ))
            })?;
            picked.push(datum.clone());
        }
        Ok(encode_key(&picked))
    }

    /// Populate the index from a committed row snapshot. Entries already
    /// applied by concurrent DML hooks are absorbed by the set semantics.
    pub fn rebuild(&self, rows: &[(RowKey, Arc<Vec<u8>>)]) -> Result<(), StorageError> {
        for (key, value) in rows {
            self.on_insert(key, value)?;
        }
        Ok(())
    }

    pub fn on_insert(&self, key: &RowKey, value: &[u8]) -> Result<(), StorageError> {
        let indexed = self.indexed_value(value)?;
        self.entries
            .write()
            .entry(indexed)
            .or_default()
            .insert(key.clone());
        Ok(())
    }

    pub fn on_update(&self, key: &RowKey, old: &[u8], new: &[u8]) -> Result<(), StorageError> {
        let old_indexed = self.indexed_value(old)?;
        let new_indexed = self.indexed_value(new)?;
        if old_indexed == new_indexed {
            return Ok(());
        }
        let mut entries = self.entries.write();
        if let Some(set) = entries.get_mut(&old_indexed) {
            set.remove(key);
            if set.is_empty() {
                entries.remove(&old_indexed);
            }
        }
        entries.entry(new_indexed).or_default().insert(key.clone());
        Ok(())
    }

    pub fn on_delete(&self, key: &RowKey, old: &[u8]) -> Result<(), StorageError> {
        let indexed = self.indexed_value(old)?;
        let mut entries = self.entries.write();
        if let Some(set) = entries.get_mut(&indexed) {
            set.remove(key);
            if set.is_empty() {
                entries.remove(&indexed);
            }
        }
        Ok(())
    }

    /// Candidate primary keys for an encoded value, committed entries only.
    pub fn lookup(&self, value: &[u8]) -> HashSet<RowKey> {
        self.entries.read().get(value).cloned().unwrap_or_default()
    }

    /// Candidate keys merged with a transaction's pending index changes.
    pub fn lookup_with_overlay(
        &self,
        value: &[u8],
        overlay: Option<&IndexOverlay>,
    ) -> HashSet<RowKey> {
        let base = self.lookup(value);
        match overlay {
            Some(o) => o.apply(value, base),
            None => base,
        }
    }

    pub fn entry_count(&self) -> usize {
        self.entries.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heron_common::datum::encode_row;
    use heron_common::schema::{ColumnType, TableDef};

    fn table() -> TableDef {
        TableDef::builder()
            .tablespace("ts1")
            .name("t1")
            .not_null_column("id", ColumnType::Int64)
            .column("name", ColumnType::Text)
            .primary_key("id")
            .build()
            .unwrap()
    }

    fn name_index(table: &TableDef) -> HashIndex {
        let def = IndexDef::new("ts1", "t1", "t1_name", vec!["name".into()]);
        HashIndex::new(Arc::new(def), table).unwrap()
    }

    fn row(id: i64, name: &str) -> Vec<u8> {
        encode_row(&[Datum::Int64(id), Datum::Text(name.into())])
    }

    fn key(id: i64) -> RowKey {
        encode_key(&[Datum::Int64(id)])
    }

    #[test]
    fn new_rejects_unknown_column() {
        let def = IndexDef::new("ts1", "t1", "bad", vec!["missing".into()]);
        assert!(matches!(
            HashIndex::new(Arc::new(def), &table()),
            Err(StorageError::InvalidSchema(_))
        ));
    }

    #[test]
    fn rebuild_then_lookup() {
        let t = table();
        let idx = name_index(&t);
        let rows = vec![
            (key(1), Arc::new(row(1, "a"))),
            (key(2), Arc::new(row(2, "a"))),
            (key(3), Arc::new(row(3, "b"))),
        ];
        idx.rebuild(&rows).unwrap();

        let hits = idx.lookup(&encode_key(&[Datum::Text("a".into())]));
        assert_eq!(hits.len(), 2);
        assert!(hits.contains(&key(1)));
        assert!(hits.contains(&key(2)));
        assert_eq!(idx.lookup(&encode_key(&[Datum::Text("c".into())])).len(), 0);
    }

    #[test]
    fn update_moves_entry_between_values() {
        let t = table();
        let idx = name_index(&t);
        idx.on_insert(&key(1), &row(1, "a")).unwrap();
        idx.on_update(&key(1), &row(1, "a"), &row(1, "b")).unwrap();

        assert!(idx.lookup(&encode_key(&[Datum::Text("a".into())])).is_empty());
        assert!(idx
            .lookup(&encode_key(&[Datum::Text("b".into())]))
            .contains(&key(1)));
    }

    #[test]
    fn delete_drops_empty_entry() {
        let t = table();
        let idx = name_index(&t);
        idx.on_insert(&key(1), &row(1, "a")).unwrap();
        idx.on_delete(&key(1), &row(1, "a")).unwrap();
        assert_eq!(idx.entry_count(), 0);
        // Removing again is a no-op, not an error.
        idx.on_delete(&key(1), &row(1, "a")).unwrap();
    }

    #[test]
    fn rebuild_absorbs_concurrent_hook_entries() {
        let t = table();
        let idx = name_index(&t);
        idx.on_insert(&key(1), &row(1, "a")).unwrap();
        // Backfill sees the same row again.
        idx.rebuild(&[(key(1), Arc::new(row(1, "a")))]).unwrap();
        assert_eq!(idx.lookup(&encode_key(&[Datum::Text("a".into())])).len(), 1);
    }

    #[test]
    fn lookup_with_overlay_merges_pending() {
        let t = table();
        let idx = name_index(&t);
        idx.on_insert(&key(1), &row(1, "a")).unwrap();

        let mut overlay = IndexOverlay::default();
        let a = encode_key(&[Datum::Text("a".into())]);
        overlay.record_remove(a.clone(), key(1));
        overlay.record_add(a.clone(), key(5));

        let hits = idx.lookup_with_overlay(&a, Some(&overlay));
        assert!(!hits.contains(&key(1)));
        assert!(hits.contains(&key(5)));
    }
}
