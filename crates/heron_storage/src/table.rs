//! Committed row store for one table: concurrent map of encoded primary
//! key to row payload. Only commit-path code mutates it; transactions see
//! their pending changes through overlays layered on top.

use std::sync::Arc;

use dashmap::DashMap;

use heron_common::error::StorageError;
use heron_common::schema::TableDef;
use heron_common::types::{hex_encode, RowKey};

use crate::overlay::TableOverlay;

pub struct TableStore {
    def: Arc<TableDef>,
    rows: DashMap<RowKey, Arc<Vec<u8>>>,
}

impl TableStore {
    pub fn new(def: Arc<TableDef>) -> Self {
        Self {
            def,
            rows: DashMap::new(),
        }
    }

    pub fn def(&self) -> &Arc<TableDef> {
        &self.def
    }

    pub fn get(&self, key: &[u8]) -> Option<Arc<Vec<u8>>> {
        self.rows.get(key).map(|e| Arc::clone(e.value()))
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.rows.contains_key(key)
    }

    /// Insert a committed row. Fails on primary key collision.
    pub fn insert(&self, key: RowKey, value: Arc<Vec<u8>>) -> Result<(), StorageError> {
        use dashmap::mapref::entry::Entry;
        match self.rows.entry(key) {
            Entry::Occupied(e) => Err(StorageError::DuplicateKey {
                table: self.def.name.clone(),
                key_hex: hex_encode(e.key()),
            }),
            Entry::Vacant(e) => {
                e.insert(value);
                Ok(())
            }
        }
    }

    /// Replace an existing committed row, returning the previous payload.
    pub fn replace(&self, key: &[u8], value: Arc<Vec<u8>>) -> Result<Arc<Vec<u8>>, StorageError> {
        match self.rows.get_mut(key) {
            Some(mut e) => Ok(std::mem::replace(e.value_mut(), value)),
            None => Err(StorageError::KeyNotFound),
        }
    }

    pub fn remove(&self, key: &[u8]) -> Option<Arc<Vec<u8>>> {
        self.rows.remove(key).map(|(_, v)| v)
    }

    /// Stable snapshot of all committed keys, for full scans and backfill.
    pub fn key_snapshot(&self) -> Vec<RowKey> {
        self.rows.iter().map(|e| e.key().clone()).collect()
    }

    /// Snapshot of all committed rows, for index backfill.
    pub fn row_snapshot(&self) -> Vec<(RowKey, Arc<Vec<u8>>)> {
        self.rows
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect()
    }

    /// Overlay-wins-else-base-else-absent resolution for one key.
    pub fn effective_get(
        &self,
        key: &[u8],
        overlay: Option<&TableOverlay>,
    ) -> Option<Arc<Vec<u8>>> {
        if let Some(overlay) = overlay {
            match overlay.effective(key) {
                Some(Some(bytes)) => return Some(Arc::new(bytes.to_vec())),
                Some(None) => return None,
                None => {}
            }
        }
        self.get(key)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heron_common::schema::{ColumnType, TableDef};

    fn store() -> TableStore {
        let def = TableDef::builder()
            .tablespace("ts1")
            .name("t1")
            .not_null_column("id", ColumnType::Int64)
            .column("name", ColumnType::Text)
            .primary_key("id")
            .build()
            .unwrap();
        TableStore::new(Arc::new(def))
    }

    #[test]
    fn insert_rejects_duplicate_key() {
        let s = store();
        s.insert(vec![1], Arc::new(vec![10])).unwrap();
        let err = s.insert(vec![1], Arc::new(vec![11])).unwrap_err();
        assert!(matches!(err, StorageError::DuplicateKey { .. }));
        assert_eq!(s.get(&[1]).unwrap().as_slice(), &[10]);
    }

    #[test]
    fn replace_requires_existing_row() {
        let s = store();
        assert!(matches!(
            s.replace(&[9], Arc::new(vec![1])),
            Err(StorageError::KeyNotFound)
        ));
        s.insert(vec![9], Arc::new(vec![1])).unwrap();
        let old = s.replace(&[9], Arc::new(vec![2])).unwrap();
        assert_eq!(old.as_slice(), &[1]);
        assert_eq!(s.get(&[9]).unwrap().as_slice(), &[2]);
    }

    #[test]
    fn effective_get_prefers_overlay() {
        let s = store();
        s.insert(vec![1], Arc::new(vec![10])).unwrap();
        s.insert(vec![2], Arc::new(vec![20])).unwrap();

        let mut overlay = TableOverlay::default();
        overlay.buffer_update(vec![1], vec![99]);
        overlay.buffer_delete(&[2]);
        overlay.buffer_insert(vec![3], vec![30]);

        assert_eq!(
            s.effective_get(&[1], Some(&overlay)).unwrap().as_slice(),
            &[99]
        );
        assert!(s.effective_get(&[2], Some(&overlay)).is_none());
        assert_eq!(
            s.effective_get(&[3], Some(&overlay)).unwrap().as_slice(),
            &[30]
        );
        // No overlay: committed state wins.
        assert_eq!(s.effective_get(&[2], None).unwrap().as_slice(), &[20]);
    }
}
