//! Committed storage for one tablespace: the table stores, the secondary
//! index registry, and the metadata catalog, plus the commit-boundary
//! publication path that merges a transaction's buffers into all three.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};

use heron_common::error::StorageError;
use heron_common::types::{hex_encode, IndexState};

use crate::catalog::{CatalogSnapshot, MetadataCatalog, MetadataMutation};
use crate::index::HashIndex;
use crate::overlay::{RowDelta, TableOverlay};
use crate::table::TableStore;

pub struct TablespaceStorage {
    name: String,
    tables: DashMap<String, Arc<TableStore>>,
    indexes: DashMap<String, Arc<HashIndex>>,
    catalog: MetadataCatalog,
    /// Serializes metadata publication and transaction commits. Index
    /// backfill runs under it, so a rebuild always sees a settled row set
    /// apart from autocommit DML, which the idempotent hooks absorb.
    ddl_lock: Mutex<()>,
}

impl TablespaceStorage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: DashMap::new(),
            indexes: DashMap::new(),
            catalog: MetadataCatalog::new(),
            ddl_lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.catalog.snapshot()
    }

    pub fn table(&self, name: &str) -> Result<Arc<TableStore>, StorageError> {
        self.tables
            .get(&name.to_lowercase())
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| StorageError::TableNotFound(name.to_string()))
    }

    pub fn try_table(&self, name: &str) -> Option<Arc<TableStore>> {
        self.tables
            .get(&name.to_lowercase())
            .map(|e| Arc::clone(e.value()))
    }

    /// Resolve an index for a lookup. Only `Active` published indexes are
    /// usable; anything mid-lifecycle is rejected.
    pub fn index(&self, name: &str) -> Result<Arc<HashIndex>, StorageError> {
        let snapshot = self.snapshot();
        let meta = snapshot
            .index(name)
            .ok_or_else(|| StorageError::IndexNotFound(name.to_string()))?;
        if meta.state != IndexState::Active {
            return Err(StorageError::IndexNotUsable {
                index: name.to_string(),
                state: meta.state.to_string(),
            });
        }
        self.indexes
            .get(&name.to_lowercase())
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| StorageError::IndexNotFound(name.to_string()))
    }

    /// Registered indexes covering `table`, including ones still
    /// backfilling. DML hooks maintain those too so the build converges.
    fn registered_indexes_on(&self, table: &str) -> Vec<Arc<HashIndex>> {
        self.indexes
            .iter()
            .filter(|e| e.value().def().table.eq_ignore_ascii_case(table))
            .map(|e| Arc::clone(e.value()))
            .collect()
    }

    // ── Committed DML (autocommit path and commit-time merge) ────────────

    /// Insert a committed row, maintaining all registered indexes.
    pub fn insert_committed(
        &self,
        table: &str,
        key: Vec<u8>,
        value: Vec<u8>,
    ) -> Result<(), StorageError> {
        let store = self.table(table)?;
        let value = Arc::new(value);
        store.insert(key.clone(), Arc::clone(&value))?;
        for idx in self.registered_indexes_on(table) {
            idx.on_insert(&key, &value)?;
        }
        Ok(())
    }

    /// Replace a committed row. Returns false when the key is absent.
    pub fn update_committed(
        &self,
        table: &str,
        key: &[u8],
        value: Vec<u8>,
    ) -> Result<bool, StorageError> {
        let store = self.table(table)?;
        if !store.contains_key(key) {
            return Ok(false);
        }
        let value = Arc::new(value);
        let old = store.replace(key, Arc::clone(&value))?;
        for idx in self.registered_indexes_on(table) {
            idx.on_update(&key.to_vec(), &old, &value)?;
        }
        Ok(true)
    }

    /// Remove a committed row. Returns false when the key is absent.
    pub fn delete_committed(&self, table: &str, key: &[u8]) -> Result<bool, StorageError> {
        let store = self.table(table)?;
        let Some(old) = store.remove(key) else {
            return Ok(false);
        };
        for idx in self.registered_indexes_on(table) {
            idx.on_delete(&key.to_vec(), &old)?;
        }
        Ok(true)
    }

    // ── Metadata publication ─────────────────────────────────────────────

    /// Apply metadata mutations outside a transaction (autocommit DDL).
    pub fn apply_metadata(&self, mutations: &[MetadataMutation]) -> Result<(), StorageError> {
        let guard = self.ddl_lock.lock();
        self.publish_locked(&HashMap::new(), mutations, &guard)
    }

    /// Publish a transaction's buffers: validate row deltas, apply
    /// metadata creates, merge rows, backfill new indexes from the merged
    /// state, apply drops, and swap in one new catalog version.
    ///
    /// All-or-nothing with respect to validation: nothing is mutated until
    /// both the metadata staging and every row delta have been checked.
    pub fn apply_commit(
        &self,
        rows: &HashMap<String, TableOverlay>,
        metadata: &[MetadataMutation],
    ) -> Result<(), StorageError> {
        let guard = self.ddl_lock.lock();
        self.publish_locked(rows, metadata, &guard)
    }

    fn publish_locked(
        &self,
        rows: &HashMap<String, TableOverlay>,
        metadata: &[MetadataMutation],
        _guard: &MutexGuard<'_, ()>,
    ) -> Result<(), StorageError> {
        let snapshot = self.snapshot();

        // Stage metadata first; this validates every mutation in order.
        let mut staged = if metadata.is_empty() {
            None
        } else {
            Some(snapshot.with_mutations(metadata)?)
        };

        let created_tables: HashSet<String> = metadata
            .iter()
            .filter_map(|m| match m {
                MetadataMutation::CreateTable(def) => Some(def.name.to_lowercase()),
                _ => None,
            })
            .collect();

        // Validate all row deltas against committed state before touching it.
        for (table, overlay) in rows {
            let key = table.to_lowercase();
            let is_new = created_tables.contains(&key);
            if !is_new && snapshot.table(table).is_none() {
                return Err(StorageError::TableNotFound(table.clone()));
            }
            let store = self.tables.get(&key).map(|e| Arc::clone(e.value()));
            for (row_key, delta) in overlay.iter() {
                let exists = match (&store, is_new) {
                    (_, true) => false,
                    (Some(s), false) => s.contains_key(row_key),
                    (None, false) => false,
                };
                match delta {
                    RowDelta::Insert(_) if exists => {
                        return Err(StorageError::DuplicateKey {
                            table: table.clone(),
                            key_hex: hex_encode(row_key),
                        });
                    }
                    RowDelta::Update(_) | RowDelta::Delete if !exists => {
                        return Err(StorageError::KeyNotFound);
                    }
                    _ => {}
                }
            }
        }

        // Create table stores so row merges into in-transaction tables land.
        if let Some(staged) = &staged {
            for mutation in metadata {
                if let MetadataMutation::CreateTable(def) = mutation {
                    let table_def = staged
                        .table(&def.name)
                        .ok_or_else(|| StorageError::TableNotFound(def.name.clone()))?;
                    self.tables.insert(
                        def.name.to_lowercase(),
                        Arc::new(TableStore::new(Arc::clone(table_def))),
                    );
                }
            }
        }

        // Merge row deltas, maintaining already-registered indexes.
        for (table, overlay) in rows {
            let store = self.table(table)?;
            let idxs = self.registered_indexes_on(table);
            for (row_key, delta) in overlay.iter() {
                match delta {
                    RowDelta::Insert(v) => {
                        let value = Arc::new(v.clone());
                        store.insert(row_key.clone(), Arc::clone(&value))?;
                        for idx in &idxs {
                            idx.on_insert(row_key, &value)?;
                        }
                    }
                    RowDelta::Update(v) => {
                        let value = Arc::new(v.clone());
                        let old = store.replace(row_key, Arc::clone(&value))?;
                        for idx in &idxs {
                            idx.on_update(row_key, &old, &value)?;
                        }
                    }
                    RowDelta::Delete => {
                        let old = store.remove(row_key).ok_or(StorageError::KeyNotFound)?;
                        for idx in &idxs {
                            idx.on_delete(row_key, &old)?;
                        }
                    }
                }
            }
        }

        // Backfill new indexes from the merged committed rows, then mark
        // them Active in the staged snapshot.
        if let Some(staged) = &mut staged {
            for mutation in metadata {
                match mutation {
                    MetadataMutation::CreateIndex(def) => {
                        let table_def = staged
                            .table(&def.table)
                            .ok_or_else(|| StorageError::TableNotFound(def.table.clone()))?;
                        let index = Arc::new(HashIndex::new(Arc::new(def.clone()), table_def)?);
                        // Register before taking the row snapshot so any
                        // autocommit write landing mid-backfill goes through
                        // the hooks; rebuild absorbs the duplicates.
                        self.indexes
                            .insert(def.name.to_lowercase(), Arc::clone(&index));
                        let store = self.table(&def.table)?;
                        if let Err(err) = index.rebuild(&store.row_snapshot()) {
                            self.indexes.remove(&def.name.to_lowercase());
                            return Err(err);
                        }
                        staged.mark_index_active(&def.name);
                        tracing::debug!(
                            tablespace = %self.name,
                            index = %def.name,
                            table = %def.table,
                            "index backfill complete"
                        );
                    }
                    MetadataMutation::DropIndex(name) => {
                        self.indexes.remove(&name.to_lowercase());
                    }
                    MetadataMutation::DropTable(name) => {
                        self.tables.remove(&name.to_lowercase());
                        self.indexes
                            .retain(|_, idx| !idx.def().table.eq_ignore_ascii_case(name));
                    }
                    MetadataMutation::CreateTable(_) => {}
                }
            }
        }

        if let Some(staged) = staged {
            let version = self.catalog.install(staged);
            tracing::debug!(
                tablespace = %self.name,
                version = %version,
                "catalog snapshot published"
            );
        }
        Ok(())
    }
}
