//! Versioned metadata catalog. Readers hold immutable `CatalogSnapshot`s;
//! a new snapshot is built off to the side and swapped in atomically at
//! commit, so no reader ever observes in-flight metadata.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use heron_common::error::StorageError;
use heron_common::schema::{IndexDef, TableDef};
use heron_common::types::{CatalogVersion, IndexState};

/// An index plus its lifecycle state as published in a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMeta {
    pub def: IndexDef,
    pub state: IndexState,
}

/// A metadata change buffered by a transaction (or applied directly in
/// autocommit). Applied in order at the commit boundary.
#[derive(Debug, Clone)]
pub enum MetadataMutation {
    CreateTable(TableDef),
    DropTable(String),
    CreateIndex(IndexDef),
    DropIndex(String),
}

/// Immutable view of a tablespace's metadata at one version.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    version: CatalogVersion,
    tables: HashMap<String, Arc<TableDef>>,
    /// Declaration order matters: access-path ties break on the earliest
    /// created index.
    indexes: Vec<Arc<IndexMeta>>,
}

impl CatalogSnapshot {
    fn empty() -> Self {
        Self {
            version: CatalogVersion(0),
            tables: HashMap::new(),
            indexes: Vec::new(),
        }
    }

    pub fn version(&self) -> CatalogVersion {
        self.version
    }

    pub fn table(&self, name: &str) -> Option<&Arc<TableDef>> {
        self.tables.get(&name.to_lowercase())
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.values().map(|t| t.name.clone()).collect()
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn index(&self, name: &str) -> Option<&Arc<IndexMeta>> {
        let lower = name.to_lowercase();
        self.indexes
            .iter()
            .find(|m| m.def.name.to_lowercase() == lower)
    }

    /// All indexes on a table, in declaration order.
    pub fn indexes_on_table(&self, table: &str) -> Vec<&Arc<IndexMeta>> {
        self.indexes
            .iter()
            .filter(|m| m.def.table.eq_ignore_ascii_case(table))
            .collect()
    }

    /// Indexes on a table that are eligible for planning.
    pub fn active_indexes_on_table(&self, table: &str) -> Vec<&Arc<IndexMeta>> {
        self.indexes_on_table(table)
            .into_iter()
            .filter(|m| m.state == IndexState::Active)
            .collect()
    }

    /// Apply mutations to a copy of this snapshot, validating each against
    /// the state accumulated so far. New indexes enter as `Building`; the
    /// commit path flips them to `Active` once backfill completes. The
    /// version is left untouched; `MetadataCatalog::install` bumps it.
    pub fn with_mutations(
        &self,
        mutations: &[MetadataMutation],
    ) -> Result<CatalogSnapshot, StorageError> {
        let mut next = self.clone();
        for mutation in mutations {
            match mutation {
                MetadataMutation::CreateTable(def) => {
                    let key = def.name.to_lowercase();
                    if next.tables.contains_key(&key) {
                        return Err(StorageError::TableAlreadyExists(def.name.clone()));
                    }
                    next.tables.insert(key, Arc::new(def.clone()));
                }
                MetadataMutation::DropTable(name) => {
                    if next.tables.remove(&name.to_lowercase()).is_none() {
                        return Err(StorageError::TableNotFound(name.clone()));
                    }
                    next.indexes
                        .retain(|m| !m.def.table.eq_ignore_ascii_case(name));
                }
                MetadataMutation::CreateIndex(def) => {
                    if next.index(&def.name).is_some() {
                        return Err(StorageError::IndexAlreadyExists(def.name.clone()));
                    }
                    let table = next
                        .table(&def.table)
                        .ok_or_else(|| StorageError::TableNotFound(def.table.clone()))?;
                    for col in &def.columns {
                        if table.find_column(col).is_none() {
                            return Err(StorageError::InvalidSchema(format!(
                                "index {} references unknown column {col}",
                                def.name
                            )));
                        }
                    }
                    next.indexes.push(Arc::new(IndexMeta {
                        def: def.clone(),
                        state: IndexState::Building,
                    }));
                }
                MetadataMutation::DropIndex(name) => {
                    let lower = name.to_lowercase();
                    let before = next.indexes.len();
                    next.indexes.retain(|m| m.def.name.to_lowercase() != lower);
                    if next.indexes.len() == before {
                        return Err(StorageError::IndexNotFound(name.clone()));
                    }
                }
            }
        }
        Ok(next)
    }

    /// Flip a staged index to `Active` after its backfill completed.
    pub fn mark_index_active(&mut self, name: &str) {
        let lower = name.to_lowercase();
        for meta in &mut self.indexes {
            if meta.def.name.to_lowercase() == lower {
                *meta = Arc::new(IndexMeta {
                    def: meta.def.clone(),
                    state: IndexState::Active,
                });
            }
        }
    }
}

/// Holder of the current snapshot for one tablespace.
pub struct MetadataCatalog {
    current: RwLock<Arc<CatalogSnapshot>>,
}

impl Default for MetadataCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataCatalog {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(CatalogSnapshot::empty())),
        }
    }

    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Publish a new snapshot, bumping the version. Callers serialize on
    /// the tablespace DDL lock; the swap itself is the only write here.
    pub fn install(&self, mut next: CatalogSnapshot) -> CatalogVersion {
        let mut current = self.current.write();
        next.version = CatalogVersion(current.version().0 + 1);
        let version = next.version;
        *current = Arc::new(next);
        version
    }
}
