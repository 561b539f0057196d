//! Transaction manager for one tablespace.
//!
//! DML and DDL inside a transaction never touch committed state: rows go
//! into per-table overlays, metadata into an ordered mutation list, and
//! pending index changes into per-index overlays so the transaction's own
//! index-assisted reads stay consistent. Commit hands everything to the
//! storage layer, which validates and publishes atomically. Autocommit
//! statements take the same write locks under a synthetic owner id and
//! apply directly to committed state.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;

use heron_common::datum::decode_row;
use heron_common::error::{CoreError, CoreResult, StorageError, TxnError};
use heron_common::schema::{IndexDef, TableDef};
use heron_common::types::{hex_encode, RowKey, TxnId, TxnState};
use heron_planner::Predicate;
use heron_storage::{IndexOverlay, MetadataMutation, TableOverlay, TablespaceStorage};

use crate::locks::KeyLockManager;

/// Owner ids for autocommit statements live above this base so they can
/// never collide with ids handed out by `begin`.
const AUTOCOMMIT_ID_BASE: u64 = 1 << 62;

/// Everything a transaction has buffered but not yet published.
#[derive(Default)]
struct TxnBuffers {
    /// Pending row deltas, keyed by lowercase table name.
    rows: HashMap<String, TableOverlay>,
    /// Pending index deltas, keyed by lowercase index name. Maintained
    /// for every index Active in the committed catalog, including ones
    /// whose drop is buffered: the planner keeps selecting those until
    /// the drop commits, so the transaction's own seeks must stay fed.
    index_overlays: HashMap<String, IndexOverlay>,
    /// Buffered schema changes in statement order.
    metadata: Vec<MetadataMutation>,
    /// Tables created by this transaction, keyed by lowercase name.
    created_tables: HashMap<String, Arc<TableDef>>,
    dropped_tables: HashSet<String>,
    dropped_indexes: HashSet<String>,
}

struct Txn {
    state: Arc<AtomicU8>,
    buffers: Mutex<TxnBuffers>,
}

impl Txn {
    fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(TxnState::Active.as_u8())),
            buffers: Mutex::new(TxnBuffers::default()),
        }
    }
}

/// Shared view of a transaction's lifecycle state. Scanners poll it so a
/// rollback mid-scan terminates the cursor instead of serving stale
/// overlay rows.
#[derive(Clone)]
pub struct TxnStatusFlag(Arc<AtomicU8>);

impl TxnStatusFlag {
    pub fn state(&self) -> TxnState {
        TxnState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn is_active(&self) -> bool {
        self.state() == TxnState::Active
    }
}

/// Snapshot of a transaction's pending view of one table, handed to the
/// scan executor. Autocommit scans carry an empty context.
pub struct ScanContext {
    pub overlay: Option<TableOverlay>,
    pub index_overlay: Option<IndexOverlay>,
    pub status: Option<TxnStatusFlag>,
}

impl ScanContext {
    pub fn autocommit() -> Self {
        Self {
            overlay: None,
            index_overlay: None,
            status: None,
        }
    }
}

#[derive(Default)]
struct TxnStatsCollector {
    begun: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
    conflicts: AtomicU64,
    constraint_violations: AtomicU64,
    lock_timeouts: AtomicU64,
}

/// Point-in-time transaction counters for one tablespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxnStatsSnapshot {
    pub begun: u64,
    pub committed: u64,
    pub rolled_back: u64,
    pub conflicts: u64,
    pub constraint_violations: u64,
    pub lock_timeouts: u64,
    pub active: u64,
}

pub struct TxnManager {
    storage: Arc<TablespaceStorage>,
    locks: KeyLockManager,
    active: DashMap<TxnId, Arc<Txn>>,
    txn_counter: AtomicU64,
    autocommit_counter: AtomicU64,
    stats: TxnStatsCollector,
    lock_timeout: Duration,
}

impl TxnManager {
    pub fn new(storage: Arc<TablespaceStorage>, lock_timeout: Duration) -> Self {
        Self {
            storage,
            locks: KeyLockManager::new(),
            active: DashMap::new(),
            txn_counter: AtomicU64::new(0),
            autocommit_counter: AtomicU64::new(0),
            stats: TxnStatsCollector::default(),
            lock_timeout,
        }
    }

    pub fn storage(&self) -> &Arc<TablespaceStorage> {
        &self.storage
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    pub fn begin(&self) -> TxnId {
        let id = TxnId(self.txn_counter.fetch_add(1, Ordering::SeqCst) + 1);
        self.active.insert(id, Arc::new(Txn::new()));
        self.stats.begun.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(tablespace = %self.storage.name(), txn_id = %id, "transaction begun");
        id
    }

    /// Publish the transaction's buffers. A validation race (a concurrent
    /// commit took the key or the name first) surfaces as `Conflict` and
    /// rolls the transaction back; retrying means starting over.
    pub fn commit(&self, id: TxnId) -> CoreResult<()> {
        let (_, txn) = self.active.remove(&id).ok_or(TxnError::NotFound(id))?;
        let buffers = std::mem::take(&mut *txn.buffers.lock());

        match self.storage.apply_commit(&buffers.rows, &buffers.metadata) {
            Ok(()) => {
                txn.state
                    .store(TxnState::Committed.as_u8(), Ordering::Release);
                self.locks.release_all(id);
                self.stats.committed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    tablespace = %self.storage.name(),
                    txn_id = %id,
                    tables = buffers.rows.len(),
                    metadata = buffers.metadata.len(),
                    "transaction committed"
                );
                Ok(())
            }
            Err(err) => {
                txn.state
                    .store(TxnState::RolledBack.as_u8(), Ordering::Release);
                self.locks.release_all(id);
                self.stats.rolled_back.fetch_add(1, Ordering::Relaxed);
                if is_commit_conflict(&err) {
                    self.stats.conflicts.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        tablespace = %self.storage.name(),
                        txn_id = %id,
                        error = %err,
                        "commit conflict, transaction rolled back"
                    );
                    Err(TxnError::Conflict(id, err.to_string()).into())
                } else {
                    Err(err.into())
                }
            }
        }
    }

    /// Discard the transaction's buffers and release its locks.
    pub fn rollback(&self, id: TxnId) -> CoreResult<()> {
        let (_, txn) = self.active.remove(&id).ok_or(TxnError::NotFound(id))?;
        txn.state
            .store(TxnState::RolledBack.as_u8(), Ordering::Release);
        self.locks.release_all(id);
        self.stats.rolled_back.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(tablespace = %self.storage.name(), txn_id = %id, "transaction rolled back");
        Ok(())
    }

    pub fn txn_state(&self, id: TxnId) -> Option<TxnState> {
        self.active
            .get(&id)
            .map(|t| TxnState::from_u8(t.state.load(Ordering::Acquire)))
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn stats(&self) -> TxnStatsSnapshot {
        TxnStatsSnapshot {
            begun: self.stats.begun.load(Ordering::Relaxed),
            committed: self.stats.committed.load(Ordering::Relaxed),
            rolled_back: self.stats.rolled_back.load(Ordering::Relaxed),
            conflicts: self.stats.conflicts.load(Ordering::Relaxed),
            constraint_violations: self.stats.constraint_violations.load(Ordering::Relaxed),
            lock_timeouts: self.stats.lock_timeouts.load(Ordering::Relaxed),
            active: self.active.len() as u64,
        }
    }

    // ── Resolution ───────────────────────────────────────────────────────

    /// Resolve a table definition: the committed catalog first, then the
    /// transaction's pending creates. A table the transaction dropped is
    /// still resolvable for reads until the drop commits.
    pub fn table_def(&self, txn: Option<TxnId>, table: &str) -> CoreResult<Arc<TableDef>> {
        if let Some(def) = self.storage.snapshot().table(table) {
            return Ok(Arc::clone(def));
        }
        if let Some(id) = txn {
            let t = self.get_active(id)?;
            let buffers = t.buffers.lock();
            if let Some(def) = buffers.created_tables.get(&table.to_lowercase()) {
                return Ok(Arc::clone(def));
            }
        }
        Err(StorageError::TableNotFound(table.to_string()).into())
    }

    /// Clone the transaction's pending view of `table` (and of one index,
    /// when the access path uses one) for the scan executor.
    pub fn scan_context(
        &self,
        txn: Option<TxnId>,
        table: &str,
        index: Option<&str>,
    ) -> CoreResult<ScanContext> {
        let Some(id) = txn else {
            return Ok(ScanContext::autocommit());
        };
        let t = self.get_active(id)?;
        let buffers = t.buffers.lock();
        Ok(ScanContext {
            overlay: buffers.rows.get(&table.to_lowercase()).cloned(),
            index_overlay: index.and_then(|n| buffers.index_overlays.get(&n.to_lowercase()).cloned()),
            status: Some(TxnStatusFlag(Arc::clone(&t.state))),
        })
    }

    // ── DML ──────────────────────────────────────────────────────────────

    /// Insert one row. Returns the update count (always 1 on success).
    pub fn insert(
        &self,
        txn: Option<TxnId>,
        table: &str,
        key: RowKey,
        value: Vec<u8>,
    ) -> CoreResult<u64> {
        let def = self.table_def(txn, table)?;
        validate_payload(&def, &value)?;

        let Some(id) = txn else {
            return self.autocommit_insert(table, key, value);
        };
        let t = self.get_active(id)?;
        self.check_not_dropped(&t, table)?;
        self.acquire(id, table, &key)?;

        let mut buffers = t.buffers.lock();
        let duplicate = match buffers
            .rows
            .get(&table.to_lowercase())
            .and_then(|o| o.effective(&key))
        {
            Some(Some(_)) => true,
            Some(None) => false,
            None => self
                .storage
                .try_table(table)
                .is_some_and(|s| s.contains_key(&key)),
        };
        if duplicate {
            self.stats
                .constraint_violations
                .fetch_add(1, Ordering::Relaxed);
            return Err(TxnError::ConstraintViolation(
                id,
                format!(
                    "duplicate primary key in table {table}: {}",
                    hex_encode(&key)
                ),
            )
            .into());
        }

        buffers
            .rows
            .entry(table.to_lowercase())
            .or_default()
            .buffer_insert(key.clone(), value.clone());
        self.overlay_index_add(&mut buffers, table, &key, &value)?;
        Ok(1)
    }

    /// Replace one row if it effectively exists. Returns 0 or 1.
    pub fn update(
        &self,
        txn: Option<TxnId>,
        table: &str,
        key: &[u8],
        value: Vec<u8>,
    ) -> CoreResult<u64> {
        let def = self.table_def(txn, table)?;
        validate_payload(&def, &value)?;

        let Some(id) = txn else {
            return self.autocommit_update(table, key, value);
        };
        let t = self.get_active(id)?;
        self.check_not_dropped(&t, table)?;
        self.acquire(id, table, key)?;

        let mut buffers = t.buffers.lock();
        let Some(old) = self.effective_value(&buffers, table, key) else {
            return Ok(0);
        };
        buffers
            .rows
            .entry(table.to_lowercase())
            .or_default()
            .buffer_update(key.to_vec(), value.clone());
        self.overlay_index_remove(&mut buffers, table, &key.to_vec(), &old)?;
        self.overlay_index_add(&mut buffers, table, &key.to_vec(), &value)?;
        Ok(1)
    }

    /// Delete one row if it effectively exists and matches the optional
    /// predicate. Returns 0 or 1.
    pub fn delete(
        &self,
        txn: Option<TxnId>,
        table: &str,
        key: &[u8],
        predicate: Option<&Predicate>,
    ) -> CoreResult<u64> {
        let def = self.table_def(txn, table)?;
        if let Some(p) = predicate {
            p.validate(&def)?;
        }

        let Some(id) = txn else {
            return self.autocommit_delete(&def, table, key, predicate);
        };
        let t = self.get_active(id)?;
        self.check_not_dropped(&t, table)?;
        self.acquire(id, table, key)?;

        let mut buffers = t.buffers.lock();
        let Some(old) = self.effective_value(&buffers, table, key) else {
            return Ok(0);
        };
        if !row_matches(&def, &old, predicate)? {
            return Ok(0);
        }
        buffers
            .rows
            .entry(table.to_lowercase())
            .or_default()
            .buffer_delete(key);
        self.overlay_index_remove(&mut buffers, table, &key.to_vec(), &old)?;
        Ok(1)
    }

    // ── DDL ──────────────────────────────────────────────────────────────

    pub fn create_table(&self, txn: Option<TxnId>, def: TableDef) -> CoreResult<()> {
        if !def.tablespace.eq_ignore_ascii_case(self.storage.name()) {
            return Err(StorageError::InvalidSchema(format!(
                "table {} declared for tablespace {}, not {}",
                def.name,
                def.tablespace,
                self.storage.name()
            ))
            .into());
        }
        let Some(id) = txn else {
            self.storage
                .apply_metadata(&[MetadataMutation::CreateTable(def)])?;
            return Ok(());
        };
        let t = self.get_active(id)?;
        let mut buffers = t.buffers.lock();
        let lower = def.name.to_lowercase();
        let committed = self.storage.snapshot().table(&def.name).is_some();
        if (committed && !buffers.dropped_tables.contains(&lower))
            || buffers.created_tables.contains_key(&lower)
        {
            return Err(StorageError::TableAlreadyExists(def.name.clone()).into());
        }
        buffers.created_tables.insert(lower, Arc::new(def.clone()));
        buffers.metadata.push(MetadataMutation::CreateTable(def));
        Ok(())
    }

    pub fn drop_table(&self, txn: Option<TxnId>, table: &str) -> CoreResult<()> {
        let Some(id) = txn else {
            self.storage
                .apply_metadata(&[MetadataMutation::DropTable(table.to_string())])?;
            return Ok(());
        };
        let t = self.get_active(id)?;
        let mut buffers = t.buffers.lock();
        let lower = table.to_lowercase();

        if buffers.created_tables.remove(&lower).is_some() {
            // Never published: unwind the buffered create and everything
            // that referenced the table.
            buffers.rows.remove(&lower);
            buffers.metadata.retain(|m| match m {
                MetadataMutation::CreateTable(def) => !def.name.eq_ignore_ascii_case(table),
                MetadataMutation::CreateIndex(def) => !def.table.eq_ignore_ascii_case(table),
                _ => true,
            });
            return Ok(());
        }

        let committed = self.storage.snapshot().table(table).is_some();
        if !committed || buffers.dropped_tables.contains(&lower) {
            return Err(StorageError::TableNotFound(table.to_string()).into());
        }
        buffers.rows.remove(&lower);
        buffers.dropped_tables.insert(lower);
        buffers
            .metadata
            .push(MetadataMutation::DropTable(table.to_string()));
        Ok(())
    }

    /// Create a secondary index. Inside a transaction the index is only
    /// buffered; it is backfilled and becomes visible to the planner when
    /// the transaction commits.
    pub fn create_index(&self, txn: Option<TxnId>, def: IndexDef) -> CoreResult<()> {
        let Some(id) = txn else {
            self.storage
                .apply_metadata(&[MetadataMutation::CreateIndex(def)])?;
            return Ok(());
        };
        let t = self.get_active(id)?;
        let mut buffers = t.buffers.lock();

        let table_visible = (self.storage.snapshot().table(&def.table).is_some()
            && !buffers.dropped_tables.contains(&def.table.to_lowercase()))
            || buffers
                .created_tables
                .contains_key(&def.table.to_lowercase());
        if !table_visible {
            return Err(StorageError::TableNotFound(def.table.clone()).into());
        }

        let buffered = buffers.metadata.iter().any(|m| {
            matches!(m, MetadataMutation::CreateIndex(d) if d.name.eq_ignore_ascii_case(&def.name))
        });
        if buffered || self.storage.snapshot().index(&def.name).is_some() {
            return Err(StorageError::IndexAlreadyExists(def.name.clone()).into());
        }
        buffers.metadata.push(MetadataMutation::CreateIndex(def));
        Ok(())
    }

    pub fn drop_index(&self, txn: Option<TxnId>, index: &str) -> CoreResult<()> {
        let Some(id) = txn else {
            self.storage
                .apply_metadata(&[MetadataMutation::DropIndex(index.to_string())])?;
            return Ok(());
        };
        let t = self.get_active(id)?;
        let mut buffers = t.buffers.lock();
        let lower = index.to_lowercase();

        let buffered = buffers.metadata.iter().any(|m| {
            matches!(m, MetadataMutation::CreateIndex(d) if d.name.eq_ignore_ascii_case(index))
        });
        if buffered {
            buffers.metadata.retain(|m| {
                !matches!(m, MetadataMutation::CreateIndex(d) if d.name.eq_ignore_ascii_case(index))
            });
            return Ok(());
        }

        if self.storage.snapshot().index(index).is_none() || buffers.dropped_indexes.contains(&lower)
        {
            return Err(StorageError::IndexNotFound(index.to_string()).into());
        }
        buffers.dropped_indexes.insert(lower);
        buffers
            .metadata
            .push(MetadataMutation::DropIndex(index.to_string()));
        Ok(())
    }

    // ── Internals ────────────────────────────────────────────────────────

    /// Finished transactions are removed from the map before their state
    /// flips, so any resolvable entry is active.
    fn get_active(&self, id: TxnId) -> Result<Arc<Txn>, TxnError> {
        self.active
            .get(&id)
            .map(|e| Arc::clone(e.value()))
            .ok_or(TxnError::NotFound(id))
    }

    fn check_not_dropped(&self, txn: &Txn, table: &str) -> CoreResult<()> {
        if txn
            .buffers
            .lock()
            .dropped_tables
            .contains(&table.to_lowercase())
        {
            return Err(StorageError::TableNotFound(table.to_string()).into());
        }
        Ok(())
    }

    fn acquire(&self, id: TxnId, table: &str, key: &[u8]) -> CoreResult<()> {
        self.locks
            .acquire(id, table, key, self.lock_timeout)
            .map_err(|err| {
                self.stats.lock_timeouts.fetch_add(1, Ordering::Relaxed);
                CoreError::from(err)
            })
    }

    /// The row payload this transaction currently sees for `key`, or None.
    fn effective_value(&self, buffers: &TxnBuffers, table: &str, key: &[u8]) -> Option<Vec<u8>> {
        match buffers
            .rows
            .get(&table.to_lowercase())
            .and_then(|o| o.effective(key))
        {
            Some(Some(bytes)) => Some(bytes.to_vec()),
            Some(None) => None,
            None => self
                .storage
                .try_table(table)
                .and_then(|s| s.get(key))
                .map(|v| v.as_ref().clone()),
        }
    }

    /// Record pending index additions for every committed Active index on
    /// `table`. Indexes with a buffered drop are still maintained; the
    /// drop takes effect only at commit.
    fn overlay_index_add(
        &self,
        buffers: &mut TxnBuffers,
        table: &str,
        key: &RowKey,
        value: &[u8],
    ) -> CoreResult<()> {
        let snapshot = self.storage.snapshot();
        for meta in snapshot.active_indexes_on_table(table) {
            let lower = meta.def.name.to_lowercase();
            let idx = self.storage.index(&meta.def.name)?;
            let indexed = idx.indexed_value(value)?;
            buffers
                .index_overlays
                .entry(lower)
                .or_default()
                .record_add(indexed, key.clone());
        }
        Ok(())
    }

    fn overlay_index_remove(
        &self,
        buffers: &mut TxnBuffers,
        table: &str,
        key: &RowKey,
        value: &[u8],
    ) -> CoreResult<()> {
        let snapshot = self.storage.snapshot();
        for meta in snapshot.active_indexes_on_table(table) {
            let lower = meta.def.name.to_lowercase();
            let idx = self.storage.index(&meta.def.name)?;
            let indexed = idx.indexed_value(value)?;
            buffers
                .index_overlays
                .entry(lower)
                .or_default()
                .record_remove(indexed, key.clone());
        }
        Ok(())
    }

    // ── Autocommit DML ───────────────────────────────────────────────────

    fn autocommit_id(&self) -> TxnId {
        TxnId(AUTOCOMMIT_ID_BASE + self.autocommit_counter.fetch_add(1, Ordering::SeqCst))
    }

    fn autocommit_insert(&self, table: &str, key: RowKey, value: Vec<u8>) -> CoreResult<u64> {
        let id = self.autocommit_id();
        self.acquire(id, table, &key)?;
        let result = self.storage.insert_committed(table, key, value);
        self.locks.release_all(id);
        result?;
        Ok(1)
    }

    fn autocommit_update(&self, table: &str, key: &[u8], value: Vec<u8>) -> CoreResult<u64> {
        let id = self.autocommit_id();
        self.acquire(id, table, key)?;
        let result = self.storage.update_committed(table, key, value);
        self.locks.release_all(id);
        Ok(u64::from(result?))
    }

    fn autocommit_delete(
        &self,
        def: &TableDef,
        table: &str,
        key: &[u8],
        predicate: Option<&Predicate>,
    ) -> CoreResult<u64> {
        let id = self.autocommit_id();
        self.acquire(id, table, key)?;
        let result: CoreResult<u64> = (|| {
            if predicate.is_some() {
                let Some(row) = self.storage.try_table(table).and_then(|s| s.get(key)) else {
                    return Ok(0);
                };
                if !row_matches(def, &row, predicate)? {
                    return Ok(0);
                }
            }
            Ok(u64::from(self.storage.delete_committed(table, key)?))
        })();
        self.locks.release_all(id);
        result
    }
}

fn is_commit_conflict(err: &StorageError) -> bool {
    matches!(
        err,
        StorageError::DuplicateKey { .. }
            | StorageError::KeyNotFound
            | StorageError::TableNotFound(_)
            | StorageError::TableAlreadyExists(_)
            | StorageError::IndexNotFound(_)
            | StorageError::IndexAlreadyExists(_)
    )
}

/// Evaluate an optional predicate against an encoded row.
fn row_matches(def: &TableDef, row: &[u8], predicate: Option<&Predicate>) -> CoreResult<bool> {
    let Some(predicate) = predicate else {
        return Ok(true);
    };
    let values = decode_row(row)?;
    Ok(predicate.eval(def, &values))
}

/// Reject payloads whose decoded value count does not match the table.
fn validate_payload(def: &TableDef, value: &[u8]) -> CoreResult<()> {
    let values = decode_row(value)?;
    if values.len() != def.columns.len() {
        return Err(StorageError::InvalidSchema(format!(
            "row has {} values, table {} has {} columns",
            values.len(),
            def.name,
            def.columns.len()
        ))
        .into());
    }
    Ok(())
}
