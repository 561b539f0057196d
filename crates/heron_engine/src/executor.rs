//! Scan execution: turn a translated query plus a transaction's pending
//! view into a cursor over effective rows.
//!
//! The access path only narrows the candidate key set; every candidate is
//! resolved through overlay-wins semantics and re-checked against the
//! predicate, so index hints may safely over-approximate.

use std::collections::BTreeSet;
use std::sync::Arc;

use heron_common::datum::{decode_row, Record};
use heron_common::error::CoreResult;
use heron_common::schema::TableDef;
use heron_common::types::RowKey;
use heron_planner::{IndexOperation, Predicate, TranslatedQuery};
use heron_storage::{TableOverlay, TableStore, TablespaceStorage};
use heron_txn::{ScanContext, TxnStatusFlag};

pub struct ScanExecutor;

impl ScanExecutor {
    /// Materialize the candidate key set for the chosen access path and
    /// wrap it in a scanner. Keys come out in encoded-key order, which for
    /// the order-preserving codec is primary key order.
    pub fn execute(
        storage: &Arc<TablespaceStorage>,
        table_def: Arc<TableDef>,
        query: TranslatedQuery,
        ctx: ScanContext,
    ) -> CoreResult<DataScanner> {
        let stmt = query.main_statement;
        // Tables created inside the open transaction have no committed
        // store yet; their rows live entirely in the overlay.
        let store = storage.try_table(&stmt.table);

        let mut candidates: BTreeSet<RowKey> = BTreeSet::new();
        match stmt.index_op {
            IndexOperation::PrimaryKeySeek { key } => {
                candidates.insert(key);
            }
            IndexOperation::SecondaryIndexSeek { index, value } => {
                let idx = storage.index(&index)?;
                candidates.extend(idx.lookup_with_overlay(&value, ctx.index_overlay.as_ref()));
            }
            IndexOperation::FullScan => {
                if let Some(store) = &store {
                    candidates.extend(store.key_snapshot());
                }
                if let Some(overlay) = &ctx.overlay {
                    candidates.extend(overlay.keys().cloned());
                }
            }
        }

        tracing::debug!(
            table = %stmt.table,
            candidates = candidates.len(),
            "scan cursor opened"
        );
        Ok(DataScanner {
            table_def,
            store,
            overlay: ctx.overlay,
            predicate: stmt.predicate,
            status: ctx.status,
            keys: candidates.into_iter().collect::<Vec<_>>().into_iter(),
            closed: false,
        })
    }
}

/// Cursor over the effective rows of one scan. Rows are resolved lazily,
/// so a row deleted (or a transaction rolled back) between `next` calls is
/// never served.
pub struct DataScanner {
    table_def: Arc<TableDef>,
    store: Option<Arc<TableStore>>,
    overlay: Option<TableOverlay>,
    predicate: Option<Predicate>,
    status: Option<TxnStatusFlag>,
    keys: std::vec::IntoIter<RowKey>,
    closed: bool,
}

impl DataScanner {
    pub fn table_def(&self) -> &Arc<TableDef> {
        &self.table_def
    }

    /// Stop serving rows and release the snapshot references eagerly.
    /// Idempotent; also run on drop.
    pub fn close(&mut self) {
        self.closed = true;
        self.keys = Vec::new().into_iter();
        self.store = None;
        self.overlay = None;
    }

    /// Drain the remaining rows.
    pub fn consume(&mut self) -> Vec<Record> {
        let mut out = Vec::new();
        for record in self.by_ref() {
            out.push(record);
        }
        out
    }

    fn resolve(&self, key: &[u8]) -> Option<Arc<Vec<u8>>> {
        match &self.store {
            Some(store) => store.effective_get(key, self.overlay.as_ref()),
            None => match self.overlay.as_ref()?.effective(key) {
                Some(Some(bytes)) => Some(Arc::new(bytes.to_vec())),
                _ => None,
            },
        }
    }
}

impl Iterator for DataScanner {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        loop {
            if self.closed {
                return None;
            }
            if let Some(status) = &self.status {
                if !status.is_active() {
                    tracing::debug!(
                        table = %self.table_def.name,
                        "owning transaction finished, terminating scan"
                    );
                    self.closed = true;
                    return None;
                }
            }
            let key = self.keys.next()?;
            let Some(value) = self.resolve(&key) else {
                continue;
            };
            if let Some(predicate) = &self.predicate {
                let Ok(values) = decode_row(&value) else {
                    continue;
                };
                if !predicate.eval(&self.table_def, &values) {
                    continue;
                }
            }
            return Some(Record { key, value });
        }
    }
}

impl Drop for DataScanner {
    fn drop(&mut self) {
        self.close();
    }
}
