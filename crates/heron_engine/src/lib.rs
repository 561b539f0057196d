//! In-memory table-store engine: tablespaces, transactional statement
//! execution, access-path-driven scans, and a bounded worker pool for
//! asynchronous statement submission.

pub mod executor;
pub mod statements;
pub mod tablespace;
pub mod worker;

pub use executor::{DataScanner, ScanExecutor};
pub use statements::{ExecutionResult, Statement};
pub use tablespace::Tablespace;
pub use worker::StatementPool;

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;

use heron_common::config::EngineConfig;
use heron_common::error::{CoreResult, EngineError, StorageError};
use heron_common::schema::TablespaceDef;
use heron_common::types::TxnId;
use heron_planner::{translate_scan, IndexOperation, Predicate, TranslatedQuery};

pub struct DbEngine {
    config: EngineConfig,
    tablespaces: DashMap<String, Arc<Tablespace>>,
    pool: StatementPool,
}

impl DbEngine {
    pub fn new(config: EngineConfig) -> Self {
        let pool = StatementPool::new(config.worker_threads, config.worker_queue_depth);
        Self {
            config,
            tablespaces: DashMap::new(),
            pool,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(EngineConfig::default())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pool(&self) -> &StatementPool {
        &self.pool
    }

    // ── Tablespace lifecycle ─────────────────────────────────────────────

    pub fn create_tablespace(&self, def: TablespaceDef) -> CoreResult<Arc<Tablespace>> {
        use dashmap::mapref::entry::Entry;
        let name = def.name.clone();
        match self.tablespaces.entry(name.to_lowercase()) {
            Entry::Occupied(_) => Err(EngineError::TablespaceAlreadyExists(name).into()),
            Entry::Vacant(e) => {
                let ts = Arc::new(Tablespace::new(def, &self.config));
                e.insert(Arc::clone(&ts));
                tracing::info!(tablespace = %name, ready = ts.is_ready(), "tablespace created");
                Ok(ts)
            }
        }
    }

    pub fn tablespace(&self, name: &str) -> CoreResult<Arc<Tablespace>> {
        self.tablespaces
            .get(&name.to_lowercase())
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| EngineError::TablespaceNotFound(name.to_string()).into())
    }

    /// Resolve a tablespace, polling until it is ready to serve statements
    /// or the configured wait runs out.
    pub fn wait_for_tablespace(&self, name: &str) -> CoreResult<Arc<Tablespace>> {
        let ts = self.tablespace(name)?;
        if ts.is_ready() {
            return Ok(ts);
        }
        let started = Instant::now();
        let deadline = started + self.config.tablespace_ready_timeout();
        loop {
            if ts.is_ready() {
                tracing::debug!(
                    tablespace = %name,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "tablespace became ready"
                );
                return Ok(ts);
            }
            if Instant::now() >= deadline {
                return Err(EngineError::TablespaceNotReady {
                    name: name.to_string(),
                    waited_ms: started.elapsed().as_millis() as u64,
                }
                .into());
            }
            std::thread::sleep(self.config.tablespace_ready_poll());
        }
    }

    // ── Transactions ─────────────────────────────────────────────────────

    pub fn begin(&self, tablespace: &str) -> CoreResult<TxnId> {
        Ok(self.wait_for_tablespace(tablespace)?.txns().begin())
    }

    pub fn commit(&self, tablespace: &str, txn: TxnId) -> CoreResult<()> {
        self.wait_for_tablespace(tablespace)?.txns().commit(txn)
    }

    pub fn rollback(&self, tablespace: &str, txn: TxnId) -> CoreResult<()> {
        self.wait_for_tablespace(tablespace)?.txns().rollback(txn)
    }

    // ── Statements ───────────────────────────────────────────────────────

    pub fn execute(&self, txn: Option<TxnId>, stmt: Statement) -> CoreResult<ExecutionResult> {
        match stmt {
            Statement::CreateTableSpace(def) => {
                if txn.is_some() {
                    return Err(StorageError::InvalidSchema(
                        "tablespace DDL cannot run inside a transaction".into(),
                    )
                    .into());
                }
                self.create_tablespace(def)?;
                Ok(ExecutionResult::TableSpaceCreated)
            }
            Statement::CreateTable(def) => {
                let ts = self.wait_for_tablespace(&def.tablespace)?;
                ts.txns().create_table(txn, def)?;
                Ok(ExecutionResult::Ddl)
            }
            Statement::DropTable { tablespace, table } => {
                let ts = self.wait_for_tablespace(&tablespace)?;
                ts.txns().drop_table(txn, &table)?;
                Ok(ExecutionResult::Ddl)
            }
            Statement::CreateIndex(def) => {
                let ts = self.wait_for_tablespace(&def.tablespace)?;
                ts.txns().create_index(txn, def)?;
                Ok(ExecutionResult::Ddl)
            }
            Statement::DropIndex { tablespace, index } => {
                let ts = self.wait_for_tablespace(&tablespace)?;
                ts.txns().drop_index(txn, &index)?;
                Ok(ExecutionResult::Ddl)
            }
            Statement::Insert {
                tablespace,
                table,
                key,
                value,
            } => {
                let ts = self.wait_for_tablespace(&tablespace)?;
                let count = ts.txns().insert(txn, &table, key, value)?;
                Ok(ExecutionResult::UpdateCount(count))
            }
            Statement::Update {
                tablespace,
                table,
                key,
                value,
            } => {
                let ts = self.wait_for_tablespace(&tablespace)?;
                let count = ts.txns().update(txn, &table, &key, value)?;
                Ok(ExecutionResult::UpdateCount(count))
            }
            Statement::Delete {
                tablespace,
                table,
                key,
                predicate,
            } => {
                let ts = self.wait_for_tablespace(&tablespace)?;
                let count = ts.txns().delete(txn, &table, &key, predicate.as_ref())?;
                Ok(ExecutionResult::UpdateCount(count))
            }
            Statement::DeleteWhere {
                tablespace,
                table,
                predicate,
            } => self.delete_where(txn, &tablespace, &table, predicate),
        }
    }

    /// Run a statement on the worker pool. The receiver yields the result
    /// once a worker picks the job up.
    pub fn execute_async(
        self: &Arc<Self>,
        txn: Option<TxnId>,
        stmt: Statement,
    ) -> CoreResult<mpsc::Receiver<CoreResult<ExecutionResult>>> {
        let (result_tx, result_rx) = mpsc::channel();
        let engine = Arc::clone(self);
        self.pool.submit(move || {
            let _ = result_tx.send(engine.execute(txn, stmt));
        })?;
        Ok(result_rx)
    }

    // ── Scans ────────────────────────────────────────────────────────────

    /// Plan a scan without executing it. Useful for inspecting the chosen
    /// access path.
    pub fn translate(
        &self,
        txn: Option<TxnId>,
        tablespace: &str,
        table: &str,
        predicate: Option<Predicate>,
    ) -> CoreResult<TranslatedQuery> {
        let ts = self.wait_for_tablespace(tablespace)?;
        let def = ts.txns().table_def(txn, table)?;
        Ok(translate_scan(&def, predicate, &ts.storage().snapshot())?)
    }

    /// Open a cursor over the effective rows of `table`, merging committed
    /// state with the transaction's pending changes.
    pub fn scan(
        &self,
        txn: Option<TxnId>,
        tablespace: &str,
        table: &str,
        predicate: Option<Predicate>,
    ) -> CoreResult<DataScanner> {
        let ts = self.wait_for_tablespace(tablespace)?;
        let def = ts.txns().table_def(txn, table)?;
        let query = translate_scan(&def, predicate, &ts.storage().snapshot())?;
        let index = match &query.main_statement.index_op {
            IndexOperation::SecondaryIndexSeek { index, .. } => Some(index.clone()),
            _ => None,
        };
        let ctx = ts.txns().scan_context(txn, table, index.as_deref())?;
        ScanExecutor::execute(ts.storage(), def, query, ctx)
    }

    fn delete_where(
        &self,
        txn: Option<TxnId>,
        tablespace: &str,
        table: &str,
        predicate: Option<Predicate>,
    ) -> CoreResult<ExecutionResult> {
        let keys: Vec<_> = self
            .scan(txn, tablespace, table, predicate)?
            .map(|record| record.key)
            .collect();
        let ts = self.wait_for_tablespace(tablespace)?;
        let mut count = 0;
        for key in keys {
            count += ts.txns().delete(txn, table, &key, None)?;
        }
        Ok(ExecutionResult::UpdateCount(count))
    }
}
