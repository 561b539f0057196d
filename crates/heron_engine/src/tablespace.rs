//! One mounted tablespace: its committed storage, its transaction manager,
//! and its readiness flag. A tablespace serves statements only once its
//! replica assignment satisfies the declared expectations; until then
//! callers poll through `DbEngine::wait_for_tablespace`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use heron_common::config::EngineConfig;
use heron_common::schema::TablespaceDef;
use heron_storage::TablespaceStorage;
use heron_txn::TxnManager;

pub struct Tablespace {
    def: TablespaceDef,
    storage: Arc<TablespaceStorage>,
    txns: TxnManager,
    ready: AtomicBool,
}

impl Tablespace {
    pub(crate) fn new(def: TablespaceDef, config: &EngineConfig) -> Self {
        let storage = Arc::new(TablespaceStorage::new(&def.name));
        let txns = TxnManager::new(Arc::clone(&storage), config.lock_timeout());
        let ts = Self {
            def,
            storage,
            txns,
            ready: AtomicBool::new(false),
        };
        ts.try_activate();
        ts
    }

    pub fn def(&self) -> &TablespaceDef {
        &self.def
    }

    pub fn storage(&self) -> &Arc<TablespaceStorage> {
        &self.storage
    }

    pub fn txns(&self) -> &TxnManager {
        &self.txns
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Activate once the declared replica expectations are met and a
    /// leader is assigned.
    pub(crate) fn try_activate(&self) {
        if !self.def.leader.is_empty() && self.def.replicas.len() >= self.def.expected_replica_count
        {
            self.activate();
        }
    }

    /// Force readiness. Called when leadership is established out of band.
    pub fn activate(&self) {
        if !self.ready.swap(true, Ordering::AcqRel) {
            tracing::info!(tablespace = %self.def.name, leader = %self.def.leader, "tablespace ready");
        }
    }
}
