//! Exclusive per-key write locks. One owner per (table, key); a second
//! writer blocks on a condvar until the owner releases or the wait times
//! out. Locks are reentrant for their owner and are released in bulk when
//! the transaction finishes.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use heron_common::error::TxnError;
use heron_common::types::{hex_encode, RowKey, TxnId};

type LockKey = (String, RowKey);

#[derive(Default)]
struct LockTables {
    owners: HashMap<LockKey, TxnId>,
    held: HashMap<TxnId, HashSet<LockKey>>,
}

pub struct KeyLockManager {
    tables: Mutex<LockTables>,
    released: Condvar,
}

impl Default for KeyLockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyLockManager {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(LockTables::default()),
            released: Condvar::new(),
        }
    }

    /// Acquire the write lock on (table, key) for `txn_id`, waiting up to
    /// `timeout`. Re-acquiring a lock already held by `txn_id` succeeds
    /// immediately.
    pub fn acquire(
        &self,
        txn_id: TxnId,
        table: &str,
        key: &[u8],
        timeout: Duration,
    ) -> Result<(), TxnError> {
        let lock_key: LockKey = (table.to_lowercase(), key.to_vec());
        let started = Instant::now();
        let deadline = started + timeout;

        let mut tables = self.tables.lock();
        loop {
            match tables.owners.get(&lock_key) {
                None => {
                    tables.owners.insert(lock_key.clone(), txn_id);
                    tables.held.entry(txn_id).or_default().insert(lock_key);
                    return Ok(());
                }
                Some(owner) if *owner == txn_id => return Ok(()),
                Some(_) => {
                    if self.released.wait_until(&mut tables, deadline).timed_out() {
                        tracing::warn!(
                            txn_id = %txn_id,
                            table,
                            key = %hex_encode(key),
                            "write lock wait timed out"
                        );
                        return Err(TxnError::LockTimeout {
                            txn_id,
                            table: table.to_string(),
                            key_hex: hex_encode(key),
                            waited_ms: started.elapsed().as_millis() as u64,
                        });
                    }
                }
            }
        }
    }

    /// Release every lock held by `txn_id` and wake all waiters.
    pub fn release_all(&self, txn_id: TxnId) {
        let mut tables = self.tables.lock();
        if let Some(keys) = tables.held.remove(&txn_id) {
            for key in keys {
                tables.owners.remove(&key);
            }
            self.released.notify_all();
        }
    }

    pub fn held_count(&self, txn_id: TxnId) -> usize {
        self.tables
            .lock()
            .held
            .get(&txn_id)
            .map(|s| s.len())
            .unwrap_or(0)
    }
}
