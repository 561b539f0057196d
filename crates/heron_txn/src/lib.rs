//! Transaction lifecycle for one tablespace: buffered writes in overlays,
//! exclusive per-key write locks, and the validate-merge-publish commit.

pub mod locks;
pub mod manager;


pub use locks::KeyLockManager;
pub use manager::{ScanContext, TxnManager, TxnStatsSnapshot, TxnStatusFlag};
