use std::fmt;

use serde::{Deserialize, Serialize};

/// Primary key encoded as a byte vector for hashing / comparison.
pub type RowKey = Vec<u8>;

/// Monotonic transaction identifier, unique within a tablespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxnId(pub u64);

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn-{}", self.0)
    }
}

/// Version of a published catalog snapshot. Bumped only at commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CatalogVersion(pub u64);

impl fmt::Display for CatalogVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Transaction lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxnState {
    Active,
    Committed,
    RolledBack,
}

impl TxnState {
    pub fn as_u8(self) -> u8 {
        match self {
            TxnState::Active => 0,
            TxnState::Committed => 1,
            TxnState::RolledBack => 2,
        }
    }

    pub fn from_u8(v: u8) -> TxnState {
        match v {
            0 => TxnState::Active,
            1 => TxnState::Committed,
            _ => TxnState::RolledBack,
        }
    }
}

impl fmt::Display for TxnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TxnState::Active => "active",
            TxnState::Committed => "committed",
            TxnState::RolledBack => "rolled-back",
        };
        f.write_str(s)
    }
}

/// Secondary index lifecycle state. A dropped index is removed from the
/// snapshot outright, so no third state is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexState {
    /// Backfill in progress; not yet usable for planning.
    Building,
    /// Fully populated and eligible for access-path selection.
    Active,
}

impl fmt::Display for IndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IndexState::Building => "building",
            IndexState::Active => "active",
        };
        f.write_str(s)
    }
}

/// Hex-encode a byte slice for diagnostic output.
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn txn_id_display() {
        assert_eq!(TxnId(42).to_string(), "txn-42");
    }

    #[test]
    fn txn_state_round_trips_through_u8() {
        for s in [TxnState::Active, TxnState::Committed, TxnState::RolledBack] {
            assert_eq!(TxnState::from_u8(s.as_u8()), s);
        }
    }

    #[test]
    fn hex_encode_formats_bytes() {
        assert_eq!(hex_encode(&[0x00, 0xff, 0x1a]), "00ff1a");
    }
}
