//! Rule-based access-path selection.

use heron_common::datum::encode_key;
use heron_common::schema::TableDef;
use heron_storage::CatalogSnapshot;

use crate::predicate::Predicate;

/// How the scan executor obtains candidate keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOperation {
    /// Equality on the primary key: at most one candidate.
    PrimaryKeySeek { key: Vec<u8> },
    /// Equality on a column covered by an active secondary index.
    SecondaryIndexSeek { index: String, value: Vec<u8> },
    /// Enumerate every key.
    FullScan,
}

pub struct AccessPathSelector;

impl AccessPathSelector {
    /// Pick the access path for a predicate against the *committed*
    /// catalog. Precedence: primary key seek, then the first declared
    /// active index on the equality column, then full scan. The index
    /// result is a superset hint; the executor re-checks the predicate.
    pub fn choose(
        table: &TableDef,
        predicate: Option<&Predicate>,
        snapshot: &CatalogSnapshot,
    ) -> IndexOperation {
        let Some((column, value)) = predicate.and_then(|p| p.equality()) else {
            return IndexOperation::FullScan;
        };

        if table.is_single_column_pk(column) {
            return IndexOperation::PrimaryKeySeek {
                key: encode_key(std::slice::from_ref(value)),
            };
        }

        for meta in snapshot.active_indexes_on_table(&table.name) {
            let cols = &meta.def.columns;
            if cols.len() == 1 && cols[0].eq_ignore_ascii_case(column) {
                tracing::debug!(
                    table = %table.name,
                    index = %meta.def.name,
                    "access path: secondary index seek"
                );
                return IndexOperation::SecondaryIndexSeek {
                    index: meta.def.name.clone(),
                    value: encode_key(std::slice::from_ref(value)),
                };
            }
        }

        IndexOperation::FullScan
    }
}
