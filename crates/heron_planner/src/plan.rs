//! Translated scan plans. Kept as plain data so callers and tests can
//! inspect the chosen access path before executing.

use heron_common::error::PlanError;
use heron_common::schema::TableDef;
use heron_storage::CatalogSnapshot;

use crate::access_path::{AccessPathSelector, IndexOperation};
use crate::predicate::Predicate;

/// A scan request with its resolved access path.
#[derive(Debug, Clone)]
pub struct ScanStatement {
    pub tablespace: String,
    pub table: String,
    pub predicate: Option<Predicate>,
    pub index_op: IndexOperation,
}

/// Result of translating a scan request.
#[derive(Debug, Clone)]
pub struct TranslatedQuery {
    pub main_statement: ScanStatement,
}

/// Validate the predicate against the table and pick the access path.
/// The snapshot is always the committed catalog; pending schema edits of
/// the calling transaction are invisible here by design.
pub fn translate_scan(
    table: &TableDef,
    predicate: Option<Predicate>,
    snapshot: &CatalogSnapshot,
) -> Result<TranslatedQuery, PlanError> {
    if let Some(p) = &predicate {
        p.validate(table)?;
    }
    let index_op = AccessPathSelector::choose(table, predicate.as_ref(), snapshot);
    Ok(TranslatedQuery {
        main_statement: ScanStatement {
            tablespace: table.tablespace.clone(),
            table: table.name.clone(),
            predicate,
            index_op,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use heron_common::datum::Datum;
    use heron_common::schema::ColumnType;
    use heron_storage::{MetadataMutation, TablespaceStorage};

    #[test]
    fn translate_validates_predicate_columns() {
        let def = TableDef::builder()
            .tablespace("ts1")
            .name("t1")
            .not_null_column("id", ColumnType::Int64)
            .primary_key("id")
            .build()
            .unwrap();
        let ts = TablespaceStorage::new("ts1");
        ts.apply_metadata(&[MetadataMutation::CreateTable(def.clone())])
            .unwrap();

        let err = translate_scan(
            &def,
            Some(Predicate::eq("ghost", Datum::Int64(1))),
            &ts.snapshot(),
        )
        .unwrap_err();
        assert!(matches!(err, PlanError::UnknownColumn(_)));

        let plan = translate_scan(&def, None, &ts.snapshot()).unwrap();
        assert_eq!(plan.main_statement.index_op, IndexOperation::FullScan);
        assert_eq!(plan.main_statement.table, "t1");
    }
}
