//! Structured row predicates. SQL parsing happens in an outer layer; the
//! core receives predicates already shaped as comparison trees.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use heron_common::datum::Datum;
use heron_common::error::PlanError;
use heron_common::schema::TableDef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn matches(self, ord: Ordering) -> bool {
        match self {
            CmpOp::Eq => ord == Ordering::Equal,
            CmpOp::Ne => ord != Ordering::Equal,
            CmpOp::Lt => ord == Ordering::Less,
            CmpOp::Le => ord != Ordering::Greater,
            CmpOp::Gt => ord == Ordering::Greater,
            CmpOp::Ge => ord != Ordering::Less,
        }
    }
}

/// A predicate over one row. Comparisons against `Null` or a mismatched
/// type never match, mirroring SQL three-valued logic collapsed to false.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Predicate {
    Compare {
        column: String,
        op: CmpOp,
        value: Datum,
    },
    And(Vec<Predicate>),
}

impl Predicate {
    pub fn eq(column: impl Into<String>, value: Datum) -> Self {
        Predicate::Compare {
            column: column.into(),
            op: CmpOp::Eq,
            value,
        }
    }

    pub fn cmp(column: impl Into<String>, op: CmpOp, value: Datum) -> Self {
        Predicate::Compare {
            column: column.into(),
            op,
            value,
        }
    }

    pub fn and(predicates: Vec<Predicate>) -> Self {
        Predicate::And(predicates)
    }

    /// First equality comparison in this predicate, if any. This is the
    /// seed the access-path selector matches against key and index columns.
    pub fn equality(&self) -> Option<(&str, &Datum)> {
        match self {
            Predicate::Compare {
                column,
                op: CmpOp::Eq,
                value,
            } => Some((column.as_str(), value)),
            Predicate::Compare { .. } => None,
            Predicate::And(children) => children.iter().find_map(|p| p.equality()),
        }
    }

    /// Check that every referenced column exists on the table.
    pub fn validate(&self, table: &TableDef) -> Result<(), PlanError> {
        match self {
            Predicate::Compare { column, .. } => {
                if table.find_column(column).is_none() {
                    return Err(PlanError::UnknownColumn(column.clone()));
                }
                Ok(())
            }
            Predicate::And(children) => {
                for child in children {
                    child.validate(table)?;
                }
                Ok(())
            }
        }
    }

    /// Evaluate against decoded row values. Columns are resolved through
    /// the table definition; `validate` has already rejected unknown ones.
    pub fn eval(&self, table: &TableDef, values: &[Datum]) -> bool {
        match self {
            Predicate::Compare { column, op, value } => {
                let Some(idx) = table.find_column(column) else {
                    return false;
                };
                let Some(actual) = values.get(idx) else {
                    return false;
                };
                match actual.compare(value) {
                    Some(ord) => op.matches(ord),
                    None => false,
                }
            }
            Predicate::And(children) => children.iter().all(|p| p.eval(table, values)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heron_common::schema::ColumnType;

    fn table() -> TableDef {
        TableDef::builder()
            .tablespace("ts1")
            .name("t1")
            .not_null_column("id", ColumnType::Int64)
            .column("name", ColumnType::Text)
            .primary_key("id")
            .build()
            .unwrap()
    }

    fn row(id: i64, name: &str) -> Vec<Datum> {
        vec![Datum::Int64(id), Datum::Text(name.into())]
    }

    #[test]
    fn compare_ops_evaluate() {
        let t = table();
        assert!(Predicate::eq("id", Datum::Int64(5)).eval(&t, &row(5, "x")));
        assert!(!Predicate::eq("id", Datum::Int64(5)).eval(&t, &row(6, "x")));
        assert!(Predicate::cmp("id", CmpOp::Ge, Datum::Int64(5)).eval(&t, &row(5, "x")));
        assert!(Predicate::cmp("id", CmpOp::Lt, Datum::Int64(5)).eval(&t, &row(4, "x")));
        assert!(Predicate::cmp("name", CmpOp::Ne, Datum::Text("a".into())).eval(&t, &row(1, "b")));
    }

    #[test]
    fn and_requires_all_branches() {
        let t = table();
        let p = Predicate::and(vec![
            Predicate::eq("name", Datum::Text("a".into())),
            Predicate::cmp("id", CmpOp::Ge, Datum::Int64(2)),
        ]);
        assert!(p.eval(&t, &row(2, "a")));
        assert!(!p.eval(&t, &row(1, "a")));
        assert!(!p.eval(&t, &row(2, "b")));
    }

    #[test]
    fn null_and_type_mismatch_never_match() {
        let t = table();
        let p = Predicate::eq("name", Datum::Text("a".into()));
        assert!(!p.eval(&t, &[Datum::Int64(1), Datum::Null]));
        let p = Predicate::eq("id", Datum::Text("1".into()));
        assert!(!p.eval(&t, &row(1, "a")));
    }

    #[test]
    fn equality_surfaces_through_and() {
        let p = Predicate::and(vec![
            Predicate::cmp("id", CmpOp::Ge, Datum::Int64(2)),
            Predicate::eq("name", Datum::Text("a".into())),
        ]);
        let (col, val) = p.equality().unwrap();
        assert_eq!(col, "name");
        assert_eq!(val, &Datum::Text("a".into()));

        let p = Predicate::cmp("id", CmpOp::Gt, Datum::Int64(0));
        assert!(p.equality().is_none());
    }

    #[test]
    fn validate_rejects_unknown_column() {
        let t = table();
        let err = Predicate::eq("missing", Datum::Int64(1))
            .validate(&t)
            .unwrap_err();
        assert!(matches!(err, PlanError::UnknownColumn(_)));
    }
}
