#![allow(dead_code)]

use std::sync::Arc;

use heron_common::config::EngineConfig;
use heron_common::datum::{encode_key, encode_row, Datum};
use heron_common::schema::{ColumnType, IndexDef, TableDef, TablespaceDef};
use heron_common::types::TxnId;
use heron_engine::{DbEngine, Statement};

pub const TS: &str = "ts1";

pub fn engine() -> Arc<DbEngine> {
    engine_with(EngineConfig::default())
}

pub fn engine_with(config: EngineConfig) -> Arc<DbEngine> {
    let engine = Arc::new(DbEngine::new(config));
    engine
        .create_tablespace(TablespaceDef::single_node(TS, "node1"))
        .unwrap();
    engine
}

pub fn users_table() -> TableDef {
    TableDef::builder()
        .tablespace(TS)
        .name("users")
        .not_null_column("id", ColumnType::Int64)
        .column("name", ColumnType::Text)
        .column("grp", ColumnType::Text)
        .primary_key("id")
        .build()
        .unwrap()
}

pub fn create_users(engine: &DbEngine) {
    engine
        .execute(None, Statement::CreateTable(users_table()))
        .unwrap();
}

pub fn grp_index() -> IndexDef {
    IndexDef::new(TS, "users", "users_grp", vec!["grp".into()])
}

pub fn key(id: i64) -> Vec<u8> {
    encode_key(&[Datum::Int64(id)])
}

pub fn row(id: i64, name: &str, grp: &str) -> Vec<u8> {
    encode_row(&[
        Datum::Int64(id),
        Datum::Text(name.into()),
        Datum::Text(grp.into()),
    ])
}

pub fn insert_stmt(id: i64, name: &str, grp: &str) -> Statement {
    Statement::Insert {
        tablespace: TS.into(),
        table: "users".into(),
        key: key(id),
        value: row(id, name, grp),
    }
}

pub fn insert_user(engine: &DbEngine, txn: Option<TxnId>, id: i64, name: &str, grp: &str) {
    assert_eq!(
        engine
            .execute(txn, insert_stmt(id, name, grp))
            .unwrap()
            .update_count(),
        1
    );
}

/// Number of effective rows the caller sees, optionally filtered.
pub fn count_rows(
    engine: &DbEngine,
    txn: Option<TxnId>,
    predicate: Option<heron_planner::Predicate>,
) -> usize {
    engine.scan(txn, TS, "users", predicate).unwrap().consume().len()
}
