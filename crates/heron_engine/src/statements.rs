//! Statements accepted by the engine and their execution results. The
//! SQL front end (out of scope here) lowers text into these shapes.

use heron_common::schema::{IndexDef, TableDef, TablespaceDef};
use heron_common::types::RowKey;
use heron_planner::Predicate;

#[derive(Debug, Clone)]
pub enum Statement {
    CreateTableSpace(TablespaceDef),
    CreateTable(TableDef),
    DropTable {
        tablespace: String,
        table: String,
    },
    CreateIndex(IndexDef),
    DropIndex {
        tablespace: String,
        index: String,
    },
    Insert {
        tablespace: String,
        table: String,
        key: RowKey,
        value: Vec<u8>,
    },
    Update {
        tablespace: String,
        table: String,
        key: RowKey,
        value: Vec<u8>,
    },
    Delete {
        tablespace: String,
        table: String,
        key: RowKey,
        /// When present, the effective row must match or the delete is a
        /// 0-row no-op.
        predicate: Option<Predicate>,
    },
    /// Delete every row matching the predicate (or all rows when absent).
    DeleteWhere {
        tablespace: String,
        table: String,
        predicate: Option<Predicate>,
    },
}

impl Statement {
    /// Tablespace the statement is addressed to.
    pub fn tablespace(&self) -> &str {
        match self {
            Statement::CreateTableSpace(def) => &def.name,
            Statement::CreateTable(def) => &def.tablespace,
            Statement::CreateIndex(def) => &def.tablespace,
            Statement::DropTable { tablespace, .. }
            | Statement::DropIndex { tablespace, .. }
            | Statement::Insert { tablespace, .. }
            | Statement::Update { tablespace, .. }
            | Statement::Delete { tablespace, .. }
            | Statement::DeleteWhere { tablespace, .. } => tablespace,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    TableSpaceCreated,
    /// Schema change accepted (published immediately in autocommit,
    /// buffered until commit inside a transaction).
    Ddl,
    UpdateCount(u64),
}

impl ExecutionResult {
    /// Update count of a DML result; 0 for DDL results.
    pub fn update_count(&self) -> u64 {
        match self {
            ExecutionResult::UpdateCount(n) => *n,
            _ => 0,
        }
    }
}
