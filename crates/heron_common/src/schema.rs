//! Schema model: tables, indexes, and tablespace metadata.

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Column data types supported by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Boolean,
    Int64,
    Text,
    Bytes,
}

/// Column definition in a table schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub col_type: ColumnType,
    pub nullable: bool,
}

/// Table definition. Column order is the row payload order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDef {
    pub tablespace: String,
    pub name: String,
    pub columns: Vec<ColumnDef>,
    /// Primary key column names, in key order.
    pub primary_key: Vec<String>,
}

impl TableDef {
    pub fn builder() -> TableDefBuilder {
        TableDefBuilder::default()
    }

    /// Find column index by name (case-insensitive).
    pub fn find_column(&self, name: &str) -> Option<usize> {
        let lower = name.to_lowercase();
        self.columns
            .iter()
            .position(|c| c.name.to_lowercase() == lower)
    }

    /// Primary key column indices, in key order.
    pub fn pk_indices(&self) -> Vec<usize> {
        self.primary_key
            .iter()
            .filter_map(|name| self.find_column(name))
            .collect()
    }

    /// True when `column` is the sole primary key column.
    pub fn is_single_column_pk(&self, column: &str) -> bool {
        self.primary_key.len() == 1
            && self.primary_key[0].eq_ignore_ascii_case(column)
    }
}

/// Builder for `TableDef`. Validates that the primary key references
/// declared columns.
#[derive(Debug, Default)]
pub struct TableDefBuilder {
    tablespace: String,
    name: String,
    columns: Vec<ColumnDef>,
    primary_key: Vec<String>,
}

impl TableDefBuilder {
    pub fn tablespace(mut self, tablespace: impl Into<String>) -> Self {
        self.tablespace = tablespace.into();
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn column(mut self, name: impl Into<String>, col_type: ColumnType) -> Self {
        self.columns.push(ColumnDef {
            name: name.into(),
            col_type,
            nullable: true,
        });
        self
    }

    pub fn not_null_column(mut self, name: impl Into<String>, col_type: ColumnType) -> Self {
        self.columns.push(ColumnDef {
            name: name.into(),
            col_type,
            nullable: false,
        });
        self
    }

    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key.push(column.into());
        self
    }

    pub fn build(self) -> Result<TableDef, StorageError> {
        if self.name.is_empty() {
            return Err(StorageError::InvalidSchema("table name is empty".into()));
        }
        if self.columns.is_empty() {
            return Err(StorageError::InvalidSchema(format!(
                "table {} has no columns",
                self.name
            )));
        }
        if self.primary_key.is_empty() {
            return Err(StorageError::InvalidSchema(format!(
                "table {} has no primary key",
                self.name
            )));
        }
        let def = TableDef {
            tablespace: self.tablespace,
            name: self.name,
            columns: self.columns,
            primary_key: self.primary_key,
        };
        for pk in &def.primary_key {
            if def.find_column(pk).is_none() {
                return Err(StorageError::InvalidSchema(format!(
                    "primary key column {pk} not declared in table {}",
                    def.name
                )));
            }
        }
        Ok(def)
    }
}

/// Secondary index definition. Only HASH equality indexes are supported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDef {
    pub tablespace: String,
    pub table: String,
    pub name: String,
    /// Indexed column names, in key order.
    pub columns: Vec<String>,
}

impl IndexDef {
    pub fn new(
        tablespace: impl Into<String>,
        table: impl Into<String>,
        name: impl Into<String>,
        columns: Vec<String>,
    ) -> Self {
        Self {
            tablespace: tablespace.into(),
            table: table.into(),
            name: name.into(),
            columns,
        }
    }

    /// Conventional name for an unnamed index: `<table>_<col>[_<col>...]`.
    pub fn default_name(table: &str, columns: &[String]) -> String {
        let mut name = table.to_string();
        for c in columns {
            name.push('_');
            name.push_str(c);
        }
        name
    }
}

/// Tablespace metadata recorded at creation. Replication is handled by an
/// outer layer; the parameters are carried so the catalog stays durable-ready.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TablespaceDef {
    pub name: String,
    /// Node names this tablespace is assigned to.
    pub replicas: Vec<String>,
    pub leader: String,
    pub expected_replica_count: usize,
    pub max_leader_inactivity_ms: u64,
}

impl TablespaceDef {
    /// Single-node tablespace, the common shape in tests.
    pub fn single_node(name: impl Into<String>, node: impl Into<String>) -> Self {
        let node = node.into();
        Self {
            name: name.into(),
            replicas: vec![node.clone()],
            leader: node,
            expected_replica_count: 1,
            max_leader_inactivity_ms: 0,
        }
    }
}
