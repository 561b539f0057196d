use thiserror::Error;

use crate::types::TxnId;

/// Convenience alias for `Result<T, CoreError>`.
pub type CoreResult<T> = Result<T, CoreError>;

/// Error classification for retry/escalation decisions.
///
/// - `UserError`   — bad input, unknown object, constraint violation
/// - `Retryable`   — commit conflict, tablespace not yet ready; client SHOULD retry
/// - `Transient`   — lock timeout, queue full; client MAY retry after back-off
/// - `InternalBug` — should never happen; indicates corruption or a defect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UserError,
    Retryable,
    Transient,
    InternalBug,
}

/// Top-level error type that all crate-specific errors convert into.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Transaction error: {0}")]
    Txn(#[from] TxnError),

    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Storage layer errors.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Table already exists: {0}")]
    TableAlreadyExists(String),

    #[error("Index not found: {0}")]
    IndexNotFound(String),

    #[error("Index already exists: {0}")]
    IndexAlreadyExists(String),

    #[error("Index {index} not usable in state {state}")]
    IndexNotUsable { index: String, state: String },

    #[error("Duplicate primary key in table {table}: {key_hex}")]
    DuplicateKey { table: String, key_hex: String },

    #[error("Key not found")]
    KeyNotFound,

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Codec error: {0}")]
    Codec(String),
}

/// Transaction layer errors.
#[derive(Error, Debug)]
pub enum TxnError {
    #[error("Transaction {0} not found")]
    NotFound(TxnId),

    #[error("Transaction {0} conflict at commit: {1}")]
    Conflict(TxnId, String),

    #[error("Transaction {0} constraint violation: {1}")]
    ConstraintViolation(TxnId, String),

    #[error("Transaction {txn_id} lock timeout on {table}:{key_hex} after {waited_ms}ms")]
    LockTimeout {
        txn_id: TxnId,
        table: String,
        key_hex: String,
        waited_ms: u64,
    },
}

/// Planner errors.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Unknown column: {0}")]
    UnknownColumn(String),
}

/// Engine / tablespace lifecycle errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Tablespace not found: {0}")]
    TablespaceNotFound(String),

    #[error("Tablespace already exists: {0}")]
    TablespaceAlreadyExists(String),

    #[error("Tablespace {name} not ready after {waited_ms}ms")]
    TablespaceNotReady { name: String, waited_ms: u64 },

    #[error("Statement worker queue full")]
    WorkerQueueFull,

    #[error("Engine shutting down")]
    ShuttingDown,
}

// ── CoreError classification & helpers ───────────────────────────────────────

impl CoreError {
    /// Classify this error for retry/escalation decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            // User-facing errors (unknown objects, bad input, constraints)
            CoreError::Plan(_) => ErrorKind::UserError,
            CoreError::Storage(StorageError::TableNotFound(_)) => ErrorKind::UserError,
            CoreError::Storage(StorageError::TableAlreadyExists(_)) => ErrorKind::UserError,
            CoreError::Storage(StorageError::IndexNotFound(_)) => ErrorKind::UserError,
            CoreError::Storage(StorageError::IndexAlreadyExists(_)) => ErrorKind::UserError,
            CoreError::Storage(StorageError::IndexNotUsable { .. }) => ErrorKind::UserError,
            CoreError::Storage(StorageError::DuplicateKey { .. }) => ErrorKind::UserError,
            CoreError::Storage(StorageError::KeyNotFound) => ErrorKind::UserError,
            CoreError::Storage(StorageError::InvalidSchema(_)) => ErrorKind::UserError,
            CoreError::Txn(TxnError::NotFound(_)) => ErrorKind::UserError,
            CoreError::Txn(TxnError::ConstraintViolation(_, _)) => ErrorKind::UserError,
            CoreError::Engine(EngineError::TablespaceNotFound(_)) => ErrorKind::UserError,
            CoreError::Engine(EngineError::TablespaceAlreadyExists(_)) => ErrorKind::UserError,

            // Retryable: commit validation lost a race, or readiness poll ran out
            CoreError::Txn(TxnError::Conflict(_, _)) => ErrorKind::Retryable,
            CoreError::Engine(EngineError::TablespaceNotReady { .. }) => ErrorKind::Retryable,

            // Transient resource contention
            CoreError::Txn(TxnError::LockTimeout { .. }) => ErrorKind::Transient,
            CoreError::Engine(EngineError::WorkerQueueFull) => ErrorKind::Transient,
            CoreError::Engine(EngineError::ShuttingDown) => ErrorKind::Transient,

            // Everything else is an internal bug
            CoreError::Storage(StorageError::Codec(_)) => ErrorKind::InternalBug,
            CoreError::Internal(_) => ErrorKind::InternalBug,
        }
    }

    /// Returns true if the client should retry this operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Retryable)
    }

    /// Returns true if this is a user/input error.
    pub fn is_user_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::UserError)
    }

    /// Returns true if this is a transient contention error.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient)
    }

    /// Suggested retry delay in milliseconds (0 = retry immediately).
    pub fn retry_after_ms(&self) -> u64 {
        match self {
            CoreError::Txn(TxnError::Conflict(_, _)) => 10,
            CoreError::Txn(TxnError::LockTimeout { .. }) => 100,
            CoreError::Engine(EngineError::TablespaceNotReady { .. }) => 50,
            CoreError::Engine(EngineError::WorkerQueueFull) => 50,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod error_classification {
    use super::*;

    #[test]
    fn unknown_objects_are_user_errors() {
        let e: CoreError = StorageError::TableNotFound("t1".into()).into();
        assert_eq!(e.kind(), ErrorKind::UserError);
        assert!(e.is_user_error());
        assert!(!e.is_retryable());

        let e: CoreError = EngineError::TablespaceNotFound("ts".into()).into();
        assert_eq!(e.kind(), ErrorKind::UserError);
    }

    #[test]
    fn duplicate_key_is_user_error() {
        let e: CoreError = StorageError::DuplicateKey {
            table: "t1".into(),
            key_hex: "02ff".into(),
        }
        .into();
        assert_eq!(e.kind(), ErrorKind::UserError);
    }

    #[test]
    fn constraint_violation_is_user_error() {
        let e: CoreError = TxnError::ConstraintViolation(TxnId(1), "dup pk".into()).into();
        assert_eq!(e.kind(), ErrorKind::UserError);
        assert_eq!(e.retry_after_ms(), 0);
    }

    #[test]
    fn commit_conflict_is_retryable() {
        let e: CoreError = TxnError::Conflict(TxnId(7), "table already exists".into()).into();
        assert_eq!(e.kind(), ErrorKind::Retryable);
        assert!(e.is_retryable());
        assert_eq!(e.retry_after_ms(), 10);
    }

    #[test]
    fn tablespace_not_ready_is_retryable() {
        let e: CoreError = EngineError::TablespaceNotReady {
            name: "ts".into(),
            waited_ms: 100,
        }
        .into();
        assert_eq!(e.kind(), ErrorKind::Retryable);
        assert_eq!(e.retry_after_ms(), 50);
    }

    #[test]
    fn lock_timeout_is_transient() {
        let e: CoreError = TxnError::LockTimeout {
            txn_id: TxnId(3),
            table: "t1".into(),
            key_hex: "00".into(),
            waited_ms: 250,
        }
        .into();
        assert_eq!(e.kind(), ErrorKind::Transient);
        assert!(e.is_transient());
        assert_eq!(e.retry_after_ms(), 100);
    }

    #[test]
    fn worker_queue_full_is_transient() {
        let e: CoreError = EngineError::WorkerQueueFull.into();
        assert_eq!(e.kind(), ErrorKind::Transient);
    }

    #[test]
    fn codec_failure_is_internal_bug() {
        let e: CoreError = StorageError::Codec("truncated".into()).into();
        assert_eq!(e.kind(), ErrorKind::InternalBug);
    }

    #[test]
    fn plan_errors_are_user_errors() {
        let e: CoreError = PlanError::UnknownColumn("nope".into()).into();
        assert_eq!(e.kind(), ErrorKind::UserError);
    }

    #[test]
    fn finished_txn_lookup_is_user_error() {
        let e: CoreError = TxnError::NotFound(TxnId(9)).into();
        assert_eq!(e.kind(), ErrorKind::UserError);
        assert!(e.to_string().contains("txn-9"));
    }
}
