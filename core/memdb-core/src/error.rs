//! Error types for the memdb engine.
//!
//! All public APIs return `MemDbResult<T>`; library code does not panic.

use crate::lock::LockKind;
use std::time::Duration;
use thiserror::Error;

/// Unified error type for all memdb operations.
#[derive(Debug, Error)]
pub enum MemDbError {
    /// A lock acquisition did not complete within the configured timeout
    #[error("timed out after {waited:?} waiting for {kind} lock on '{lock}'")]
    LockTimeout {
        lock: String,
        kind: LockKind,
        waited: Duration,
    },

    /// Read → write upgrade on the same lock by the same context
    #[error(
        "deadlock avoided: context already holds a read lock on '{lock}' and cannot upgrade it to a write lock"
    )]
    SelfDeadlock { lock: String },

    /// Lock ledger bookkeeping is broken (caller defect, fatal)
    #[error("lock ledger inconsistency: {0}")]
    LedgerInconsistency(String),

    /// DDL issued inside an explicit transaction
    #[error("DDL statements cannot be executed within a transaction")]
    DdlInTransaction,

    /// Requested table does not exist
    #[error("table '{0}' not found")]
    TableNotFound(String),

    /// CREATE TABLE on an existing name
    #[error("table '{0}' already exists")]
    TableAlreadyExists(String),

    /// Column reference that the table does not define
    #[error("column '{column}' not found in table '{table}'")]
    ColumnNotFound { table: String, column: String },

    /// Type mismatch between expected and actual values
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Constraint violation (NOT NULL, arity, etc.)
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// SQL parsing error
    #[error("SQL parse error: {message}\nSQL: {sql}")]
    SqlParse { message: String, sql: String },

    /// Unsupported SQL feature
    #[error("SQL feature not supported: {feature}\nHint: {hint}")]
    SqlNotSupported { feature: String, hint: String },

    /// Invalid operation
    #[error("invalid operation: {message}\nContext: {context}")]
    InvalidOperation { message: String, context: String },

    /// Standard I/O error
    #[error("io error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Redo log error
    #[error("redo log error: {0}")]
    Wal(String),

    /// Recovery failed
    #[error("recovery failed: {0}")]
    RecoveryFailed(String),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl MemDbError {
    /// Fatal errors mean the lock/ledger invariant is already broken.
    /// The owning connection must stop serving requests.
    pub fn is_fatal(&self) -> bool {
        matches!(self, MemDbError::LedgerInconsistency(_))
    }

    /// Timeout and deadlock-avoidance errors come from the lock layer.
    pub fn is_lock_error(&self) -> bool {
        matches!(
            self,
            MemDbError::LockTimeout { .. } | MemDbError::SelfDeadlock { .. }
        )
    }
}

/// Result type alias for all memdb operations.
pub type MemDbResult<T> = Result<T, MemDbError>;

impl From<serde_json::Error> for MemDbError {
    fn from(err: serde_json::Error) -> Self {
        MemDbError::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for MemDbError {
    fn from(err: bincode::Error) -> Self {
        MemDbError::Serialization(err.to_string())
    }
}
