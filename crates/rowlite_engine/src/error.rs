//! Error types for the row engine.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The named table does not exist.
    #[error("table not found: {table}")]
    TableNotFound {
        /// Name of the table.
        table: String,
    },

    /// A referenced column does not exist on the table.
    #[error("column not found: {column} on table {table}")]
    ColumnNotFound {
        /// Name of the table.
        table: String,
        /// Name of the missing column.
        column: String,
    },

    /// A column with this name is already declared on the table.
    #[error("duplicate column: {column} on table {table}")]
    DuplicateColumn {
        /// Name of the table.
        table: String,
        /// Name of the duplicated column.
        column: String,
    },

    /// A declared constraint rejected the operation.
    #[error("constraint violation: {message}")]
    ConstraintViolation {
        /// Description of the violated constraint.
        message: String,
    },

    /// A clause or statement could not be parsed.
    #[error("parse error: {message}")]
    Parse {
        /// Description of the parse failure.
        message: String,
    },

    /// The bound argument count does not match the clause's parameters.
    #[error("argument count mismatch: clause has {expected} parameters, {actual} bound")]
    ArgumentCount {
        /// Parameters declared in the clause.
        expected: usize,
        /// Arguments supplied by the caller.
        actual: usize,
    },

    /// A transaction is already active on this thread.
    #[error("transaction already active on this thread")]
    TransactionActive,

    /// Another process holds the store's exclusive lock.
    #[error("store is locked by another process")]
    Locked,

    /// No store exists at the given path and creation was disabled.
    #[error("store not found at {path}")]
    StoreMissing {
        /// Path that was probed.
        path: PathBuf,
    },

    /// The snapshot file is corrupt or has an unknown format.
    #[error("snapshot error: {message}")]
    Snapshot {
        /// Description of the snapshot failure.
        message: String,
    },
}

impl EngineError {
    /// Creates a table-not-found error.
    pub fn table_not_found(table: impl Into<String>) -> Self {
        Self::TableNotFound {
            table: table.into(),
        }
    }

    /// Creates a column-not-found error.
    pub fn column_not_found(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::ColumnNotFound {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Creates a duplicate-column error.
    pub fn duplicate_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::DuplicateColumn {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Creates a constraint violation error.
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::ConstraintViolation {
            message: message.into(),
        }
    }

    /// Creates a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Creates a snapshot error.
    pub fn snapshot(message: impl Into<String>) -> Self {
        Self::Snapshot {
            message: message.into(),
        }
    }
}
