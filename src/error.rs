// Error types
// Every fallible operation in the storage engine reports one of these variants

use crate::registry::StorageType;
use thiserror::Error;

/// Errors raised by column storages, the storage factory and the table layer.
///
/// Read-only queries (classification, null checks, comparisons) never fail;
/// only construction and mutation report errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The factory was asked to build storage for a type that can never back a
    /// column (no type at all, or the null marker type itself).
    #[error("invalid storage type {storage_type} for column '{column}'")]
    InvalidStorageType {
        storage_type: StorageType,
        column: String,
    },

    /// A value could not be coerced into the storage's native representation.
    /// The target row is left untouched.
    #[error("cannot convert '{value}' to {target}: {reason}")]
    Conversion {
        value: String,
        target: StorageType,
        reason: String,
    },

    /// A capability-gated operation was invoked on a storage without that capability.
    #[error("{operation} is not supported by {storage_type} storage")]
    Unsupported {
        operation: &'static str,
        storage_type: StorageType,
    },

    /// Integer or decimal accumulation overflowed while aggregating.
    #[error("arithmetic overflow while computing {0}")]
    Overflow(String),

    /// A bulk snapshot was handed to a storage of a different type or size.
    #[error("snapshot of {found} values cannot be restored into {expected} storage")]
    SnapshotMismatch {
        expected: StorageType,
        found: StorageType,
    },

    #[error("column not found: {0}")]
    UnknownColumn(String),

    #[error("column already exists: {0}")]
    DuplicateColumn(String),

    #[error("row {row} out of range (row count {row_count})")]
    RowOutOfRange { row: usize, row_count: usize },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub(crate) fn conversion(
        value: impl std::fmt::Display,
        target: StorageType,
        reason: impl Into<String>,
    ) -> Self {
        StorageError::Conversion {
            value: value.to_string(),
            target,
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported(operation: &'static str, storage_type: StorageType) -> Self {
        StorageError::Unsupported {
            operation,
            storage_type,
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = StorageError> = std::result::Result<T, E>;
