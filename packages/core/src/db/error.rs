//! Database Error Types
//!
//! This module defines error types for storage operations, covering
//! connection, initialization, query failures and the transient lock
//! conflicts that callers may retry.

use std::path::PathBuf;
use thiserror::Error;

/// Storage operation errors
///
/// Shared by every `NodeStore` / `AnnotationStore` backend. Engine-level
/// meaning (not found, conflict, ...) is assigned by the service layer.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to establish database connection
    #[error("Failed to connect to database at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        source: libsql::Error,
    },

    /// Failed to initialize database schema
    #[error("Failed to initialize database schema: {0}")]
    InitializationFailed(String),

    /// Permission denied when accessing database
    #[error("Permission denied for database path: {path}")]
    PermissionDenied { path: PathBuf },

    /// Failed to create parent directory
    #[error("Failed to create parent directory for database: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    /// libsql operation error
    #[error("Database operation failed: {0}")]
    LibsqlError(#[from] libsql::Error),

    /// SQL execution error with context
    #[error("SQL execution failed: {context}")]
    SqlExecutionError { context: String },

    /// Row could not be converted into a model
    #[error("Failed to decode row: {0}")]
    RowConversion(#[from] anyhow::Error),

    /// Another writer holds the database lock; the unit of work was rolled back
    #[error("Database is busy: {context}")]
    Busy { context: String },

    /// A uniqueness or foreign key constraint rejected the write
    #[error("Constraint violation: {context}")]
    ConstraintViolation { context: String },

    /// An update or delete referenced a record that does not exist
    #[error("Record not found: {id}")]
    RecordNotFound { id: String },

    /// An insert reused an existing id
    #[error("Duplicate record id: {id}")]
    DuplicateId { id: String },
}

impl DatabaseError {
    /// Create a connection failed error
    pub fn connection_failed(path: PathBuf, source: libsql::Error) -> Self {
        Self::ConnectionFailed { path, source }
    }

    /// Create an initialization failed error
    pub fn initialization_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    /// Create a permission denied error
    pub fn permission_denied(path: PathBuf) -> Self {
        Self::PermissionDenied { path }
    }

    /// Create a SQL execution error with context
    pub fn sql_execution(context: impl Into<String>) -> Self {
        Self::SqlExecutionError {
            context: context.into(),
        }
    }

    /// Create a record not found error
    pub fn record_not_found(id: impl Into<String>) -> Self {
        Self::RecordNotFound { id: id.into() }
    }

    /// Classify a libsql failure raised while executing `what`
    ///
    /// SQLite reports lock contention and constraint failures only through
    /// its message text, so classification is by message.
    pub fn from_statement(what: &str, err: libsql::Error) -> Self {
        let message = err.to_string();
        if message.contains("database is locked") || message.contains("SQLITE_BUSY") {
            Self::Busy {
                context: format!("{}: {}", what, message),
            }
        } else if message.contains("constraint failed") {
            Self::ConstraintViolation {
                context: format!("{}: {}", what, message),
            }
        } else {
            Self::sql_execution(format!("{}: {}", what, message))
        }
    }

    /// Whether retrying the same unit of work later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_busy_is_transient() {
        assert!(DatabaseError::Busy {
            context: "x".to_string()
        }
        .is_transient());
        assert!(!DatabaseError::record_not_found("n1").is_transient());
        assert!(!DatabaseError::sql_execution("boom").is_transient());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            DatabaseError::record_not_found("n1").to_string(),
            "Record not found: n1"
        );
        assert_eq!(
            DatabaseError::initialization_failed("no table").to_string(),
            "Failed to initialize database schema: no table"
        );
    }
}
