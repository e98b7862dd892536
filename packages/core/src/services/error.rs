//! Service Layer Error Types
//!
//! `TreeError` is the single error type returned by `TreeEngine` and
//! `AnnotationService`. Lower-layer errors are folded into its five kinds so
//! callers can branch on what happened rather than where.

use crate::db::DatabaseError;
use crate::models::ValidationError;
use crate::operations::OperationError;
use thiserror::Error;

/// Service operation errors
#[derive(Error, Debug)]
pub enum TreeError {
    /// A referenced node, root or annotation does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The operation conflicts with the current state
    ///
    /// `transient` is set when the conflict was lock contention in the store;
    /// nothing was applied and the same call may succeed later.
    #[error("Conflict: {message}")]
    Conflict { message: String, transient: bool },

    /// Input was rejected before anything was written
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The operation is never allowed on this target
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Storage failed for a reason unrelated to the request
    #[error("Database operation failed: {0}")]
    Database(#[source] DatabaseError),
}

impl TreeError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a node not found error
    pub fn node_not_found(id: &str) -> Self {
        Self::NotFound(format!("node '{}'", id))
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict {
            message: msg.into(),
            transient: false,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    /// Whether the failed call may be retried unchanged
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Conflict {
                transient: true,
                ..
            }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<DatabaseError> for TreeError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Busy { context } => Self::Conflict {
                message: format!("store is busy, retry later ({})", context),
                transient: true,
            },
            DatabaseError::ConstraintViolation { context } => Self::Conflict {
                message: context,
                transient: false,
            },
            DatabaseError::DuplicateId { id } => Self::Conflict {
                message: format!("id '{}' already exists", id),
                transient: false,
            },
            DatabaseError::RecordNotFound { id } => Self::node_not_found(&id),
            other => Self::Database(other),
        }
    }
}

impl From<OperationError> for TreeError {
    fn from(err: OperationError) -> Self {
        if err.is_not_found() {
            Self::NotFound(err.to_string())
        } else {
            Self::Validation(err.to_string())
        }
    }
}

impl From<ValidationError> for TreeError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}
