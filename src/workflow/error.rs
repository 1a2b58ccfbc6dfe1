use thiserror::Error;

use crate::database::retry::Transient;
use crate::database::DatabaseError;
use crate::storage::StorageError;

/// Errors raised by the registrar workflows
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Malformed or missing input, detected before any mutation
    #[error("{message}")]
    Validation {
        field: Option<String>,
        message: String,
    },

    /// Duplicate submission or an unmet workflow precondition
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("cannot move {entity} from '{from}' to '{to}'")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("{0}")]
    Forbidden(String),

    #[error("document storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl WorkflowError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        WorkflowError::Validation {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        WorkflowError::Conflict(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        WorkflowError::NotFound(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        WorkflowError::Forbidden(message.into())
    }

    pub fn invalid_transition(
        entity: &'static str,
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> Self {
        WorkflowError::InvalidTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

impl From<sqlx::Error> for WorkflowError {
    fn from(err: sqlx::Error) -> Self {
        WorkflowError::Database(DatabaseError::Sqlx(err))
    }
}

impl Transient for WorkflowError {
    fn is_transient(&self) -> bool {
        match self {
            WorkflowError::Database(err) => err.is_transient(),
            _ => false,
        }
    }
}
