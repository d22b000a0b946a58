//! Identity service error types.

use thiserror::Error;

use likeness_core::Violations;

use crate::db::RepositoryError;

/// Errors that can occur during identity operations.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// One or more fields failed validation.
    #[error(transparent)]
    Validation(#[from] Violations),

    /// A uniqueness or single-assignment rule was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Lookup or update by id against a missing row.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(RepositoryError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}

impl IdentityError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<RepositoryError> for IdentityError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::Conflict(message) => Self::Conflict(message),
            RepositoryError::NotFound { entity, id } => Self::NotFound { entity, id },
            other => Self::Repository(other),
        }
    }
}
