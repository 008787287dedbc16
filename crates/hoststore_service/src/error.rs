//! Service error types.

use hoststore_core::{ConflictError, CoreError};
use thiserror::Error;

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors returned by the services.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No page is stored under the name.
    #[error("page not found: {name:?}")]
    PageNotFound {
        /// Normalized page name.
        name: String,
    },

    /// Creating or renaming onto a name that is taken.
    #[error("page {name:?} already exists")]
    PageAlreadyExists {
        /// Normalized page name.
        name: String,
    },

    /// No user is stored under the id or email.
    #[error("user not found")]
    UserNotFound,

    /// The email is already registered.
    #[error("user already exists: {email:?}")]
    UserAlreadyExists {
        /// Normalized email.
        email: String,
    },

    /// Password check failed.
    #[error("wrong password")]
    InvalidPassword,

    /// Recovery code absent, expired or different.
    #[error("invalid recover code")]
    InvalidRecoverCode,

    /// Malformed input rejected before any write.
    #[error("validation failed: {message}")]
    Validation {
        /// What was wrong with the input.
        message: String,
    },

    /// Error from the store.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ServiceError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Returns `true` for commit conflicts.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Core(err) if err.is_conflict())
    }

    /// Returns `true` for rejected input, including writes in a read-only
    /// transaction.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        match self {
            Self::Validation { .. } => true,
            Self::Core(err) => err.is_validation(),
            _ => false,
        }
    }
}

impl ConflictError for ServiceError {
    fn is_conflict(&self) -> bool {
        ServiceError::is_conflict(self)
    }
}
