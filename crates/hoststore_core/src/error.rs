//! Error types for hoststore core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core operations.
///
/// A missing key is never an error: reads return `None` or the record's
/// default value instead.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage device error.
    #[error("storage error: {0}")]
    Storage(#[from] hoststore_storage::StorageError),

    /// Record codec error.
    #[error("codec error: {0}")]
    Codec(#[from] hoststore_codec::CodecError),

    /// Another transaction committed an overlapping change first.
    ///
    /// The only error kind callers are expected to retry, by re-running the
    /// whole transaction body.
    #[error("concurrent transaction conflict on key {key:?}")]
    Conflict {
        /// The key whose version moved past this transaction's snapshot.
        key: String,
    },

    /// A stored record's identity disagrees with the key it was read from.
    #[error("db integrity: key {key:?} holds record {identity:?}")]
    Integrity {
        /// Key that was read.
        key: String,
        /// Identity found in the record.
        identity: String,
    },

    /// Malformed input rejected before touching the store.
    #[error("validation failed: {message}")]
    Validation {
        /// What was wrong with the input.
        message: String,
    },

    /// A write was issued inside a read-only transaction.
    ///
    /// Classed as a validation failure: [`is_validation`](Self::is_validation)
    /// is `true` for it, and it is raised before the engine is touched.
    #[error("write to {key:?} in a read-only transaction")]
    ReadOnly {
        /// Key the write targeted.
        key: String,
    },

    /// The commit log failed verification during recovery.
    #[error("commit log corruption at offset {offset}: {message}")]
    LogCorruption {
        /// Byte offset of the bad record.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// A commit failed and its partial record could not be removed from
    /// the log. No further commits are accepted until a checkpoint
    /// rewrites the log.
    #[error("commit log poisoned by a failed append; checkpoint to recover")]
    LogPoisoned,

    /// The monotonic keyer found no free slot within its probe budget.
    #[error("no free log slot under {prefix:?} after {attempts} probes")]
    ProbeExhausted {
        /// Prefix that was being probed.
        prefix: String,
        /// Number of slots tried.
        attempts: usize,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Why the operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a conflict error.
    pub fn conflict(key: impl Into<String>) -> Self {
        Self::Conflict { key: key.into() }
    }

    /// Creates an integrity error.
    pub fn integrity(key: impl Into<String>, identity: impl Into<String>) -> Self {
        Self::Integrity {
            key: key.into(),
            identity: identity.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a log corruption error.
    pub fn log_corruption(offset: u64, message: impl Into<String>) -> Self {
        Self::LogCorruption {
            offset,
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns `true` for optimistic-concurrency conflicts.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Returns `true` for input rejected before touching the store:
    /// [`Validation`](Self::Validation) and [`ReadOnly`](Self::ReadOnly).
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::ReadOnly { .. })
    }

    /// Returns `true` for errors that mean the stored data cannot be trusted.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Storage(_)
                | Self::Integrity { .. }
                | Self::LogCorruption { .. }
                | Self::LogPoisoned
        )
    }
}

/// Errors that can tell whether they stem from a commit conflict.
///
/// Lets [`retry_on_conflict`](crate::retry_on_conflict) work with service
/// error types that wrap [`CoreError`].
pub trait ConflictError {
    /// Returns `true` if retrying the whole transaction may succeed.
    fn is_conflict(&self) -> bool;
}

impl ConflictError for CoreError {
    fn is_conflict(&self) -> bool {
        CoreError::is_conflict(self)
    }
}
