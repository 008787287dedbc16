//! Error types for storage devices.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by a storage device.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A read extended past the end of the device.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// Requested offset.
        offset: u64,
        /// Requested length.
        len: usize,
        /// Current device size.
        size: u64,
    },

    /// Truncation was asked to grow the device.
    #[error("cannot truncate to {requested} bytes, device holds {size}")]
    InvalidTruncate {
        /// Requested size.
        requested: u64,
        /// Current device size.
        size: u64,
    },
}
