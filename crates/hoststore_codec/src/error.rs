//! Error types for the codec crate.

use crate::wire::WireType;
use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while decoding a record.
///
/// Encoding cannot fail: every in-memory record has a valid wire form.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Input ended in the middle of a field.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// A varint ran past ten bytes.
    #[error("varint overflow")]
    VarintOverflow,

    /// A field key carried a wire type this codec does not know.
    #[error("unknown wire type {0}")]
    UnknownWireType(u8),

    /// Field number zero or beyond the allowed range.
    #[error("invalid field number {0}")]
    InvalidFieldNumber(u64),

    /// A known field arrived with the wrong wire type.
    #[error("field {field}: expected {expected:?}, found {actual:?}")]
    WireTypeMismatch {
        /// Field number.
        field: u32,
        /// Wire type the schema declares.
        expected: WireType,
        /// Wire type found in the input.
        actual: WireType,
    },

    /// A string field was not valid UTF-8.
    #[error("field {field}: invalid UTF-8")]
    InvalidUtf8 {
        /// Field number.
        field: u32,
    },

    /// A field value does not fit its declared type.
    #[error("field {field}: value out of range")]
    OutOfRange {
        /// Field number.
        field: u32,
    },

    /// A length prefix claims more than the limit.
    #[error("length {claimed} exceeds limit {max_allowed}")]
    LengthLimitExceeded {
        /// Length found in the input.
        claimed: u64,
        /// Largest accepted length.
        max_allowed: u64,
    },
}
