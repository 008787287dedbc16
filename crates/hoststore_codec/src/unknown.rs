//! Retention of fields a record's schema does not know.

use crate::decoder::Field;

/// Raw encoded fields carried through a decode/encode cycle untouched.
///
/// A record written by a newer schema may carry fields an older reader
/// does not recognise. Keeping their bytes means the older reader can
/// update the record without erasing them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnknownFields {
    bytes: Vec<u8>,
}

impl UnknownFields {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Retains `field` exactly as it was encoded.
    pub fn push(&mut self, field: &Field<'_>) {
        self.bytes.extend_from_slice(field.raw());
    }

    /// Returns `true` if nothing was retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Drops every retained field.
    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    /// Returns the retained bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}
