//! Record writer.

use crate::unknown::UnknownFields;
use crate::wire::{field_key, put_varint, zigzag_encode, WireType};
use crate::Record;

/// Encodes a record to bytes.
///
/// Known fields are written in the order the record emits them, followed
/// by any unknown fields retained from an earlier decode.
#[must_use]
pub fn encode<R: Record>(record: &R) -> Vec<u8> {
    let mut writer = RecordWriter::new();
    record.encode_fields(&mut writer);
    writer.unknown(record.unknown_fields());
    writer.into_bytes()
}

/// Accumulates tagged fields.
///
/// Scalar fields holding their default value (zero, `false`, empty) are
/// skipped, so a record with nothing set encodes to an empty buffer and an
/// empty buffer decodes back to the default record.
#[derive(Debug, Default)]
pub struct RecordWriter {
    buffer: Vec<u8>,
}

impl RecordWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a writer with room for `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Consumes the writer and returns the encoded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Returns the bytes written so far.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Writes an unsigned integer field.
    pub fn uint64(&mut self, field: u32, value: u64) {
        if value != 0 {
            self.key(field, WireType::Varint);
            put_varint(&mut self.buffer, value);
        }
    }

    /// Writes an unsigned 32-bit field.
    pub fn uint32(&mut self, field: u32, value: u32) {
        self.uint64(field, u64::from(value));
    }

    /// Writes a signed integer field as a plain two's-complement varint.
    ///
    /// Matches protobuf `int64`; use [`sint64`](Self::sint64) for values
    /// that are often negative.
    pub fn int64(&mut self, field: u32, value: i64) {
        self.uint64(field, value as u64);
    }

    /// Writes a signed integer field with zigzag encoding.
    pub fn sint64(&mut self, field: u32, value: i64) {
        self.uint64(field, zigzag_encode(value));
    }

    /// Writes an enum discriminant.
    pub fn enumeration(&mut self, field: u32, value: i32) {
        self.int64(field, i64::from(value));
    }

    /// Writes a boolean field.
    pub fn bool(&mut self, field: u32, value: bool) {
        self.uint64(field, u64::from(value));
    }

    /// Writes a fixed-width 64-bit field.
    pub fn fixed64(&mut self, field: u32, value: u64) {
        if value != 0 {
            self.key(field, WireType::Fixed64);
            self.buffer.extend_from_slice(&value.to_le_bytes());
        }
    }

    /// Writes a string field.
    pub fn string(&mut self, field: u32, value: &str) {
        self.bytes(field, value.as_bytes());
    }

    /// Writes a byte-string field.
    pub fn bytes(&mut self, field: u32, value: &[u8]) {
        if !value.is_empty() {
            self.length_delimited(field, value);
        }
    }

    /// Writes an embedded record.
    ///
    /// Unlike scalars, an embedded record is always written, even when it
    /// encodes to nothing, so its presence survives a round trip.
    pub fn message<R: Record>(&mut self, field: u32, value: &R) {
        let nested = encode(value);
        self.length_delimited(field, &nested);
    }

    /// Writes one element of a repeated string field.
    ///
    /// Empty elements are kept, since they are positional.
    pub fn repeated_string(&mut self, field: u32, value: &str) {
        self.length_delimited(field, value.as_bytes());
    }

    /// Appends retained unknown fields verbatim.
    pub fn unknown(&mut self, fields: &UnknownFields) {
        self.buffer.extend_from_slice(fields.as_bytes());
    }

    fn length_delimited(&mut self, field: u32, value: &[u8]) {
        self.key(field, WireType::LengthDelimited);
        put_varint(&mut self.buffer, value.len() as u64);
        self.buffer.extend_from_slice(value);
    }

    fn key(&mut self, field: u32, wire_type: WireType) {
        put_varint(&mut self.buffer, field_key(field, wire_type));
    }
}
