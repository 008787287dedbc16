//! Record reader.

use crate::error::{CodecError, CodecResult};
use crate::wire::{get_varint, zigzag_decode, WireType, MAX_FIELD_NUMBER};
use crate::Record;

/// Largest length prefix accepted for a single field.
///
/// Keeps a corrupted prefix from turning into a huge allocation.
const MAX_FIELD_LENGTH: u64 = 64 * 1024 * 1024;

/// Decodes a record from bytes.
///
/// Empty input yields `R::default()`, the canonical absent record. Fields
/// the record does not claim are kept in its unknown-field set.
///
/// # Errors
///
/// Returns an error if the input is truncated, uses an unknown wire type,
/// or a known field fails to parse.
pub fn decode<R: Record>(bytes: &[u8]) -> CodecResult<R> {
    let mut record = R::default();
    let mut reader = RecordReader::new(bytes);
    while let Some(field) = reader.next_field()? {
        if !record.merge_field(&field)? {
            record.unknown_fields_mut().push(&field);
        }
    }
    Ok(record)
}

/// Payload of a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue<'a> {
    /// Varint payload.
    Varint(u64),
    /// Fixed 64-bit payload.
    Fixed64(u64),
    /// Fixed 32-bit payload.
    Fixed32(u32),
    /// Length-delimited payload.
    Bytes(&'a [u8]),
}

impl FieldValue<'_> {
    /// Returns the wire type this payload was read with.
    #[must_use]
    pub fn wire_type(&self) -> WireType {
        match self {
            Self::Varint(_) => WireType::Varint,
            Self::Fixed64(_) => WireType::Fixed64,
            Self::Fixed32(_) => WireType::Fixed32,
            Self::Bytes(_) => WireType::LengthDelimited,
        }
    }
}

/// A decoded field, borrowing from the input buffer.
#[derive(Debug, Clone, Copy)]
pub struct Field<'a> {
    number: u32,
    value: FieldValue<'a>,
    raw: &'a [u8],
}

impl<'a> Field<'a> {
    /// Field number.
    #[must_use]
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Field payload.
    #[must_use]
    pub fn value(&self) -> FieldValue<'a> {
        self.value
    }

    /// The complete encoded field, key included.
    #[must_use]
    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }

    /// Reads the field as an unsigned varint.
    pub fn as_u64(&self) -> CodecResult<u64> {
        match self.value {
            FieldValue::Varint(v) => Ok(v),
            _ => Err(self.mismatch(WireType::Varint)),
        }
    }

    /// Reads the field as an unsigned 32-bit varint.
    pub fn as_u32(&self) -> CodecResult<u32> {
        u32::try_from(self.as_u64()?).map_err(|_| CodecError::OutOfRange {
            field: self.number,
        })
    }

    /// Reads the field as a two's-complement `int64`.
    pub fn as_i64(&self) -> CodecResult<i64> {
        Ok(self.as_u64()? as i64)
    }

    /// Reads the field as a zigzag `sint64`.
    pub fn as_sint64(&self) -> CodecResult<i64> {
        Ok(zigzag_decode(self.as_u64()?))
    }

    /// Reads the field as an enum discriminant.
    pub fn as_enum(&self) -> CodecResult<i32> {
        i32::try_from(self.as_i64()?).map_err(|_| CodecError::OutOfRange {
            field: self.number,
        })
    }

    /// Reads the field as a boolean.
    pub fn as_bool(&self) -> CodecResult<bool> {
        Ok(self.as_u64()? != 0)
    }

    /// Reads the field as a fixed 64-bit value.
    pub fn as_fixed64(&self) -> CodecResult<u64> {
        match self.value {
            FieldValue::Fixed64(v) => Ok(v),
            _ => Err(self.mismatch(WireType::Fixed64)),
        }
    }

    /// Reads the field as raw bytes.
    pub fn as_bytes(&self) -> CodecResult<&'a [u8]> {
        match self.value {
            FieldValue::Bytes(b) => Ok(b),
            _ => Err(self.mismatch(WireType::LengthDelimited)),
        }
    }

    /// Reads the field as a UTF-8 string.
    pub fn as_str(&self) -> CodecResult<&'a str> {
        std::str::from_utf8(self.as_bytes()?).map_err(|_| CodecError::InvalidUtf8 {
            field: self.number,
        })
    }

    /// Reads the field as an owned string.
    pub fn to_string_value(&self) -> CodecResult<String> {
        self.as_str().map(str::to_owned)
    }

    /// Decodes the field as an embedded record.
    pub fn as_message<R: Record>(&self) -> CodecResult<R> {
        decode(self.as_bytes()?)
    }

    fn mismatch(&self, expected: WireType) -> CodecError {
        CodecError::WireTypeMismatch {
            field: self.number,
            expected,
            actual: self.value.wire_type(),
        }
    }
}

/// Iterates over the fields of an encoded record.
pub struct RecordReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> RecordReader<'a> {
    /// Creates a reader over `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Returns `true` once every byte has been consumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Reads the next field, or `None` at the end of input.
    pub fn next_field(&mut self) -> CodecResult<Option<Field<'a>>> {
        if self.is_empty() {
            return Ok(None);
        }

        let start = self.pos;
        let key = self.varint()?;
        let wire_type = WireType::from_bits((key & 0x07) as u8)?;
        let number = key >> 3;
        if number == 0 || number > u64::from(MAX_FIELD_NUMBER) {
            return Err(CodecError::InvalidFieldNumber(number));
        }

        let value = match wire_type {
            WireType::Varint => FieldValue::Varint(self.varint()?),
            WireType::Fixed64 => {
                let bytes = self.take(8)?;
                let mut buf = [0u8; 8];
                buf.copy_from_slice(bytes);
                FieldValue::Fixed64(u64::from_le_bytes(buf))
            }
            WireType::Fixed32 => {
                let bytes = self.take(4)?;
                let mut buf = [0u8; 4];
                buf.copy_from_slice(bytes);
                FieldValue::Fixed32(u32::from_le_bytes(buf))
            }
            WireType::LengthDelimited => {
                let len = self.varint()?;
                if len > MAX_FIELD_LENGTH {
                    return Err(CodecError::LengthLimitExceeded {
                        claimed: len,
                        max_allowed: MAX_FIELD_LENGTH,
                    });
                }
                FieldValue::Bytes(self.take(len as usize)?)
            }
        };

        Ok(Some(Field {
            number: number as u32,
            value,
            raw: &self.data[start..self.pos],
        }))
    }

    fn varint(&mut self) -> CodecResult<u64> {
        let (value, len) = get_varint(&self.data[self.pos..])?;
        self.pos += len;
        Ok(value)
    }

    fn take(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(CodecError::UnexpectedEof)?;
        if end > self.data.len() {
            return Err(CodecError::UnexpectedEof);
        }
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }
}
