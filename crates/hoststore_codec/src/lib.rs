//! # hoststore Codec
//!
//! Tagged-field encoding for the records kept in a hoststore.
//!
//! Records are encoded as a sequence of `key | payload` fields using the
//! protobuf wire format:
//!
//! - every field is identified by a number, never by its position
//! - payloads are varints, fixed-width words or length-prefixed bytes
//! - fields holding their default value are omitted
//! - fields unknown to the reader are retained and written back verbatim
//!
//! Decoding an empty buffer yields the record's default value. Stores use
//! that to represent "no such record" without an error: a caller checks
//! whether [`Record::identity`] is empty.
//!
//! ## Usage
//!
//! ```
//! use hoststore_codec::{decode, encode, CodecResult, Field, Record, RecordWriter, UnknownFields};
//!
//! #[derive(Debug, Default, PartialEq)]
//! struct Tag {
//!     name: String,
//!     uses: u64,
//!     unknown: UnknownFields,
//! }
//!
//! impl Record for Tag {
//!     fn identity(&self) -> &str {
//!         &self.name
//!     }
//!
//!     fn encode_fields(&self, w: &mut RecordWriter) {
//!         w.string(1, &self.name);
//!         w.uint64(2, self.uses);
//!     }
//!
//!     fn merge_field(&mut self, field: &Field<'_>) -> CodecResult<bool> {
//!         match field.number() {
//!             1 => self.name = field.to_string_value()?,
//!             2 => self.uses = field.as_u64()?,
//!             _ => return Ok(false),
//!         }
//!         Ok(true)
//!     }
//!
//!     fn unknown_fields(&self) -> &UnknownFields {
//!         &self.unknown
//!     }
//!
//!     fn unknown_fields_mut(&mut self) -> &mut UnknownFields {
//!         &mut self.unknown
//!     }
//! }
//!
//! let tag = Tag { name: "rust".into(), uses: 3, ..Tag::default() };
//! let bytes = encode(&tag);
//! assert_eq!(decode::<Tag>(&bytes).unwrap(), tag);
//! assert!(decode::<Tag>(&[]).unwrap().identity().is_empty());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod unknown;
pub mod wire;

pub use decoder::{decode, Field, FieldValue, RecordReader};
pub use encoder::{encode, RecordWriter};
pub use error::{CodecError, CodecResult};
pub use unknown::UnknownFields;
pub use wire::WireType;

/// A typed value that can be stored in a hoststore.
///
/// `Default` is the canonical absent record: every field zero or empty and
/// [`identity`](Record::identity) empty.
pub trait Record: Default {
    /// The record's identity field.
    ///
    /// Empty only for the absent record. Stores compare it against the key
    /// a record was read from to detect integrity faults.
    fn identity(&self) -> &str;

    /// Writes every known field.
    fn encode_fields(&self, writer: &mut RecordWriter);

    /// Applies one decoded field.
    ///
    /// Returns `Ok(false)` for field numbers the schema does not know; the
    /// decoder then keeps the field in [`unknown_fields_mut`](Record::unknown_fields_mut).
    ///
    /// # Errors
    ///
    /// Returns an error if a known field has the wrong wire type or an
    /// invalid payload.
    fn merge_field(&mut self, field: &Field<'_>) -> CodecResult<bool>;

    /// Fields retained from the last decode.
    fn unknown_fields(&self) -> &UnknownFields;

    /// Mutable access to the retained fields.
    fn unknown_fields_mut(&mut self) -> &mut UnknownFields;
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct NoteV1 {
        id: String,
        body: String,
        created: i64,
        unknown: UnknownFields,
    }

    impl Record for NoteV1 {
        fn identity(&self) -> &str {
            &self.id
        }

        fn encode_fields(&self, w: &mut RecordWriter) {
            w.string(1, &self.id);
            w.string(2, &self.body);
            w.int64(3, self.created);
        }

        fn merge_field(&mut self, field: &Field<'_>) -> CodecResult<bool> {
            match field.number() {
                1 => self.id = field.to_string_value()?,
                2 => self.body = field.to_string_value()?,
                3 => self.created = field.as_i64()?,
                _ => return Ok(false),
            }
            Ok(true)
        }

        fn unknown_fields(&self) -> &UnknownFields {
            &self.unknown
        }

        fn unknown_fields_mut(&mut self) -> &mut UnknownFields {
            &mut self.unknown
        }
    }

    /// A later schema of the same record with two extra fields.
    #[derive(Debug, Clone, Default, PartialEq)]
    struct NoteV2 {
        id: String,
        body: String,
        created: i64,
        pinned: bool,
        tags: Vec<String>,
        unknown: UnknownFields,
    }

    impl Record for NoteV2 {
        fn identity(&self) -> &str {
            &self.id
        }

        fn encode_fields(&self, w: &mut RecordWriter) {
            w.string(1, &self.id);
            w.string(2, &self.body);
            w.int64(3, self.created);
            w.bool(4, self.pinned);
            for tag in &self.tags {
                w.repeated_string(5, tag);
            }
        }

        fn merge_field(&mut self, field: &Field<'_>) -> CodecResult<bool> {
            match field.number() {
                1 => self.id = field.to_string_value()?,
                2 => self.body = field.to_string_value()?,
                3 => self.created = field.as_i64()?,
                4 => self.pinned = field.as_bool()?,
                5 => self.tags.push(field.to_string_value()?),
                _ => return Ok(false),
            }
            Ok(true)
        }

        fn unknown_fields(&self) -> &UnknownFields {
            &self.unknown
        }

        fn unknown_fields_mut(&mut self) -> &mut UnknownFields {
            &mut self.unknown
        }
    }

    #[derive(Debug, Default, PartialEq)]
    struct Envelope {
        name: String,
        note: Option<NoteV1>,
        unknown: UnknownFields,
    }

    impl Record for Envelope {
        fn identity(&self) -> &str {
            &self.name
        }

        fn encode_fields(&self, w: &mut RecordWriter) {
            w.string(1, &self.name);
            if let Some(note) = &self.note {
                w.message(2, note);
            }
        }

        fn merge_field(&mut self, field: &Field<'_>) -> CodecResult<bool> {
            match field.number() {
                1 => self.name = field.to_string_value()?,
                2 => self.note = Some(field.as_message()?),
                _ => return Ok(false),
            }
            Ok(true)
        }

        fn unknown_fields(&self) -> &UnknownFields {
            &self.unknown
        }

        fn unknown_fields_mut(&mut self) -> &mut UnknownFields {
            &mut self.unknown
        }
    }

    #[test]
    fn empty_input_is_absent_record() {
        let note: NoteV1 = decode(&[]).unwrap();
        assert_eq!(note, NoteV1::default());
        assert!(note.identity().is_empty());
    }

    #[test]
    fn default_record_encodes_to_nothing() {
        assert!(encode(&NoteV1::default()).is_empty());
    }

    #[test]
    fn partially_populated_roundtrip() {
        let note = NoteV1 {
            id: "n1".into(),
            created: -5,
            ..NoteV1::default()
        };
        assert_eq!(decode::<NoteV1>(&encode(&note)).unwrap(), note);
    }

    #[test]
    fn encoding_is_deterministic() {
        let note = NoteV1 {
            id: "n1".into(),
            body: "hello".into(),
            created: 1_700_000_000,
            ..NoteV1::default()
        };
        assert_eq!(encode(&note), encode(&note.clone()));
    }

    #[test]
    fn older_schema_preserves_newer_fields() {
        let newer = NoteV2 {
            id: "n1".into(),
            body: "draft".into(),
            created: 10,
            pinned: true,
            tags: vec!["a".into(), "".into(), "b".into()],
            ..NoteV2::default()
        };

        let mut older: NoteV1 = decode(&encode(&newer)).unwrap();
        assert!(!older.unknown_fields().is_empty());
        older.body = "edited".into();

        let reread: NoteV2 = decode(&encode(&older)).unwrap();
        assert_eq!(reread.body, "edited");
        assert!(reread.pinned);
        assert_eq!(reread.tags, newer.tags);
        assert!(reread.unknown_fields().is_empty());
    }

    #[test]
    fn nested_record_roundtrip() {
        let env = Envelope {
            name: "box".into(),
            note: Some(NoteV1::default()),
            ..Envelope::default()
        };
        let decoded: Envelope = decode(&encode(&env)).unwrap();
        assert_eq!(decoded, env);
    }

    #[test]
    fn wrong_wire_type_for_known_field_fails() {
        let mut w = RecordWriter::new();
        w.uint64(1, 5);
        assert!(matches!(
            decode::<NoteV1>(&w.into_bytes()),
            Err(CodecError::WireTypeMismatch { field: 1, .. })
        ));
    }

    #[test]
    fn field_order_does_not_matter() {
        let mut w = RecordWriter::new();
        w.int64(3, 42);
        w.string(1, "late-id");
        let note: NoteV1 = decode(&w.into_bytes()).unwrap();
        assert_eq!(note.id, "late-id");
        assert_eq!(note.created, 42);
    }

    proptest! {
        #[test]
        fn roundtrip_any_note(
            id in ".{0,24}",
            body in ".{0,64}",
            created in any::<i64>(),
        ) {
            let note = NoteV1 { id, body, created, ..NoteV1::default() };
            prop_assert_eq!(decode::<NoteV1>(&encode(&note)).unwrap(), note);
        }

        #[test]
        fn decoding_garbage_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..128)) {
            let _ = decode::<NoteV2>(&bytes);
        }
    }
}
