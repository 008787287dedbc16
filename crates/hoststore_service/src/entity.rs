//! Stored records and request types.
//!
//! Each stored record names its identity field; the store checks it
//! against the key discriminator on every checked read.

use hoststore_codec::{CodecResult, Field, Record, RecordWriter, UnknownFields};

/// Markup language of a page body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ContentType {
    /// Markdown source.
    #[default]
    Markdown,
    /// Raw HTML.
    Html,
    /// A wire value this version does not know, kept so it re-encodes
    /// unchanged. Never produced by [`parse`](Self::parse).
    Unknown(i32),
}

impl ContentType {
    /// Parses `MARKDOWN` or `HTML`, ignoring case and surrounding space.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "MARKDOWN" => Some(Self::Markdown),
            "HTML" => Some(Self::Html),
            _ => None,
        }
    }

    /// Wire value.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::Markdown => 0,
            Self::Html => 1,
            Self::Unknown(value) => value,
        }
    }

    /// Maps a wire value back; unrecognised values become [`Self::Unknown`].
    #[must_use]
    pub const fn from_i32(value: i32) -> Self {
        match value {
            0 => Self::Markdown,
            1 => Self::Html,
            other => Self::Unknown(other),
        }
    }

    /// Canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Markdown => "MARKDOWN",
            Self::Html => "HTML",
            Self::Unknown(_) => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Implements the unknown-field accessors for a record with an
/// `unknown: UnknownFields` member.
macro_rules! unknown_fields_impl {
    () => {
        fn unknown_fields(&self) -> &UnknownFields {
            &self.unknown
        }

        fn unknown_fields_mut(&mut self) -> &mut UnknownFields {
            &mut self.unknown
        }
    };
}

/// A CMS page, stored at `page:<name>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageEntity {
    /// Normalized page name; the identity.
    pub name: String,
    /// Display title.
    pub title: String,
    /// Page body.
    pub content: String,
    /// Markup of `content`.
    pub content_type: ContentType,
    /// Creation time, epoch seconds.
    pub created_at: i64,
    pub unknown: UnknownFields,
}

impl Record for PageEntity {
    fn identity(&self) -> &str {
        &self.name
    }

    fn encode_fields(&self, w: &mut RecordWriter) {
        w.string(1, &self.name);
        w.string(2, &self.title);
        w.string(3, &self.content);
        w.enumeration(4, self.content_type.as_i32());
        w.int64(5, self.created_at);
    }

    fn merge_field(&mut self, field: &Field<'_>) -> CodecResult<bool> {
        match field.number() {
            1 => self.name = field.to_string_value()?,
            2 => self.title = field.to_string_value()?,
            3 => self.content = field.to_string_value()?,
            4 => self.content_type = ContentType::from_i32(field.as_enum()?),
            5 => self.created_at = field.as_i64()?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    unknown_fields_impl!();
}

/// Page create/update request as submitted by an administrator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminPage {
    /// Target page name.
    pub name: String,
    /// Previous name when renaming; empty otherwise.
    pub prev: String,
    /// Display title.
    pub title: String,
    /// Page body.
    pub content: String,
    /// `MARKDOWN` or `HTML`.
    pub content_type: String,
}

/// One security event, stored at `<userId>:user:security-log:<UTC ts>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityLogEntity {
    /// Event name; the identity.
    pub event_name: String,
    /// Event time, epoch seconds of the key's slot.
    pub event_time: i64,
    /// Client address.
    pub remote_ip: String,
    /// Client user agent.
    pub user_agent: String,
    unknown: UnknownFields,
}

impl SecurityLogEntity {
    /// Creates an event record.
    #[must_use]
    pub fn new(
        event_name: impl Into<String>,
        event_time: i64,
        remote_ip: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            event_name: event_name.into(),
            event_time,
            remote_ip: remote_ip.into(),
            user_agent: user_agent.into(),
            unknown: UnknownFields::new(),
        }
    }
}

impl Record for SecurityLogEntity {
    fn identity(&self) -> &str {
        &self.event_name
    }

    fn encode_fields(&self, w: &mut RecordWriter) {
        w.string(1, &self.event_name);
        w.int64(2, self.event_time);
        w.string(3, &self.remote_ip);
        w.string(4, &self.user_agent);
    }

    fn merge_field(&mut self, field: &Field<'_>) -> CodecResult<bool> {
        match field.number() {
            1 => self.event_name = field.to_string_value()?,
            2 => self.event_time = field.as_i64()?,
            3 => self.remote_ip = field.to_string_value()?,
            4 => self.user_agent = field.to_string_value()?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    unknown_fields_impl!();
}

/// A user account, stored at `user:<userId>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserEntity {
    /// Normalized user id; the identity.
    pub user_id: String,
    /// Given name.
    pub first_name: String,
    /// Middle name.
    pub middle_name: String,
    /// Family name.
    pub last_name: String,
    /// Normalized email; also indexed at `email:<email>`.
    pub email: String,
    /// Opaque output of the configured password hasher.
    pub password_hash: String,
    /// Granted roles.
    pub roles: Vec<String>,
    /// Creation time, epoch seconds.
    pub created_at: i64,
    pub(crate) unknown: UnknownFields,
}

impl Record for UserEntity {
    fn identity(&self) -> &str {
        &self.user_id
    }

    fn encode_fields(&self, w: &mut RecordWriter) {
        w.string(1, &self.user_id);
        w.string(2, &self.first_name);
        w.string(3, &self.middle_name);
        w.string(4, &self.last_name);
        w.string(5, &self.email);
        w.string(6, &self.password_hash);
        for role in &self.roles {
            w.repeated_string(7, role);
        }
        w.int64(8, self.created_at);
    }

    fn merge_field(&mut self, field: &Field<'_>) -> CodecResult<bool> {
        match field.number() {
            1 => self.user_id = field.to_string_value()?,
            2 => self.first_name = field.to_string_value()?,
            3 => self.middle_name = field.to_string_value()?,
            4 => self.last_name = field.to_string_value()?,
            5 => self.email = field.to_string_value()?,
            6 => self.password_hash = field.to_string_value()?,
            7 => self.roles.push(field.to_string_value()?),
            8 => self.created_at = field.as_i64()?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    unknown_fields_impl!();
}

/// Email index entry, stored at `email:<email>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmailIndexEntity {
    /// Normalized email; the identity.
    pub email: String,
    /// Owner of the email.
    pub user_id: String,
    unknown: UnknownFields,
}

impl EmailIndexEntity {
    /// Creates an index entry.
    #[must_use]
    pub fn new(email: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            user_id: user_id.into(),
            unknown: UnknownFields::new(),
        }
    }
}

impl Record for EmailIndexEntity {
    fn identity(&self) -> &str {
        &self.email
    }

    fn encode_fields(&self, w: &mut RecordWriter) {
        w.string(1, &self.email);
        w.string(2, &self.user_id);
    }

    fn merge_field(&mut self, field: &Field<'_>) -> CodecResult<bool> {
        match field.number() {
            1 => self.email = field.to_string_value()?,
            2 => self.user_id = field.to_string_value()?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    unknown_fields_impl!();
}

/// A password recovery code, stored at `recover:<email>` with a TTL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoverCodeEntity {
    /// Normalized email; the identity.
    pub email: String,
    /// The code sent to the user.
    pub code: String,
    /// Creation time, epoch seconds.
    pub created_at: i64,
    unknown: UnknownFields,
}

impl RecoverCodeEntity {
    /// Creates a recovery code record.
    #[must_use]
    pub fn new(email: impl Into<String>, code: impl Into<String>, created_at: i64) -> Self {
        Self {
            email: email.into(),
            code: code.into(),
            created_at,
            unknown: UnknownFields::new(),
        }
    }
}

impl Record for RecoverCodeEntity {
    fn identity(&self) -> &str {
        &self.email
    }

    fn encode_fields(&self, w: &mut RecordWriter) {
        w.string(1, &self.email);
        w.string(2, &self.code);
        w.int64(3, self.created_at);
    }

    fn merge_field(&mut self, field: &Field<'_>) -> CodecResult<bool> {
        match field.number() {
            1 => self.email = field.to_string_value()?,
            2 => self.code = field.to_string_value()?,
            3 => self.created_at = field.as_i64()?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    unknown_fields_impl!();
}

/// Self-registration request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterRequest {
    /// Given name.
    pub first_name: String,
    /// Middle name.
    pub middle_name: String,
    /// Family name.
    pub last_name: String,
    /// Email, normalized on registration.
    pub email: String,
    /// Clear-text password, hashed before storage.
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoststore_codec::{decode, encode};

    #[test]
    fn content_type_parse() {
        assert_eq!(ContentType::parse(" html "), Some(ContentType::Html));
        assert_eq!(ContentType::parse("Markdown"), Some(ContentType::Markdown));
        assert_eq!(ContentType::parse("pdf"), None);
        assert_eq!(ContentType::parse(""), None);
    }

    #[test]
    fn page_roundtrip() {
        let page = PageEntity {
            name: "faq".into(),
            title: "FAQ".into(),
            content: "# Questions".into(),
            content_type: ContentType::Html,
            created_at: 1_700_000_000,
            ..PageEntity::default()
        };
        assert_eq!(decode::<PageEntity>(&encode(&page)).unwrap(), page);
    }

    #[test]
    fn unknown_content_type_reencodes_unchanged() {
        let mut w = RecordWriter::new();
        w.string(1, "faq");
        w.enumeration(4, 7);
        let bytes = w.into_bytes();

        let page: PageEntity = decode(&bytes).unwrap();
        assert_eq!(page.content_type, ContentType::Unknown(7));
        assert_eq!(page.content_type.as_str(), "UNKNOWN");
        assert_eq!(encode(&page), bytes);
        assert_eq!(ContentType::parse("unknown"), None);
    }

    #[test]
    fn user_roles_keep_order() {
        let user = UserEntity {
            user_id: "u1".into(),
            roles: vec!["USER".into(), "ADMIN".into()],
            ..UserEntity::default()
        };
        let decoded: UserEntity = decode(&encode(&user)).unwrap();
        assert_eq!(decoded.roles, vec!["USER", "ADMIN"]);
    }

    #[test]
    fn empty_bytes_are_absent_records() {
        assert!(decode::<UserEntity>(&[]).unwrap().identity().is_empty());
        assert!(decode::<SecurityLogEntity>(&[]).unwrap().identity().is_empty());
        assert!(decode::<RecoverCodeEntity>(&[]).unwrap().identity().is_empty());
    }

    #[test]
    fn user_record_survives_older_reader() {
        let full = UserEntity {
            user_id: "u1".into(),
            email: "a@b.c".into(),
            created_at: 5,
            ..UserEntity::default()
        };
        let index: EmailIndexEntity = decode(&encode(&full)).unwrap();
        assert_eq!(index.email, "u1");
        let back: UserEntity = decode(&encode(&index)).unwrap();
        assert_eq!(back, UserEntity { unknown: back.unknown.clone(), ..full });
    }
}
