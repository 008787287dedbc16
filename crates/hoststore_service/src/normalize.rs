//! Input normalization applied before any key is built.
//!
//! Normalized values never contain the `:` namespace separator, so a
//! caller-supplied id cannot reach into another key namespace.

/// Keeps ASCII letters and digits only.
#[must_use]
pub fn normalize_user_id(user_id: &str) -> String {
    user_id.chars().filter(char::is_ascii_alphanumeric).collect()
}

/// Lowercases and keeps ASCII letters, digits, `-` and `_`.
#[must_use]
pub fn normalize_identity(value: &str) -> String {
    value
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-' || *c == '_')
        .collect()
}

/// Page names follow the identity rules.
#[must_use]
pub fn normalize_page_id(page_id: &str) -> String {
    normalize_identity(page_id)
}

/// Trims, lowercases and strips `:`.
///
/// Whitespace exposed by removing a `:` is kept, so `"a : "` becomes
/// `"a "`. Stored email keys depend on this order.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase().replace(':', "")
}

/// Trims and strips `:`.
#[must_use]
pub fn normalize_field(value: &str) -> String {
    value.trim().replace(':', "")
}

/// Trims and strips `:`.
#[must_use]
pub fn normalize_code(code: &str) -> String {
    normalize_field(code)
}
