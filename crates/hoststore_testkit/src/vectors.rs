//! Test vectors for key layout, log timestamps and record encoding.
//!
//! Anything else reading a hoststore log must agree with these.

use serde::{Deserialize, Serialize};

/// A key built from a template and arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyVector {
    /// Unique identifier for this vector.
    pub id: String,
    /// printf-style template.
    pub template: String,
    /// Arguments, already normalized.
    pub args: Vec<String>,
    /// Expected key, or `None` if the template must be rejected.
    pub expected: Option<String>,
}

/// A log key timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampVector {
    /// Unique identifier for this vector.
    pub id: String,
    /// Milliseconds since the Unix epoch.
    pub millis: i64,
    /// Expected rendering.
    pub expected: String,
}

/// An encoded page record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageVector {
    /// Unique identifier for this vector.
    pub id: String,
    /// Page name.
    pub name: String,
    /// Page title.
    pub title: String,
    /// `true` for HTML content.
    pub html: bool,
    /// Creation time, epoch seconds.
    pub created_at: i64,
    /// Expected encoding (hex).
    pub expected_hex: String,
}

/// Key construction vectors.
pub fn key_vectors() -> Vec<KeyVector> {
    let key = |id: &str, template: &str, args: &[&str], expected: Option<&str>| KeyVector {
        id: id.into(),
        template: template.into(),
        args: args.iter().map(|a| a.to_string()).collect(),
        expected: expected.map(Into::into),
    };
    vec![
        key("page", "page:%s", &["faq"], Some("page:faq")),
        key("user", "user:%s", &["u1"], Some("user:u1")),
        key(
            "security_log_prefix",
            "%s:user:security-log:",
            &["u1"],
            Some("u1:user:security-log:"),
        ),
        key("email", "email:%s", &["a@b.c"], Some("email:a@b.c")),
        key("numeric", "counter:%d", &["42"], Some("counter:42")),
        key("literal_percent", "100%%:%s", &["x"], Some("100%:x")),
        key("too_few_args", "%s:%s", &["a"], None),
        key("too_many_args", "page:%s", &["a", "b"], None),
        key("unknown_placeholder", "page:%x", &["a"], None),
    ]
}

/// Log timestamp vectors.
pub fn timestamp_vectors() -> Vec<TimestampVector> {
    let ts = |id: &str, millis: i64, expected: &str| TimestampVector {
        id: id.into(),
        millis,
        expected: expected.into(),
    };
    vec![
        ts("epoch", 0, "1970-01-01 00:00:00.000"),
        ts("fixture", 1_700_000_000_000, "2023-11-14 22:13:20.000"),
        ts("millis", 1_700_000_000_123, "2023-11-14 22:13:20.123"),
        ts("leap_day", 1_709_164_800_001, "2024-02-29 00:00:00.001"),
    ]
}

/// Page encoding vectors.
pub fn page_vectors() -> Vec<PageVector> {
    vec![
        PageVector {
            id: "empty".into(),
            name: String::new(),
            title: String::new(),
            html: false,
            created_at: 0,
            expected_hex: String::new(),
        },
        PageVector {
            id: "name_only".into(),
            name: "faq".into(),
            title: String::new(),
            html: false,
            created_at: 0,
            expected_hex: "0a03666171".into(),
        },
        PageVector {
            id: "html_with_time".into(),
            name: "faq".into(),
            title: "FAQ".into(),
            html: true,
            created_at: 300,
            expected_hex: "0a036661711203464151200128ac02".into(),
        },
    ]
}

/// Renders bytes as lowercase hex.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Generate all test vectors as JSON.
pub fn all_vectors_json() -> String {
    let vectors = AllTestVectors {
        keys: key_vectors(),
        timestamps: timestamp_vectors(),
        pages: page_vectors(),
    };

    serde_json::to_string_pretty(&vectors).expect("Failed to serialize vectors")
}

#[derive(Debug, Serialize, Deserialize)]
struct AllTestVectors {
    keys: Vec<KeyVector>,
    timestamps: Vec<TimestampVector>,
    pages: Vec<PageVector>,
}
