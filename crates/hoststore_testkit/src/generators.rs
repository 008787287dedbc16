//! Property-based test generators using proptest.
//!
//! Provides strategies for keys, values and operation sequences that
//! respect the store's key rules.

use hoststore_service::{PageEntity, SecurityLogEntity};
use proptest::prelude::*;

/// Strategy for one key segment: no separator, never empty.
pub fn key_segment_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9_-]{1,12}").expect("Invalid regex")
}

/// Strategy for keys of one to three segments under `prefix`.
pub fn key_strategy(prefix: &'static str) -> impl Strategy<Value = String> {
    prop::collection::vec(key_segment_strategy(), 1..=3)
        .prop_map(move |segments| format!("{prefix}{}", segments.join(":")))
}

/// Strategy for stored values (arbitrary bytes, possibly empty).
pub fn value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..256)
}

/// Strategy for optional TTLs in whole seconds.
pub fn ttl_secs_strategy() -> impl Strategy<Value = Option<u64>> {
    prop::option::of(1u64..=3_600)
}

/// A single write against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// Upsert a key.
    Set {
        /// Target key.
        key: String,
        /// New value.
        value: Vec<u8>,
    },
    /// Remove a key.
    Remove {
        /// Target key.
        key: String,
    },
}

impl StoreOp {
    /// The key the operation targets.
    pub fn key(&self) -> &str {
        match self {
            Self::Set { key, .. } | Self::Remove { key } => key,
        }
    }
}

/// Strategy for one write under `prefix`, drawn from a small key space so
/// operations collide.
pub fn store_op_strategy(prefix: &'static str) -> impl Strategy<Value = StoreOp> {
    let key = (0u8..16).prop_map(move |n| format!("{prefix}{n:02}"));
    prop_oneof![
        3 => (key.clone(), value_strategy()).prop_map(|(key, value)| StoreOp::Set { key, value }),
        1 => key.prop_map(|key| StoreOp::Remove { key }),
    ]
}

/// Strategy for operation sequences under `prefix`.
pub fn store_ops_strategy(
    prefix: &'static str,
    max_len: usize,
) -> impl Strategy<Value = Vec<StoreOp>> {
    prop::collection::vec(store_op_strategy(prefix), 0..max_len)
}

/// Strategy for raw page names, including case and punctuation the page
/// service normalizes away.
pub fn page_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z0-9_-]{1,16}( |:)?").expect("Invalid regex")
}

/// Strategy for page records with a non-empty name.
pub fn page_entity_strategy() -> impl Strategy<Value = PageEntity> {
    (
        prop::string::string_regex("[a-z0-9_-]{1,16}").expect("Invalid regex"),
        ".{0,32}",
        ".{0,128}",
        any::<bool>(),
        any::<i64>(),
    )
        .prop_map(|(name, title, content, html, created_at)| PageEntity {
            name,
            title,
            content,
            content_type: if html {
                hoststore_service::ContentType::Html
            } else {
                hoststore_service::ContentType::Markdown
            },
            created_at,
            ..PageEntity::default()
        })
}

/// Strategy for security events with a non-empty name.
pub fn security_event_strategy() -> impl Strategy<Value = SecurityLogEntity> {
    (
        prop::string::string_regex("[a-z-]{1,16}").expect("Invalid regex"),
        0i64..4_102_444_800,
        prop::string::string_regex("[0-9]{1,3}(\\.[0-9]{1,3}){3}").expect("Invalid regex"),
        ".{0,64}",
    )
        .prop_map(|(name, time, ip, agent)| SecurityLogEntity::new(name, time, ip, agent))
}
