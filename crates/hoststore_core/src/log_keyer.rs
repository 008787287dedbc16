//! Collision-free keys for append-only logs.
//!
//! Log entries are keyed by their UTC timestamp at millisecond precision,
//! so a prefix scan returns them in time order. Two writers in the same
//! millisecond would collide; the keyer resolves this by probing forward
//! one millisecond at a time until it finds a free slot. The probes are
//! reads in the caller's transaction, so two writers that pick the same
//! slot concurrently cannot both commit.

use crate::clock::Clock;
use crate::error::{CoreError, CoreResult};
use crate::store::Store;
use crate::transaction::Context;
use crate::types::Ttl;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use hoststore_codec::Record;

/// `strftime` pattern of log timestamps: `YYYY-MM-DD HH:MM:SS.mmm`.
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Formats `at` the way log keys embed it.
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(LOG_TIMESTAMP_FORMAT).to_string()
}

/// A log entry written by [`MonotonicKeyer::append`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Appended {
    /// Full key the entry was stored under.
    pub key: String,
    /// Timestamp of the slot, possibly later than the clock reading.
    pub at: DateTime<Utc>,
    /// Slots that were taken before a free one was found.
    pub probes: usize,
}

/// Appends records under a prefix at unique millisecond keys.
///
/// # Example
///
/// ```
/// use hoststore_core::{Context, CoreError, Store};
/// # use hoststore_codec::{CodecResult, Field, Record, RecordWriter, UnknownFields};
/// # #[derive(Default)]
/// # struct Event { name: String, unknown: UnknownFields }
/// # impl Record for Event {
/// #     fn identity(&self) -> &str { &self.name }
/// #     fn encode_fields(&self, w: &mut RecordWriter) { w.string(1, &self.name); }
/// #     fn merge_field(&mut self, f: &Field<'_>) -> CodecResult<bool> {
/// #         if f.number() == 1 { self.name = f.to_string_value()?; return Ok(true); }
/// #         Ok(false)
/// #     }
/// #     fn unknown_fields(&self) -> &UnknownFields { &self.unknown }
/// #     fn unknown_fields_mut(&mut self) -> &mut UnknownFields { &mut self.unknown }
/// # }
///
/// let store = Store::open_in_memory();
/// let ctx = Context::new();
/// let keyer = store.log_keyer();
///
/// let login = |_| Event { name: "login".into(), ..Default::default() };
/// let logout = |_| Event { name: "logout".into(), ..Default::default() };
///
/// let first = keyer.append::<_, CoreError, _>(&ctx, "u1:user:security-log:", login).unwrap();
/// let second = keyer.append::<_, CoreError, _>(&ctx, "u1:user:security-log:", logout).unwrap();
/// assert!(first.key < second.key);
/// ```
#[derive(Debug, Clone)]
pub struct MonotonicKeyer<'a> {
    store: &'a Store,
    ttl: Option<Ttl>,
    max_probes: usize,
}

impl Store {
    /// A keyer over this store using the configured probe budget.
    #[must_use]
    pub fn log_keyer(&self) -> MonotonicKeyer<'_> {
        MonotonicKeyer {
            store: self,
            ttl: None,
            max_probes: self.config().max_probes,
        }
    }
}

impl<'a> MonotonicKeyer<'a> {
    /// Sets the TTL applied to appended entries.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Option<Ttl>) -> Self {
        self.ttl = ttl;
        self
    }

    /// Overrides the probe budget.
    #[must_use]
    pub fn with_max_probes(mut self, max_probes: usize) -> Self {
        self.max_probes = max_probes;
        self
    }

    /// Writes the record built by `build` at the first free slot at or
    /// after the current time.
    ///
    /// `build` receives the slot's timestamp. Runs in the transaction
    /// `ctx` carries, or in a new one.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ProbeExhausted`] if no slot is free within the
    /// probe budget, and a conflict if a concurrent writer took the slot.
    pub fn append<R, E, F>(&self, ctx: &Context, prefix: &str, build: F) -> Result<Appended, E>
    where
        R: Record,
        E: From<CoreError>,
        F: FnOnce(DateTime<Utc>) -> R,
    {
        let store = self.store;
        store.transaction(ctx, false, |txn_ctx| -> Result<Appended, E> {
            let appended = self.find_slot(txn_ctx, prefix)?;
            let record = build(appended.at);
            store.set_record(txn_ctx, &appended.key, &record, self.ttl)?;
            if appended.probes > 0 {
                tracing::debug!(
                    key = %appended.key,
                    probes = appended.probes,
                    "log key collided, probed forward"
                );
            }
            Ok(appended)
        })
    }

    fn find_slot(&self, ctx: &Context, prefix: &str) -> CoreResult<Appended> {
        let mut at = self.store.clock().now();
        for probes in 0..self.max_probes {
            let key = format!("{prefix}{}", format_timestamp(at));
            if !self.store.exists(ctx, &key)? {
                return Ok(Appended { key, at, probes });
            }
            at += ChronoDuration::milliseconds(1);
        }
        Err(CoreError::ProbeExhausted {
            prefix: prefix.to_string(),
            attempts: self.max_probes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::Config;
    use hoststore_codec::{CodecResult, Field, RecordWriter, UnknownFields};
    use std::ops::ControlFlow;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Event {
        name: String,
        at_ms: i64,
        unknown: UnknownFields,
    }

    impl Record for Event {
        fn identity(&self) -> &str {
            &self.name
        }

        fn encode_fields(&self, w: &mut RecordWriter) {
            w.string(1, &self.name);
            w.int64(2, self.at_ms);
        }

        fn merge_field(&mut self, field: &Field<'_>) -> CodecResult<bool> {
            match field.number() {
                1 => self.name = field.to_string_value()?,
                2 => self.at_ms = field.as_i64()?,
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

    fn event(name: &str) -> impl FnOnce(DateTime<Utc>) -> Event + '_ {
        move |at| Event {
            name: name.to_string(),
            at_ms: at.timestamp_millis(),
            ..Event::default()
        }
    }

    fn frozen_store(config: Config) -> Store {
        Store::in_memory_with(Arc::new(ManualClock::at_millis(1_700_000_000_123)), config)
    }

    #[test]
    fn timestamp_format() {
        let at = ManualClock::at_millis(1_700_000_000_123).now();
        assert_eq!(format_timestamp(at), "2023-11-14 22:13:20.123");
    }

    #[test]
    fn same_millisecond_appends_get_distinct_ordered_keys() {
        let store = frozen_store(Config::default());
        let ctx = Context::new();
        let keyer = store.log_keyer();

        let keys: Vec<String> = (0..5)
            .map(|i| {
                keyer
                    .append::<_, CoreError, _>(&ctx, "u1:log:", event(&format!("e{i}")))
                    .unwrap()
                    .key
            })
            .collect();

        assert_eq!(keys[0], "u1:log:2023-11-14 22:13:20.123");
        assert_eq!(keys[4], "u1:log:2023-11-14 22:13:20.127");
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn builder_sees_probed_timestamp() {
        let store = frozen_store(Config::default());
        let ctx = Context::new();
        let keyer = store.log_keyer();
        keyer
            .append::<_, CoreError, _>(&ctx, "p:", event("a"))
            .unwrap();
        let second = keyer
            .append::<_, CoreError, _>(&ctx, "p:", event("b"))
            .unwrap();
        assert_eq!(second.probes, 1);

        let stored: Event = store.get_record(&ctx, &second.key).unwrap();
        assert_eq!(stored.at_ms, 1_700_000_000_124);
    }

    #[test]
    fn probe_budget_is_enforced() {
        let store = frozen_store(Config::default().max_probes(2));
        let ctx = Context::new();
        let keyer = store.log_keyer();
        keyer.append::<_, CoreError, _>(&ctx, "p:", event("a")).unwrap();
        keyer.append::<_, CoreError, _>(&ctx, "p:", event("b")).unwrap();

        let err = keyer
            .append::<_, CoreError, _>(&ctx, "p:", event("c"))
            .unwrap_err();
        assert!(matches!(err, CoreError::ProbeExhausted { attempts: 2, .. }));
    }

    #[test]
    fn appends_in_one_transaction_see_each_other() {
        let store = frozen_store(Config::default());
        let ctx = store.begin_transaction(&Context::new(), false).unwrap();
        let keyer = store.log_keyer();
        for name in ["a", "b", "c"] {
            keyer.append::<_, CoreError, _>(&ctx, "t:", event(name)).unwrap();
        }
        store.end_transaction(&ctx, Ok::<_, CoreError>(())).unwrap();

        let mut names = Vec::new();
        store
            .enumerate_records(&Context::new(), "t:", 2, |_, e: Event| {
                names.push(e.name);
                Ok::<_, CoreError>(ControlFlow::Continue(()))
            })
            .unwrap();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn concurrent_writers_of_same_slot_conflict() {
        let store = frozen_store(Config::default());
        let keyer = store.log_keyer();
        let a = store.begin_transaction(&Context::new(), false).unwrap();
        let b = store.begin_transaction(&Context::new(), false).unwrap();

        let ka = keyer.append::<_, CoreError, _>(&a, "c:", event("a")).unwrap();
        let kb = keyer.append::<_, CoreError, _>(&b, "c:", event("b")).unwrap();
        assert_eq!(ka.key, kb.key);

        store.end_transaction(&a, Ok::<_, CoreError>(())).unwrap();
        let err = store.end_transaction(&b, Ok::<_, CoreError>(())).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn ttl_applies_to_appended_entries() {
        let clock = Arc::new(ManualClock::default());
        let store = Store::in_memory_with(clock.clone(), Config::default());
        let ctx = Context::new();
        let appended = store
            .log_keyer()
            .with_ttl(Some(Ttl::from_secs(10)))
            .append::<_, CoreError, _>(&ctx, "ttl:", event("x"))
            .unwrap();

        clock.advance(Duration::from_secs(10));
        assert!(!store.exists(&ctx, &appended.key).unwrap());
    }
}
