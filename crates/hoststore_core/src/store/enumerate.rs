//! Ordered prefix enumeration.

use super::Store;
use crate::error::{CoreError, CoreResult};
use crate::transaction::Context;
use bytes::Bytes;
use hoststore_codec::{decode, Record};
use std::ops::ControlFlow;

impl Store {
    /// Visits every live entry under `prefix` in ascending key order.
    ///
    /// Entries are fetched `batch_size` at a time from one snapshot; the
    /// visitor sees one continuous sequence. Expired entries are skipped.
    /// The visitor may stop early with [`ControlFlow::Break`].
    ///
    /// The transaction lock is not held while the visitor runs, so the
    /// visitor may call back into the store with the same context.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `batch_size` is zero, and otherwise
    /// the first error from the engine or the visitor.
    pub fn enumerate_raw<E, F>(
        &self,
        ctx: &Context,
        prefix: &str,
        batch_size: usize,
        mut visit: F,
    ) -> Result<(), E>
    where
        E: From<CoreError>,
        F: FnMut(&str, Bytes) -> Result<ControlFlow<()>, E>,
    {
        if batch_size == 0 {
            return Err(CoreError::validation("batch size must be positive").into());
        }

        self.transaction(ctx, true, |txn_ctx| -> Result<(), E> {
            let handle = txn_ctx
                .transaction()
                .ok_or_else(|| CoreError::invalid_operation("transaction context lost"))?;

            let mut after: Option<Vec<u8>> = None;
            loop {
                let batch = handle.lock().scan(prefix, after.as_deref(), batch_size)?;
                let exhausted = batch.len() < batch_size;

                for (key, value) in batch {
                    let text = std::str::from_utf8(&key).map_err(|_| {
                        CoreError::invalid_operation(format!("non-UTF-8 key under {prefix:?}"))
                    })?;
                    if visit(text, value)?.is_break() {
                        return Ok(());
                    }
                    after = Some(key);
                }

                if exhausted {
                    return Ok(());
                }
            }
        })
    }

    /// Visits every live record under `prefix`, decoded as `R`.
    ///
    /// # Errors
    ///
    /// Same as [`enumerate_raw`](Self::enumerate_raw), plus codec errors.
    pub fn enumerate_records<R, E, F>(
        &self,
        ctx: &Context,
        prefix: &str,
        batch_size: usize,
        mut visit: F,
    ) -> Result<(), E>
    where
        R: Record,
        E: From<CoreError>,
        F: FnMut(&str, R) -> Result<ControlFlow<()>, E>,
    {
        self.enumerate_raw(ctx, prefix, batch_size, |key, bytes| {
            let record: R = decode(&bytes).map_err(CoreError::from)?;
            visit(key, record)
        })
    }

    /// Collects the keys under `prefix` in ascending order.
    ///
    /// # Errors
    ///
    /// Same as [`enumerate_raw`](Self::enumerate_raw).
    pub fn keys_with_prefix(
        &self,
        ctx: &Context,
        prefix: &str,
        batch_size: usize,
    ) -> CoreResult<Vec<String>> {
        let mut keys = Vec::new();
        self.enumerate_raw(ctx, prefix, batch_size, |key, _| {
            keys.push(key.to_string());
            Ok::<_, CoreError>(ControlFlow::Continue(()))
        })?;
        Ok(keys)
    }

    /// Removes every key under `prefix` in one transaction.
    ///
    /// Returns how many keys were removed.
    ///
    /// # Errors
    ///
    /// Same as [`enumerate_raw`](Self::enumerate_raw), plus write errors.
    pub fn remove_prefix(
        &self,
        ctx: &Context,
        prefix: &str,
        batch_size: usize,
    ) -> CoreResult<usize> {
        self.transaction(ctx, false, |txn_ctx| -> CoreResult<usize> {
            let keys = self.keys_with_prefix(txn_ctx, prefix, batch_size)?;
            for key in &keys {
                self.remove(txn_ctx, key)?;
            }
            tracing::debug!(prefix, removed = keys.len(), "removed prefix");
            Ok(keys.len())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::Config;
    use crate::types::Ttl;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn seeded(keys: &[&str]) -> Store {
        let store = Store::open_in_memory();
        let ctx = Context::new();
        store
            .transaction(&ctx, false, |txn| {
                for key in keys {
                    store.set(txn, key, key.to_string(), None)?;
                }
                Ok::<_, CoreError>(())
            })
            .unwrap();
        store
    }

    fn collect(store: &Store, ctx: &Context, prefix: &str, batch: usize) -> Vec<String> {
        store.keys_with_prefix(ctx, prefix, batch).unwrap()
    }

    #[test]
    fn prefix_bounded_and_ascending() {
        let store = seeded(&["page:b", "page:a", "pages", "pag", "page:c", "user:x"]);
        assert_eq!(
            collect(&store, &Context::new(), "page:", 2),
            vec!["page:a", "page:b", "page:c"]
        );
    }

    #[test]
    fn batch_boundaries_are_invisible() {
        let keys: Vec<String> = (0..10).map(|i| format!("log:{i:02}")).collect();
        let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        let store = seeded(&refs);
        for batch in [1, 3, 5, 10, 64] {
            assert_eq!(collect(&store, &Context::new(), "log:", batch), keys);
        }
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let store = seeded(&["a"]);
        let result = store.enumerate_raw(&Context::new(), "", 0, |_, _| {
            Ok::<_, CoreError>(ControlFlow::Continue(()))
        });
        assert!(matches!(result, Err(CoreError::Validation { .. })));
    }

    #[test]
    fn visitor_can_stop_early() {
        let store = seeded(&["k:1", "k:2", "k:3"]);
        let mut seen = Vec::new();
        store
            .enumerate_raw(&Context::new(), "k:", 1, |key, _| {
                seen.push(key.to_string());
                Ok::<_, CoreError>(if seen.len() == 2 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                })
            })
            .unwrap();
        assert_eq!(seen, vec!["k:1", "k:2"]);
    }

    #[test]
    fn visitor_errors_propagate() {
        let store = seeded(&["k:1", "k:2"]);
        let result = store.enumerate_raw(&Context::new(), "k:", 8, |_, _| {
            Err::<ControlFlow<()>, _>(CoreError::validation("stop"))
        });
        assert!(matches!(result, Err(CoreError::Validation { .. })));
    }

    #[test]
    fn expired_entries_are_skipped() {
        let clock = Arc::new(ManualClock::default());
        let store = Store::in_memory_with(clock.clone(), Config::default());
        let ctx = Context::new();
        store.set(&ctx, "e:1", "a", None).unwrap();
        store.set(&ctx, "e:2", "b", Some(Ttl::from_secs(1))).unwrap();
        store.set(&ctx, "e:3", "c", None).unwrap();

        clock.advance(Duration::from_secs(1));
        assert_eq!(collect(&store, &ctx, "e:", 1), vec!["e:1", "e:3"]);
    }

    #[test]
    fn enumeration_sees_one_snapshot() {
        let store = seeded(&["s:1", "s:2"]);
        let ctx = store.begin_transaction(&Context::new(), true).unwrap();
        store.set(&Context::new(), "s:3", "late", None).unwrap();
        assert_eq!(collect(&store, &ctx, "s:", 1), vec!["s:1", "s:2"]);
        store.end_transaction(&ctx, Ok::<_, CoreError>(())).unwrap();
    }

    #[test]
    fn visitor_may_reenter_store() {
        let store = seeded(&["r:1", "r:2"]);
        let ctx = store.begin_transaction(&Context::new(), false).unwrap();
        store
            .enumerate_raw(&ctx, "r:", 1, |key, _| {
                store.set(&ctx, &format!("copy:{key}"), "x", None)?;
                Ok::<_, CoreError>(ControlFlow::Continue(()))
            })
            .unwrap();
        store.end_transaction(&ctx, Ok::<_, CoreError>(())).unwrap();
        assert_eq!(
            collect(&store, &Context::new(), "copy:", 8),
            vec!["copy:r:1", "copy:r:2"]
        );
    }

    #[test]
    fn remove_prefix_clears_only_that_namespace() {
        let store = seeded(&["u1:a", "u1:b", "u10:a", "u2:a"]);
        let removed = store.remove_prefix(&Context::new(), "u1:", 1).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(collect(&store, &Context::new(), "u", 8), vec!["u10:a", "u2:a"]);
    }

    proptest! {
        #[test]
        fn enumeration_matches_sorted_filter(
            keys in proptest::collection::btree_set("[a-c]{1,3}(:[a-c]{0,3})?", 0..40),
            prefix in "[a-c]{0,2}",
            batch in 1usize..7,
        ) {
            let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
            let store = seeded(&refs);
            let expected: Vec<String> = keys
                .iter()
                .filter(|k| k.starts_with(prefix.as_str()))
                .cloned()
                .collect();
            prop_assert_eq!(collect(&store, &Context::new(), &prefix, batch), expected);
        }
    }
}
