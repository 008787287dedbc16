//! Stress harnesses for optimistic concurrency.
//!
//! These run many threads of read-modify-write transactions against one
//! store and report how many commits and conflicts they saw.

use hoststore_core::{retry_on_conflict, Context, CoreError, CoreResult, Store};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Transactions that committed.
    pub committed: usize,
    /// Commit attempts rejected with a conflict.
    pub conflicts: usize,
    /// Transactions that gave up after exhausting their attempts.
    pub failed: usize,
    /// Total duration.
    pub duration: Duration,
}

impl StressTestResult {
    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Committed: {}", self.committed);
        println!("Conflicts: {}", self.conflicts);
        println!("Failed: {}", self.failed);
        println!("Duration: {:?}", self.duration);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of concurrent threads.
    pub threads: usize,
    /// Transactions each thread runs.
    pub operations_per_thread: usize,
    /// Attempts per transaction before giving up.
    pub max_attempts: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            operations_per_thread: 100,
            max_attempts: 1_000,
        }
    }
}

/// Reads a decimal counter; absent reads as zero.
pub fn read_counter(store: &Store, ctx: &Context, key: &str) -> CoreResult<u64> {
    match store.get(ctx, key)? {
        Some(bytes) => std::str::from_utf8(&bytes)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| CoreError::validation(format!("{key:?} is not a counter"))),
        None => Ok(0),
    }
}

/// Increments one counter from many threads.
///
/// Every increment is a read-modify-write transaction retried on
/// conflict, so the final counter equals `committed` when no update was
/// lost.
pub fn stress_counter_increments(store: &Store, key: &str, config: &StressConfig) -> StressTestResult {
    let committed = AtomicUsize::new(0);
    let conflicts = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let start = Instant::now();

    thread::scope(|scope| {
        for _ in 0..config.threads {
            scope.spawn(|| {
                for _ in 0..config.operations_per_thread {
                    let result = retry_on_conflict(config.max_attempts, |attempt| {
                        if attempt > 1 {
                            conflicts.fetch_add(1, Ordering::Relaxed);
                        }
                        store.transaction(&Context::new(), false, |txn| {
                            let current = read_counter(store, txn, key)?;
                            store.set(txn, key, (current + 1).to_string(), None)
                        })
                    });
                    match result {
                        Ok(()) => committed.fetch_add(1, Ordering::Relaxed),
                        Err(err) => {
                            if err.is_conflict() {
                                conflicts.fetch_add(1, Ordering::Relaxed);
                            }
                            failed.fetch_add(1, Ordering::Relaxed)
                        }
                    };
                }
            });
        }
    });

    StressTestResult {
        committed: committed.into_inner(),
        conflicts: conflicts.into_inner(),
        failed: failed.into_inner(),
        duration: start.elapsed(),
    }
}

/// Appends log entries under one prefix from many threads through the
/// monotonic keyer, retrying slot conflicts.
///
/// Returns the run summary and every key that was committed.
pub fn stress_log_appends(
    store: &Store,
    prefix: &str,
    config: &StressConfig,
) -> (StressTestResult, Vec<String>) {
    let conflicts = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let start = Instant::now();

    let keys: Vec<String> = thread::scope(|scope| {
        let handles: Vec<_> = (0..config.threads)
            .map(|thread_no| {
                let conflicts = &conflicts;
                let failed = &failed;
                scope.spawn(move || {
                    let mut keys = Vec::new();
                    for op in 0..config.operations_per_thread {
                        let result = retry_on_conflict(config.max_attempts, |attempt| {
                            if attempt > 1 {
                                conflicts.fetch_add(1, Ordering::Relaxed);
                            }
                            store.log_keyer().append::<_, CoreError, _>(
                                &Context::new(),
                                prefix,
                                |at| {
                                    hoststore_service::SecurityLogEntity::new(
                                        format!("t{thread_no}-{op}"),
                                        at.timestamp(),
                                        "",
                                        "",
                                    )
                                },
                            )
                        });
                        match result {
                            Ok(appended) => keys.push(appended.key),
                            Err(_) => {
                                failed.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    }
                    keys
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap_or_default())
            .collect()
    });

    let result = StressTestResult {
        committed: keys.len(),
        conflicts: conflicts.into_inner(),
        failed: failed.into_inner(),
        duration: start.elapsed(),
    };
    (result, keys)
}
