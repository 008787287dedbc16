//! Caller-driven retry of conflicting transactions.

use crate::error::ConflictError;

/// Runs `attempt` until it succeeds, fails with a non-conflict error, or
/// has been tried `max_attempts` times.
///
/// `attempt` receives the 1-based attempt number and must run a whole
/// transaction, from begin to end, on each call. The store never retries
/// on its own; this helper is the explicit opt-in.
///
/// A `max_attempts` of zero is treated as one.
///
/// # Errors
///
/// Returns the last error from `attempt`.
///
/// # Example
///
/// ```
/// use hoststore_core::{retry_on_conflict, Context, CoreError, Store};
///
/// let store = Store::open_in_memory();
/// let ctx = Context::new();
/// let value = retry_on_conflict(3, |_attempt| {
///     store.transaction(&ctx, false, |txn| {
///         store.set(txn, "counter", "1", None)?;
///         Ok::<_, CoreError>(1)
///     })
/// })
/// .unwrap();
/// assert_eq!(value, 1);
/// ```
pub fn retry_on_conflict<T, E, F>(max_attempts: usize, mut attempt: F) -> Result<T, E>
where
    E: ConflictError,
    F: FnMut(usize) -> Result<T, E>,
{
    let max_attempts = max_attempts.max(1);
    let mut number = 1;
    loop {
        match attempt(number) {
            Err(err) if err.is_conflict() && number < max_attempts => {
                tracing::debug!(attempt = number, max_attempts, "retrying after conflict");
                number += 1;
            }
            result => return result,
        }
    }
}
