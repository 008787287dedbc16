//! Byte-level storage engine.
//!
//! The engine is the only component that touches raw bytes. It offers
//! point reads, upserts with optional expiry, removes and ordered prefix
//! scans, all inside optimistic transactions:
//!
//! - a transaction reads from the snapshot taken when it began
//! - writes are buffered in the transaction until commit
//! - commit fails with [`CommitOutcome::Conflict`] if any key it read,
//!   wrote or scanned (by prefix) was changed by a later commit
//! - no locks are held while the transaction body runs
//!
//! [`MvccEngine`] is the provided implementation. Anything implementing
//! [`KvEngine`] can stand in for it behind a [`Store`](crate::Store).

mod commit_log;
mod mvcc;

pub use commit_log::{CommitBatch, CommitLog, LogOp};
pub use mvcc::MvccEngine;

use crate::clock::Clock;
use crate::error::{CoreError, CoreResult};
use crate::types::{SequenceNumber, TransactionId};
use bytes::Bytes;
use std::sync::Arc;

/// One `(key, value)` pair returned by a scan.
pub type ScanEntry = (Vec<u8>, Bytes);

/// Result of trying to commit an engine transaction.
#[derive(Debug)]
pub enum CommitOutcome {
    /// All writes are visible, under this sequence number.
    Committed(SequenceNumber),
    /// An overlapping commit won; nothing was written.
    Conflict {
        /// The first key found to have moved.
        key: Vec<u8>,
    },
    /// The engine failed; nothing was written.
    Fatal(CoreError),
}

/// A storage engine that hands out optimistic transactions.
pub trait KvEngine: Send + Sync {
    /// Begins a transaction on the latest committed snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is unable to start a transaction.
    fn begin(&self, read_only: bool) -> CoreResult<Box<dyn EngineTxn>>;

    /// The clock used to evaluate expiry.
    fn clock(&self) -> Arc<dyn Clock>;

    /// The latest committed sequence number.
    fn committed_seq(&self) -> SequenceNumber;

    /// Reclaims space held by dead versions and expired entries.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting the compacted state fails.
    fn checkpoint(&self) -> CoreResult<()> {
        Ok(())
    }
}

/// An open engine transaction.
///
/// Dropping a transaction without committing discards its writes.
pub trait EngineTxn: Send {
    /// Transaction identifier.
    fn id(&self) -> TransactionId;

    /// The snapshot this transaction reads from.
    fn snapshot(&self) -> SequenceNumber;

    /// Whether writes are rejected.
    fn is_read_only(&self) -> bool;

    /// Reads a key, seeing this transaction's own pending writes.
    ///
    /// Expired entries read as `None`.
    fn get(&mut self, key: &[u8]) -> CoreResult<Option<Bytes>>;

    /// Buffers an upsert. `expires_at` is in milliseconds since the epoch.
    fn set(&mut self, key: &[u8], value: Bytes, expires_at: Option<u64>) -> CoreResult<()>;

    /// Buffers a delete. Deleting an absent key is not an error.
    fn remove(&mut self, key: &[u8]) -> CoreResult<()>;

    /// Returns up to `limit` live entries whose key starts with `prefix`,
    /// in ascending key order, strictly after `after` when given.
    fn scan(
        &mut self,
        prefix: &[u8],
        after: Option<&[u8]>,
        limit: usize,
    ) -> CoreResult<Vec<ScanEntry>>;

    /// Validates and applies the buffered writes.
    fn commit(self: Box<Self>) -> CommitOutcome;

    /// Discards the buffered writes.
    fn rollback(self: Box<Self>);
}
