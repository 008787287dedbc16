//! Transaction state.

use crate::engine::{CommitOutcome, EngineTxn, ScanEntry};
use crate::error::{CoreError, CoreResult};
use crate::types::{SequenceNumber, TransactionId};
use bytes::Bytes;

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can perform operations.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been rolled back or lost a conflict.
    Aborted,
}

/// An engine transaction plus its lifecycle state.
///
/// Once committed or aborted, every operation fails with
/// [`CoreError::InvalidOperation`].
pub struct Transaction {
    inner: Option<Box<dyn EngineTxn>>,
    id: TransactionId,
    snapshot_seq: SequenceNumber,
    read_only: bool,
    state: TransactionState,
    write_count: usize,
}

impl Transaction {
    pub(crate) fn new(inner: Box<dyn EngineTxn>) -> Self {
        Self {
            id: inner.id(),
            snapshot_seq: inner.snapshot(),
            read_only: inner.is_read_only(),
            inner: Some(inner),
            state: TransactionState::Active,
            write_count: 0,
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the snapshot sequence number.
    #[must_use]
    pub fn snapshot_seq(&self) -> SequenceNumber {
        self.snapshot_seq
    }

    /// Returns whether writes are rejected.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Checks if the transaction is still active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Number of set and remove calls so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.write_count
    }

    fn engine(&mut self) -> CoreResult<&mut (dyn EngineTxn + 'static)> {
        match (self.state, self.inner.as_deref_mut()) {
            (TransactionState::Active, Some(inner)) => Ok(inner),
            (state, _) => Err(CoreError::invalid_operation(format!(
                "{} is {state:?}",
                self.id
            ))),
        }
    }

    fn ensure_writable(&self, key: &str) -> CoreResult<()> {
        if self.read_only {
            return Err(CoreError::ReadOnly {
                key: key.to_string(),
            });
        }
        Ok(())
    }

    /// Reads a key from the snapshot, seeing this transaction's writes.
    pub fn get(&mut self, key: &str) -> CoreResult<Option<Bytes>> {
        self.engine()?.get(key.as_bytes())
    }

    /// Buffers an upsert.
    pub fn set(&mut self, key: &str, value: Bytes, expires_at: Option<u64>) -> CoreResult<()> {
        self.ensure_writable(key)?;
        self.engine()?.set(key.as_bytes(), value, expires_at)?;
        self.write_count += 1;
        Ok(())
    }

    /// Buffers a delete.
    pub fn remove(&mut self, key: &str) -> CoreResult<()> {
        self.ensure_writable(key)?;
        self.engine()?.remove(key.as_bytes())?;
        self.write_count += 1;
        Ok(())
    }

    /// Reads one batch of live entries under `prefix`.
    pub fn scan(
        &mut self,
        prefix: &str,
        after: Option<&[u8]>,
        limit: usize,
    ) -> CoreResult<Vec<ScanEntry>> {
        self.engine()?.scan(prefix.as_bytes(), after, limit)
    }

    pub(crate) fn commit(&mut self) -> CoreResult<SequenceNumber> {
        self.engine()?;
        let Some(inner) = self.inner.take() else {
            return Err(CoreError::invalid_operation("transaction already finished"));
        };

        match inner.commit() {
            CommitOutcome::Committed(seq) => {
                self.state = TransactionState::Committed;
                tracing::debug!(
                    txn = %self.id,
                    seq = seq.as_u64(),
                    writes = self.write_count,
                    "committed transaction"
                );
                Ok(seq)
            }
            CommitOutcome::Conflict { key } => {
                self.state = TransactionState::Aborted;
                let key = String::from_utf8_lossy(&key).into_owned();
                tracing::warn!(txn = %self.id, key = %key, "commit conflict");
                Err(CoreError::conflict(key))
            }
            CommitOutcome::Fatal(err) => {
                self.state = TransactionState::Aborted;
                tracing::error!(txn = %self.id, error = %err, "commit failed");
                Err(err)
            }
        }
    }

    pub(crate) fn rollback(&mut self) -> CoreResult<()> {
        self.engine()?;
        if let Some(inner) = self.inner.take() {
            inner.rollback();
        }
        self.state = TransactionState::Aborted;
        tracing::debug!(txn = %self.id, "rolled back transaction");
        Ok(())
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("snapshot_seq", &self.snapshot_seq)
            .field("read_only", &self.read_only)
            .field("state", &self.state)
            .field("write_count", &self.write_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::Config;
    use crate::engine::{KvEngine, MvccEngine};
    use std::sync::Arc;

    fn engine() -> MvccEngine {
        MvccEngine::in_memory(Arc::new(ManualClock::default()), &Config::default())
    }

    #[test]
    fn commit_moves_to_committed() {
        let engine = engine();
        let mut txn = Transaction::new(engine.begin(false).unwrap());
        assert!(txn.is_active());
        txn.set("k", Bytes::from_static(b"v"), None).unwrap();
        assert_eq!(txn.write_count(), 1);

        let seq = txn.commit().unwrap();
        assert_eq!(seq.as_u64(), 1);
        assert_eq!(txn.state(), TransactionState::Committed);
    }

    #[test]
    fn finished_transaction_rejects_operations() {
        let engine = engine();
        let mut txn = Transaction::new(engine.begin(false).unwrap());
        txn.rollback().unwrap();
        assert_eq!(txn.state(), TransactionState::Aborted);

        assert!(matches!(
            txn.get("k"),
            Err(CoreError::InvalidOperation { .. })
        ));
        assert!(matches!(
            txn.commit(),
            Err(CoreError::InvalidOperation { .. })
        ));
        assert!(txn.rollback().is_err());
    }

    #[test]
    fn read_only_write_fails_before_engine() {
        let engine = engine();
        let mut txn = Transaction::new(engine.begin(true).unwrap());
        let err = txn.set("page:faq", Bytes::new(), None).unwrap_err();
        assert!(matches!(err, CoreError::ReadOnly { ref key } if key == "page:faq"));
        assert_eq!(txn.write_count(), 0);
        assert!(txn.is_active());
    }

    #[test]
    fn conflict_aborts() {
        let engine = engine();
        let mut a = Transaction::new(engine.begin(false).unwrap());
        let mut b = Transaction::new(engine.begin(false).unwrap());
        a.set("k", Bytes::from_static(b"a"), None).unwrap();
        b.set("k", Bytes::from_static(b"b"), None).unwrap();
        a.commit().unwrap();

        let err = b.commit().unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(b.state(), TransactionState::Aborted);
    }
}
