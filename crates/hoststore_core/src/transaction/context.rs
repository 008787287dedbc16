//! Transaction contexts.

use super::state::Transaction;
use crate::types::TransactionId;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::Arc;

/// Shared handle to an open transaction.
///
/// Cloning the handle does not start a new transaction; all clones drive
/// the same one.
#[derive(Clone)]
pub struct TxnHandle {
    inner: Arc<Mutex<Transaction>>,
    id: TransactionId,
    read_only: bool,
}

impl TxnHandle {
    pub(crate) fn new(txn: Transaction) -> Self {
        Self {
            id: txn.id(),
            read_only: txn.is_read_only(),
            inner: Arc::new(Mutex::new(txn)),
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns whether the transaction rejects writes.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Locks the transaction for one operation.
    ///
    /// The guard must not be held across calls back into the store.
    pub fn lock(&self) -> MutexGuard<'_, Transaction> {
        self.inner.lock()
    }
}

impl fmt::Debug for TxnHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxnHandle")
            .field("id", &self.id)
            .field("read_only", &self.read_only)
            .finish()
    }
}

/// The ambient state threaded through every store call.
///
/// A plain context carries no transaction; each store call on it runs in
/// its own single-operation transaction. [`Store::begin_transaction`]
/// returns a context that carries one. Only the context that started a
/// transaction (its owner) commits or rolls it back; contexts derived by
/// beginning again on a transactional context share the handle and pass
/// results straight through.
///
/// [`Store::begin_transaction`]: crate::Store::begin_transaction
#[derive(Debug, Clone, Default)]
pub struct Context {
    txn: Option<TxnHandle>,
    owner: bool,
}

impl Context {
    /// Creates a context without a transaction.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_transaction(handle: TxnHandle, owner: bool) -> Self {
        Self {
            txn: Some(handle),
            owner,
        }
    }

    /// The transaction carried by this context, if any.
    #[must_use]
    pub fn transaction(&self) -> Option<&TxnHandle> {
        self.txn.as_ref()
    }

    /// Whether this context carries a transaction.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.txn.is_some()
    }

    /// Whether this context started its transaction and so must end it.
    #[must_use]
    pub fn is_owner(&self) -> bool {
        self.owner && self.txn.is_some()
    }
}
