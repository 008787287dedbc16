//! Transactions and the contexts that carry them.
//!
//! Transactions are optimistic: nothing is locked while one runs, and the
//! commit is rejected with a conflict if anything it read, wrote or
//! scanned changed after its snapshot was taken. Isolation is snapshot
//! isolation plus read-set validation, so committed histories are
//! serializable.

mod context;
mod state;

pub use context::{Context, TxnHandle};
pub use state::{Transaction, TransactionState};
