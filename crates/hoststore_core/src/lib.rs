//! # hoststore core
//!
//! Transactional key-value access layer for hoststore.
//!
//! This crate provides:
//! - An optimistic, multi-version storage engine with a durable commit log
//! - Transactions carried through calls in a [`Context`]
//! - Typed record reads and writes with per-entry TTL
//! - Ordered, batched prefix enumeration
//! - Collision-free timestamp keys for append-only logs
//!
//! ## Transactions
//!
//! ```
//! use hoststore_core::{Context, CoreError, Store};
//!
//! let store = Store::open_in_memory();
//! let ctx = Context::new();
//!
//! store
//!     .transaction(&ctx, false, |txn| {
//!         store.set(txn, "page:old", "", None)?;
//!         store.remove(txn, "page:old")?;
//!         store.set(txn, "page:new", "content", None)
//!     })
//!     .unwrap();
//!
//! assert!(store.exists(&ctx, "page:new").unwrap());
//! assert!(!store.exists(&ctx, "page:old").unwrap());
//! # Ok::<(), CoreError>(())
//! ```
//!
//! A commit is rejected with [`CoreError::Conflict`] if another
//! transaction committed a change to anything this one read, wrote or
//! enumerated. Nothing is retried automatically; wrap the whole
//! transaction in [`retry_on_conflict`] to retry.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod config;
mod engine;
mod error;
mod key;
mod log_keyer;
mod retry;
mod store;
mod transaction;
mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use engine::{
    CommitBatch, CommitLog, CommitOutcome, EngineTxn, KvEngine, LogOp, MvccEngine, ScanEntry,
};
pub use error::{ConflictError, CoreError, CoreResult};
pub use key::{format_key, validate_key, SEPARATOR};
pub use log_keyer::{format_timestamp, Appended, MonotonicKeyer, LOG_TIMESTAMP_FORMAT};
pub use retry::retry_on_conflict;
pub use store::Store;
pub use transaction::{Context, Transaction, TransactionState, TxnHandle};
pub use types::{SequenceNumber, TransactionId, Ttl};

// Re-exported so callers can name record types without a direct dependency.
pub use hoststore_codec::{Record, UnknownFields};
