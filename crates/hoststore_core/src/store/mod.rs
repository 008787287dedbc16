//! The transactional store.
//!
//! [`Store`] is the typed face of the engine. Every call takes a
//! [`Context`]; calls on a context without a transaction run in a
//! transaction of their own, calls on a transactional context join it.

mod enumerate;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::engine::{KvEngine, MvccEngine};
use crate::error::{CoreError, CoreResult};
use crate::key::validate_key;
use crate::transaction::{Context, Transaction, TxnHandle};
use crate::types::Ttl;
use bytes::Bytes;
use hoststore_codec::{decode, encode, Record};
use hoststore_storage::{FileBackend, StorageBackend};
use std::path::Path;
use std::sync::Arc;

/// Transactional, TTL-aware, prefix-enumerable key-value store.
///
/// Cheap to clone; clones share the engine.
///
/// # Example
///
/// ```
/// use hoststore_core::{Context, Store};
///
/// let store = Store::open_in_memory();
/// let ctx = Context::new();
///
/// let txn = store.begin_transaction(&ctx, false).unwrap();
/// let result = store.set(&txn, "page:faq", "hello", None);
/// store.end_transaction(&txn, result).unwrap();
///
/// assert_eq!(store.get(&ctx, "page:faq").unwrap().as_deref(), Some(&b"hello"[..]));
/// ```
#[derive(Clone)]
pub struct Store {
    engine: Arc<dyn KvEngine>,
    config: Config,
}

impl Store {
    /// Creates a store over any engine.
    pub fn new(engine: Arc<dyn KvEngine>, config: Config) -> Self {
        Self { engine, config }
    }

    /// Creates a non-durable store on the system clock.
    #[must_use]
    pub fn open_in_memory() -> Self {
        Self::in_memory_with(Arc::new(SystemClock), Config::default())
    }

    /// Creates a non-durable store with the given clock and configuration.
    #[must_use]
    pub fn in_memory_with(clock: Arc<dyn Clock>, config: Config) -> Self {
        let engine = MvccEngine::in_memory(clock, &config);
        Self::new(Arc::new(engine), config)
    }

    /// Opens a durable store whose commit log lives at `path`.
    ///
    /// Missing parent directories are created.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or its log is corrupt.
    pub fn open(path: impl AsRef<Path>, config: Config) -> CoreResult<Self> {
        let backend = FileBackend::open_with_create_dirs(path.as_ref())?;
        Self::open_with_backend(Box::new(backend), Arc::new(SystemClock), config)
    }

    /// Opens a durable store over an arbitrary backend.
    ///
    /// # Errors
    ///
    /// Returns an error if replaying the backend's log fails.
    pub fn open_with_backend(
        backend: Box<dyn StorageBackend>,
        clock: Arc<dyn Clock>,
        config: Config,
    ) -> CoreResult<Self> {
        let engine = MvccEngine::open(backend, clock, &config)?;
        Ok(Self::new(Arc::new(engine), config))
    }

    /// The store configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The underlying engine.
    #[must_use]
    pub fn engine(&self) -> &Arc<dyn KvEngine> {
        &self.engine
    }

    /// The clock used for expiry and log keys.
    #[must_use]
    pub fn clock(&self) -> Arc<dyn Clock> {
        self.engine.clock()
    }

    /// Reclaims dead versions and expired entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the compacted log cannot be written.
    pub fn checkpoint(&self) -> CoreResult<()> {
        self.engine.checkpoint()
    }

    /// Begins a transaction, or joins the one `ctx` already carries.
    ///
    /// A joined transaction keeps its original mode; `read_only` only
    /// applies to new transactions.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot start a transaction.
    pub fn begin_transaction(&self, ctx: &Context, read_only: bool) -> CoreResult<Context> {
        if let Some(handle) = ctx.transaction() {
            return Ok(Context::with_transaction(handle.clone(), false));
        }

        let txn = Transaction::new(self.engine.begin(read_only)?);
        tracing::debug!(
            txn = %txn.id(),
            snapshot = txn.snapshot_seq().as_u64(),
            read_only,
            "began transaction"
        );
        Ok(Context::with_transaction(TxnHandle::new(txn), true))
    }

    /// Ends the transaction of a context returned by
    /// [`begin_transaction`](Self::begin_transaction).
    ///
    /// `Err` rolls back and is returned unchanged. `Ok` commits; a failed
    /// commit (a [`CoreError::Conflict`] in particular) replaces the value.
    /// A context that joined an outer transaction passes `result` through.
    ///
    /// # Errors
    ///
    /// Returns `result`'s error, or the commit error converted into `E`.
    pub fn end_transaction<T, E>(&self, ctx: &Context, result: Result<T, E>) -> Result<T, E>
    where
        E: From<CoreError>,
    {
        let Some(handle) = ctx.transaction() else {
            return result;
        };
        if !ctx.is_owner() {
            return result;
        }

        let mut txn = handle.lock();
        match result {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = txn.rollback() {
                    tracing::warn!(
                        txn = %txn.id(),
                        error = %rollback_err,
                        "rollback of finished transaction"
                    );
                }
                Err(err)
            }
        }
    }

    /// Runs `body` inside a transaction and ends it with the body's result.
    ///
    /// Joins the transaction `ctx` carries, if any.
    ///
    /// # Errors
    ///
    /// Returns the body's error, or a begin/commit error converted into `E`.
    pub fn transaction<T, E, F>(&self, ctx: &Context, read_only: bool, body: F) -> Result<T, E>
    where
        E: From<CoreError>,
        F: FnOnce(&Context) -> Result<T, E>,
    {
        let txn_ctx = self.begin_transaction(ctx, read_only)?;
        let result = body(&txn_ctx);
        self.end_transaction(&txn_ctx, result)
    }

    /// Runs one operation on the context's transaction, or on a fresh one.
    fn with_txn<T>(
        &self,
        ctx: &Context,
        read_only: bool,
        op: impl FnOnce(&mut Transaction) -> CoreResult<T>,
    ) -> CoreResult<T> {
        if let Some(handle) = ctx.transaction() {
            return op(&mut handle.lock());
        }
        let txn_ctx = self.begin_transaction(ctx, read_only)?;
        let result = match txn_ctx.transaction() {
            Some(handle) => op(&mut handle.lock()),
            None => Err(CoreError::invalid_operation("transaction context lost")),
        };
        self.end_transaction(&txn_ctx, result)
    }

    fn expires_at(&self, ttl: Option<Ttl>) -> CoreResult<Option<u64>> {
        match ttl {
            None => Ok(None),
            Some(ttl) if ttl.as_secs() == 0 => Err(CoreError::validation("ttl must be positive")),
            Some(ttl) => Ok(Some(
                self.engine.clock().now_millis().saturating_add(ttl.as_millis()),
            )),
        }
    }

    /// Reads a key. Absent and expired keys read as `None`.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty key or an engine fault.
    pub fn get(&self, ctx: &Context, key: &str) -> CoreResult<Option<Bytes>> {
        validate_key(key)?;
        self.with_txn(ctx, true, |txn| txn.get(key))
    }

    /// Whether a live entry exists at `key`.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get).
    pub fn exists(&self, ctx: &Context, key: &str) -> CoreResult<bool> {
        Ok(self.get(ctx, key)?.is_some())
    }

    /// Upserts a key, replacing both value and expiry.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty key or a zero TTL,
    /// [`CoreError::ReadOnly`] inside a read-only transaction, and a
    /// conflict if the implicit transaction loses.
    pub fn set(
        &self,
        ctx: &Context,
        key: &str,
        value: impl Into<Bytes>,
        ttl: Option<Ttl>,
    ) -> CoreResult<()> {
        validate_key(key)?;
        let expires_at = self.expires_at(ttl)?;
        let value = value.into();
        self.with_txn(ctx, false, |txn| txn.set(key, value, expires_at))
    }

    /// Removes a key. Removing an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Same as [`set`](Self::set).
    pub fn remove(&self, ctx: &Context, key: &str) -> CoreResult<()> {
        validate_key(key)?;
        self.with_txn(ctx, false, |txn| txn.remove(key))
    }

    /// Reads and decodes a record; absent keys decode as `R::default()`.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the stored bytes do not decode.
    pub fn get_record<R: Record>(&self, ctx: &Context, key: &str) -> CoreResult<R> {
        match self.get(ctx, key)? {
            Some(bytes) => Ok(decode(&bytes)?),
            None => Ok(R::default()),
        }
    }

    /// Reads a record and checks it is stored under its own identity.
    ///
    /// Returns `None` when the record is absent (empty identity).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Integrity`] if the identity found differs from
    /// `expected_identity`.
    pub fn get_checked<R: Record>(
        &self,
        ctx: &Context,
        key: &str,
        expected_identity: &str,
    ) -> CoreResult<Option<R>> {
        let record: R = self.get_record(ctx, key)?;
        let identity = record.identity();
        if identity.is_empty() {
            return Ok(None);
        }
        if identity != expected_identity {
            tracing::error!(key, identity, expected = expected_identity, "db integrity violation");
            return Err(CoreError::integrity(key, identity));
        }
        Ok(Some(record))
    }

    /// Encodes and upserts a record.
    ///
    /// # Errors
    ///
    /// Same as [`set`](Self::set).
    pub fn set_record<R: Record>(
        &self,
        ctx: &Context,
        key: &str,
        record: &R,
        ttl: Option<Ttl>,
    ) -> CoreResult<()> {
        self.set(ctx, key, encode(record), ttl)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("committed", &self.engine.committed_seq())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
