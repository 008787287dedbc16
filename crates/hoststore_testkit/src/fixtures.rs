//! Test fixtures and store helpers.
//!
//! Every fixture runs on a [`ManualClock`], so TTL and log-key tests control
//! time explicitly.

use hoststore_core::{Config, ManualClock, Store};
use hoststore_service::{PageService, SecurityLogService, ServiceConfig, UserService};
use hoststore_storage::FileBackend;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// Start time of fixture clocks: 2023-11-14 22:13:20 UTC.
pub const FIXTURE_EPOCH_MILLIS: i64 = 1_700_000_000_000;

const LOG_FILE: &str = "hoststore.log";

/// A test store with automatic cleanup.
pub struct TestStore {
    /// The store instance.
    pub store: Store,
    /// The clock the store reads.
    pub clock: Arc<ManualClock>,
    config: Config,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates an in-memory store.
    pub fn memory() -> Self {
        Self::memory_with(Config::default())
    }

    /// Creates an in-memory store with `config`.
    pub fn memory_with(config: Config) -> Self {
        let clock = Arc::new(ManualClock::at_millis(FIXTURE_EPOCH_MILLIS));
        Self {
            store: Store::in_memory_with(clock.clone(), config.clone()),
            clock,
            config,
            _temp_dir: None,
        }
    }

    /// Creates a store whose commit log lives in a temporary directory.
    pub fn file() -> Self {
        Self::file_with(Config::default())
    }

    /// Creates a file-backed store with `config`.
    pub fn file_with(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let clock = Arc::new(ManualClock::at_millis(FIXTURE_EPOCH_MILLIS));
        let store = open_file_store(&temp_dir.path().join(LOG_FILE), clock.clone(), &config);
        Self {
            store,
            clock,
            config,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Returns the commit log path if file-based, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self._temp_dir.as_ref().map(|d| d.path().join(LOG_FILE))
    }

    /// Closes and reopens a file-backed store, replaying its log.
    ///
    /// The clock carries over. Panics for in-memory stores.
    pub fn reopen(self) -> Self {
        let path = self.path().expect("Only file stores can be reopened");
        let Self {
            store,
            clock,
            config,
            _temp_dir,
        } = self;
        drop(store);
        let store = open_file_store(&path, clock.clone(), &config);
        Self {
            store,
            clock,
            config,
            _temp_dir,
        }
    }

    /// Builds the three services over this store.
    pub fn services(&self, config: ServiceConfig) -> TestServices {
        TestServices {
            pages: PageService::new(self.store.clone(), config),
            security_log: SecurityLogService::new(self.store.clone(), config),
            users: UserService::new(self.store.clone(), config),
        }
    }
}

impl std::ops::Deref for TestStore {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

fn open_file_store(path: &Path, clock: Arc<ManualClock>, config: &Config) -> Store {
    let backend = FileBackend::open_with_create_dirs(path).expect("Failed to open log file");
    Store::open_with_backend(Box::new(backend), clock, config.clone())
        .expect("Failed to open file store")
}

/// The services wired over one [`TestStore`].
#[derive(Debug, Clone)]
pub struct TestServices {
    /// Page service.
    pub pages: PageService,
    /// Security log service.
    pub security_log: SecurityLogService,
    /// User service.
    pub users: UserService,
}

/// Routes store logs to the test harness, filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Runs a test with a temporary in-memory store.
///
/// # Example
///
/// ```rust
/// use hoststore_core::Context;
/// use hoststore_testkit::with_temp_store;
///
/// with_temp_store(|store| {
///     store.set(&Context::new(), "k", "v", None).unwrap();
/// });
/// ```
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&TestStore) -> R,
{
    let test_store = TestStore::memory();
    f(&test_store)
}

/// Runs a test with a temporary file-backed store.
pub fn with_file_store<F, R>(f: F) -> R
where
    F: FnOnce(&TestStore, &Path) -> R,
{
    let test_store = TestStore::file();
    let path = test_store.path().expect("File store should have a path");
    f(&test_store, &path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoststore_core::{Clock, Context};

    #[test]
    fn memory_store_has_no_path() {
        assert!(TestStore::memory().path().is_none());
    }

    #[test]
    fn file_store_survives_reopen() {
        let store = TestStore::file();
        store.set(&Context::new(), "k", "v", None).unwrap();
        let path = store.path().unwrap();

        let store = store.reopen();
        assert_eq!(store.path(), Some(path));
        assert_eq!(
            store.get(&Context::new(), "k").unwrap().as_deref(),
            Some(&b"v"[..])
        );
    }

    #[test]
    fn clock_starts_at_fixture_epoch() {
        let store = TestStore::memory();
        assert_eq!(store.clock.now().timestamp_millis(), FIXTURE_EPOCH_MILLIS);
    }
}
