//! Multi-version engine with optimistic commit validation.

use super::commit_log::{CommitBatch, CommitLog, LogOp};
use super::{CommitOutcome, EngineTxn, KvEngine, ScanEntry};
use crate::clock::Clock;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::types::{SequenceNumber, TransactionId};
use bytes::Bytes;
use hoststore_storage::StorageBackend;
use parking_lot::{Mutex, RwLock};
use std::cmp::Ordering as KeyOrder;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A value as written, before or after commit. `None` is a tombstone.
#[derive(Debug, Clone)]
struct Entry {
    value: Option<Bytes>,
    expires_at: Option<u64>,
}

impl Entry {
    fn live(&self, now_ms: u64) -> Option<Bytes> {
        match self.expires_at {
            Some(at) if now_ms >= at => None,
            _ => self.value.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct Version {
    seq: SequenceNumber,
    entry: Entry,
}

/// Version chains in ascending sequence order.
type Rows = BTreeMap<Vec<u8>, Vec<Version>>;

fn visible_at(chain: &[Version], snapshot: SequenceNumber, now_ms: u64) -> Option<Bytes> {
    chain
        .iter()
        .rev()
        .find(|v| v.seq <= snapshot)
        .and_then(|v| v.entry.live(now_ms))
}

fn latest_seq(chain: &[Version]) -> Option<SequenceNumber> {
    chain.last().map(|v| v.seq)
}

/// Drops versions no snapshot at or after `oldest` can see.
///
/// Returns `true` if nothing live is left in the chain.
fn prune_chain(chain: &mut Vec<Version>, oldest: SequenceNumber) -> bool {
    if let Some(keep_from) = chain.iter().rposition(|v| v.seq <= oldest) {
        chain.drain(..keep_from);
    }
    match chain.as_slice() {
        [] => true,
        [only] => only.seq <= oldest && only.entry.value.is_none(),
        _ => false,
    }
}

struct Shared {
    rows: RwLock<Rows>,
    committed: AtomicU64,
    next_txn: AtomicU64,
    /// Serializes validation and apply.
    commit_lock: Mutex<()>,
    /// Open snapshots with their reference counts.
    snapshots: Mutex<BTreeMap<SequenceNumber, usize>>,
    log: Option<CommitLog>,
    clock: Arc<dyn Clock>,
    prune_versions: bool,
}

impl Shared {
    fn committed(&self) -> SequenceNumber {
        SequenceNumber::new(self.committed.load(Ordering::SeqCst))
    }

    fn acquire_snapshot(&self) -> SequenceNumber {
        let mut snapshots = self.snapshots.lock();
        let seq = self.committed();
        *snapshots.entry(seq).or_insert(0) += 1;
        seq
    }

    fn release_snapshot(&self, seq: SequenceNumber) {
        let mut snapshots = self.snapshots.lock();
        if let Some(count) = snapshots.get_mut(&seq) {
            *count -= 1;
            if *count == 0 {
                snapshots.remove(&seq);
            }
        }
    }

    /// The oldest sequence any open or future snapshot may read at.
    fn oldest_visible(&self) -> SequenceNumber {
        let snapshots = self.snapshots.lock();
        let committed = self.committed();
        snapshots
            .keys()
            .next()
            .copied()
            .map_or(committed, |oldest| oldest.min(committed))
    }
}

/// In-memory multi-version engine, optionally backed by a commit log.
///
/// Every key holds a chain of versions tagged with the sequence number of
/// the commit that wrote them. A transaction reads the newest version at
/// or below its snapshot. Commits run under one lock: the read set, the
/// write set and every scanned prefix are checked for versions newer than
/// the snapshot, then the batch is logged and applied.
///
/// # Example
///
/// ```
/// use hoststore_core::{KvEngine, MvccEngine, CommitOutcome, SystemClock, Config};
/// use std::sync::Arc;
///
/// let engine = MvccEngine::in_memory(Arc::new(SystemClock), &Config::default());
/// let mut txn = engine.begin(false).unwrap();
/// txn.set(b"page:faq", "body".into(), None).unwrap();
/// assert!(matches!(txn.commit(), CommitOutcome::Committed(_)));
/// ```
pub struct MvccEngine {
    shared: Arc<Shared>,
}

impl MvccEngine {
    fn with_log(log: Option<CommitLog>, clock: Arc<dyn Clock>, config: &Config) -> Self {
        Self {
            shared: Arc::new(Shared {
                rows: RwLock::new(Rows::new()),
                committed: AtomicU64::new(0),
                next_txn: AtomicU64::new(1),
                commit_lock: Mutex::new(()),
                snapshots: Mutex::new(BTreeMap::new()),
                log,
                clock,
                prune_versions: config.prune_versions,
            }),
        }
    }

    /// Creates an engine that keeps nothing across restarts.
    #[must_use]
    pub fn in_memory(clock: Arc<dyn Clock>, config: &Config) -> Self {
        Self::with_log(None, clock, config)
    }

    /// Opens an engine over a commit log, replaying what it holds.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LogCorruption`] if the log fails verification,
    /// or a storage error if it cannot be read.
    pub fn open(
        backend: Box<dyn StorageBackend>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> CoreResult<Self> {
        let log = CommitLog::new(backend, config.sync_on_commit);
        let batches = log.replay()?;
        let engine = Self::with_log(Some(log), clock, config);

        let mut rows = engine.shared.rows.write();
        let mut committed: Option<SequenceNumber> = None;
        let mut ops = 0usize;
        for batch in batches {
            let seq = batch.sequence;
            if let Some(last) = committed.filter(|last| seq <= *last) {
                return Err(CoreError::log_corruption(
                    0,
                    format!("{seq} does not follow {last}"),
                ));
            }
            ops += batch.ops.len();
            apply_batch(&mut rows, batch);
            committed = Some(seq);
        }
        drop(rows);
        let committed = committed.unwrap_or(SequenceNumber::new(0));
        engine.shared.committed.store(committed.as_u64(), Ordering::SeqCst);

        tracing::info!(committed = committed.as_u64(), ops, "opened commit log");
        Ok(engine)
    }

    /// Number of stored versions across all keys, tombstones included.
    #[must_use]
    pub fn version_count(&self) -> usize {
        self.shared.rows.read().values().map(Vec::len).sum()
    }

    /// Number of distinct snapshots held by open transactions.
    #[must_use]
    pub fn open_snapshots(&self) -> usize {
        self.shared.snapshots.lock().len()
    }

    fn checkpoint_inner(&self) -> CoreResult<()> {
        let shared = &self.shared;
        let _commit = shared.commit_lock.lock();
        let oldest = shared.oldest_visible();
        let now = shared.clock.now_millis();
        let committed = shared.committed();

        let mut rows = shared.rows.write();
        let before: usize = rows.values().map(Vec::len).sum();
        rows.retain(|_, chain| {
            let dead = prune_chain(chain, oldest);
            let expired = matches!(
                chain.as_slice(),
                [only] if only.seq <= oldest && only.entry.live(now).is_none()
            );
            !(dead || expired)
        });
        let after: usize = rows.values().map(Vec::len).sum();

        if let Some(log) = &shared.log {
            let ops = rows
                .iter()
                .filter_map(|(key, chain)| {
                    let latest = chain.last()?;
                    latest.entry.live(now).map(|value| LogOp::Put {
                        key: key.clone(),
                        value,
                        expires_at: latest.entry.expires_at,
                    })
                })
                .collect::<Vec<_>>();
            let live = ops.len();
            log.rewrite(&[CommitBatch {
                sequence: committed,
                ops,
            }])?;
            tracing::info!(
                committed = committed.as_u64(),
                live,
                reclaimed = before - after,
                "checkpointed commit log"
            );
        } else {
            tracing::info!(reclaimed = before - after, "compacted in-memory versions");
        }
        Ok(())
    }
}

fn apply_batch(rows: &mut Rows, batch: CommitBatch) {
    let seq = batch.sequence;
    for op in batch.ops {
        let (key, entry) = match op {
            LogOp::Put {
                key,
                value,
                expires_at,
            } => (
                key,
                Entry {
                    value: Some(value),
                    expires_at,
                },
            ),
            LogOp::Delete { key } => (
                key,
                Entry {
                    value: None,
                    expires_at: None,
                },
            ),
        };
        rows.entry(key).or_default().push(Version { seq, entry });
    }
}

impl KvEngine for MvccEngine {
    fn begin(&self, read_only: bool) -> CoreResult<Box<dyn EngineTxn>> {
        let id = TransactionId::new(self.shared.next_txn.fetch_add(1, Ordering::SeqCst));
        let snapshot = self.shared.acquire_snapshot();
        Ok(Box::new(MvccTxn {
            shared: Arc::clone(&self.shared),
            id,
            snapshot,
            read_only,
            writes: BTreeMap::new(),
            reads: BTreeSet::new(),
            scans: Vec::new(),
        }))
    }

    fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.shared.clock)
    }

    fn committed_seq(&self) -> SequenceNumber {
        self.shared.committed()
    }

    fn checkpoint(&self) -> CoreResult<()> {
        self.checkpoint_inner()
    }
}

impl std::fmt::Debug for MvccEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MvccEngine")
            .field("committed", &self.shared.committed())
            .field("durable", &self.shared.log.is_some())
            .finish_non_exhaustive()
    }
}

struct MvccTxn {
    shared: Arc<Shared>,
    id: TransactionId,
    snapshot: SequenceNumber,
    read_only: bool,
    writes: BTreeMap<Vec<u8>, Entry>,
    reads: BTreeSet<Vec<u8>>,
    scans: Vec<Vec<u8>>,
}

impl MvccTxn {
    fn ensure_writable(&self, key: &[u8]) -> CoreResult<()> {
        if self.read_only {
            return Err(CoreError::ReadOnly {
                key: String::from_utf8_lossy(key).into_owned(),
            });
        }
        Ok(())
    }

    /// Finds the first key this transaction depends on that moved.
    fn find_conflict(&self, rows: &Rows) -> Option<Vec<u8>> {
        let moved = |key: &[u8]| {
            rows.get(key)
                .and_then(|chain| latest_seq(chain))
                .is_some_and(|seq| seq > self.snapshot)
        };

        if let Some(key) = self.reads.iter().find(|k| moved(k.as_slice())) {
            return Some(key.clone());
        }
        if let Some(key) = self.writes.keys().find(|k| moved(k.as_slice())) {
            return Some(key.clone());
        }
        for prefix in &self.scans {
            let hit = rows
                .range::<[u8], _>((Bound::Included(prefix.as_slice()), Bound::Unbounded))
                .take_while(|(k, _)| k.starts_with(prefix))
                .find(|(_, chain)| latest_seq(chain).is_some_and(|seq| seq > self.snapshot));
            if let Some((key, _)) = hit {
                return Some(key.clone());
            }
        }
        None
    }

    fn commit_writes(&mut self) -> CommitOutcome {
        let shared = Arc::clone(&self.shared);
        let _commit = shared.commit_lock.lock();

        if let Some(key) = self.find_conflict(&shared.rows.read()) {
            return CommitOutcome::Conflict { key };
        }

        let seq = shared.committed().next();
        let writes = std::mem::take(&mut self.writes);
        let batch = CommitBatch {
            sequence: seq,
            ops: writes
                .into_iter()
                .map(|(key, entry)| match entry.value {
                    Some(value) => LogOp::Put {
                        key,
                        value,
                        expires_at: entry.expires_at,
                    },
                    None => LogOp::Delete { key },
                })
                .collect(),
        };

        if let Some(log) = &shared.log {
            if let Err(err) = log.append(&batch) {
                return CommitOutcome::Fatal(err);
            }
        }

        let oldest = shared.oldest_visible();
        let touched: Vec<Vec<u8>> = batch.ops.iter().map(|op| op.key().to_vec()).collect();
        let mut rows = shared.rows.write();
        apply_batch(&mut rows, batch);
        if shared.prune_versions {
            for key in &touched {
                if let Some(chain) = rows.get_mut(key) {
                    prune_chain(chain, oldest);
                }
            }
        }
        shared.committed.store(seq.as_u64(), Ordering::SeqCst);
        drop(rows);

        CommitOutcome::Committed(seq)
    }
}

impl EngineTxn for MvccTxn {
    fn id(&self) -> TransactionId {
        self.id
    }

    fn snapshot(&self) -> SequenceNumber {
        self.snapshot
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn get(&mut self, key: &[u8]) -> CoreResult<Option<Bytes>> {
        let now = self.shared.clock.now_millis();
        if let Some(entry) = self.writes.get(key) {
            return Ok(entry.live(now));
        }
        if !self.read_only {
            self.reads.insert(key.to_vec());
        }
        let rows = self.shared.rows.read();
        Ok(rows
            .get(key)
            .and_then(|chain| visible_at(chain, self.snapshot, now)))
    }

    fn set(&mut self, key: &[u8], value: Bytes, expires_at: Option<u64>) -> CoreResult<()> {
        self.ensure_writable(key)?;
        self.writes.insert(
            key.to_vec(),
            Entry {
                value: Some(value),
                expires_at,
            },
        );
        Ok(())
    }

    fn remove(&mut self, key: &[u8]) -> CoreResult<()> {
        self.ensure_writable(key)?;
        self.writes.insert(
            key.to_vec(),
            Entry {
                value: None,
                expires_at: None,
            },
        );
        Ok(())
    }

    fn scan(
        &mut self,
        prefix: &[u8],
        after: Option<&[u8]>,
        limit: usize,
    ) -> CoreResult<Vec<ScanEntry>> {
        if !self.read_only && !self.scans.iter().any(|p| prefix.starts_with(p)) {
            self.scans.push(prefix.to_vec());
        }
        if limit == 0 {
            return Ok(Vec::new());
        }

        let now = self.shared.clock.now_millis();
        let snapshot = self.snapshot;
        let lower = match after {
            Some(after) if after >= prefix => Bound::Excluded(after),
            _ => Bound::Included(prefix),
        };

        let rows = self.shared.rows.read();
        let mut committed = rows
            .range::<[u8], _>((lower, Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, chain)| (k.as_slice(), visible_at(chain, snapshot, now)))
            .peekable();
        let mut pending = self
            .writes
            .range::<[u8], _>((lower, Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, entry)| (k.as_slice(), entry.live(now)))
            .peekable();

        let mut out = Vec::new();
        while out.len() < limit {
            let order = match (committed.peek(), pending.peek()) {
                (None, None) => break,
                (Some(_), None) => KeyOrder::Less,
                (None, Some(_)) => KeyOrder::Greater,
                (Some((ck, _)), Some((pk, _))) => ck.cmp(pk),
            };
            let item = match order {
                KeyOrder::Less => committed.next(),
                KeyOrder::Greater => pending.next(),
                KeyOrder::Equal => {
                    committed.next();
                    pending.next()
                }
            };
            if let Some((key, Some(value))) = item {
                out.push((key.to_vec(), value));
            }
        }
        Ok(out)
    }

    fn commit(mut self: Box<Self>) -> CommitOutcome {
        if self.read_only || self.writes.is_empty() {
            return CommitOutcome::Committed(self.snapshot);
        }
        self.commit_writes()
    }

    fn rollback(self: Box<Self>) {}
}

impl Drop for MvccTxn {
    fn drop(&mut self) {
        self.shared.release_snapshot(self.snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use hoststore_storage::{FileBackend, InMemoryBackend, StorageResult};
    use std::io;
    use std::time::Duration;

    /// Memory device whose next `failing_syncs` syncs fail.
    struct FlakyDevice {
        inner: InMemoryBackend,
        failing_syncs: usize,
        truncate_fails: bool,
    }

    impl FlakyDevice {
        fn new(failing_syncs: usize, truncate_fails: bool) -> Self {
            Self {
                inner: InMemoryBackend::new(),
                failing_syncs,
                truncate_fails,
            }
        }
    }

    impl StorageBackend for FlakyDevice {
        fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
            self.inner.read_at(offset, len)
        }

        fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
            self.inner.append(data)
        }

        fn size(&self) -> StorageResult<u64> {
            self.inner.size()
        }

        fn sync(&mut self) -> StorageResult<()> {
            if self.failing_syncs > 0 {
                self.failing_syncs -= 1;
                return Err(io::Error::other("fsync failed").into());
            }
            self.inner.sync()
        }

        fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
            if self.truncate_fails {
                return Err(io::Error::other("truncate failed").into());
            }
            self.inner.truncate(new_size)
        }
    }

    fn flaky_engine(device: FlakyDevice) -> MvccEngine {
        MvccEngine::open(
            Box::new(device),
            Arc::new(ManualClock::default()),
            &Config::default(),
        )
        .unwrap()
    }

    fn commit_put(engine: &MvccEngine, key: &[u8], value: &'static [u8]) -> CommitOutcome {
        let mut txn = engine.begin(false).unwrap();
        txn.set(key, Bytes::from_static(value), None).unwrap();
        txn.commit()
    }

    fn engine() -> MvccEngine {
        MvccEngine::in_memory(Arc::new(ManualClock::default()), &Config::default())
    }

    fn put(engine: &MvccEngine, key: &[u8], value: &'static [u8]) -> SequenceNumber {
        let mut txn = engine.begin(false).unwrap();
        txn.set(key, Bytes::from_static(value), None).unwrap();
        match txn.commit() {
            CommitOutcome::Committed(seq) => seq,
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    fn read(engine: &MvccEngine, key: &[u8]) -> Option<Bytes> {
        let mut txn = engine.begin(true).unwrap();
        txn.get(key).unwrap()
    }

    #[test]
    fn own_writes_are_visible() {
        let engine = engine();
        let mut txn = engine.begin(false).unwrap();
        txn.set(b"k", Bytes::from_static(b"v"), None).unwrap();
        assert_eq!(txn.get(b"k").unwrap().as_deref(), Some(&b"v"[..]));
        txn.remove(b"k").unwrap();
        assert_eq!(txn.get(b"k").unwrap(), None);
    }

    #[test]
    fn snapshot_hides_later_commits() {
        let engine = engine();
        put(&engine, b"k", b"old");

        let mut reader = engine.begin(true).unwrap();
        put(&engine, b"k", b"new");

        assert_eq!(reader.get(b"k").unwrap().as_deref(), Some(&b"old"[..]));
        assert_eq!(read(&engine, b"k").as_deref(), Some(&b"new"[..]));
    }

    #[test]
    fn read_write_race_second_committer_conflicts() {
        let engine = engine();
        put(&engine, b"counter", b"0");

        let mut a = engine.begin(false).unwrap();
        let mut b = engine.begin(false).unwrap();
        a.get(b"counter").unwrap();
        b.get(b"counter").unwrap();
        a.set(b"counter", Bytes::from_static(b"a"), None).unwrap();
        b.set(b"counter", Bytes::from_static(b"b"), None).unwrap();

        assert!(matches!(a.commit(), CommitOutcome::Committed(_)));
        match b.commit() {
            CommitOutcome::Conflict { key } => assert_eq!(key, b"counter"),
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(read(&engine, b"counter").as_deref(), Some(&b"a"[..]));
    }

    #[test]
    fn blind_write_write_conflicts() {
        let engine = engine();
        let mut a = engine.begin(false).unwrap();
        let mut b = engine.begin(false).unwrap();
        a.set(b"k", Bytes::from_static(b"a"), None).unwrap();
        b.set(b"k", Bytes::from_static(b"b"), None).unwrap();
        assert!(matches!(a.commit(), CommitOutcome::Committed(_)));
        assert!(matches!(b.commit(), CommitOutcome::Conflict { .. }));
    }

    #[test]
    fn scanned_prefix_catches_phantom_insert() {
        let engine = engine();
        let mut scanner = engine.begin(false).unwrap();
        assert!(scanner.scan(b"page:", None, 10).unwrap().is_empty());
        scanner.set(b"pages:count", Bytes::from_static(b"0"), None).unwrap();

        put(&engine, b"page:new", b"x");

        assert!(matches!(
            scanner.commit(),
            CommitOutcome::Conflict { key } if key == b"page:new"
        ));
    }

    #[test]
    fn disjoint_transactions_both_commit() {
        let engine = engine();
        let mut a = engine.begin(false).unwrap();
        let mut b = engine.begin(false).unwrap();
        a.get(b"a").unwrap();
        b.get(b"b").unwrap();
        a.set(b"a", Bytes::from_static(b"1"), None).unwrap();
        b.set(b"b", Bytes::from_static(b"2"), None).unwrap();
        assert!(matches!(a.commit(), CommitOutcome::Committed(_)));
        assert!(matches!(b.commit(), CommitOutcome::Committed(_)));
    }

    #[test]
    fn read_only_rejects_writes() {
        let engine = engine();
        let mut txn = engine.begin(true).unwrap();
        assert!(matches!(
            txn.set(b"k", Bytes::new(), None),
            Err(CoreError::ReadOnly { .. })
        ));
        assert!(matches!(txn.remove(b"k"), Err(CoreError::ReadOnly { .. })));
    }

    #[test]
    fn rollback_discards_writes() {
        let engine = engine();
        let mut txn = engine.begin(false).unwrap();
        txn.set(b"k", Bytes::from_static(b"v"), None).unwrap();
        txn.rollback();
        assert_eq!(read(&engine, b"k"), None);
        assert_eq!(engine.committed_seq().as_u64(), 0);
    }

    #[test]
    fn expiry_is_evaluated_on_read() {
        let clock = Arc::new(ManualClock::at_millis(10_000));
        let engine = MvccEngine::in_memory(clock.clone(), &Config::default());
        let mut txn = engine.begin(false).unwrap();
        txn.set(b"k", Bytes::from_static(b"v"), Some(15_000)).unwrap();
        assert!(matches!(txn.commit(), CommitOutcome::Committed(_)));

        clock.advance(Duration::from_millis(4_999));
        assert!(read(&engine, b"k").is_some());
        clock.advance(Duration::from_millis(1));
        assert!(read(&engine, b"k").is_none());

        let mut scan = engine.begin(true).unwrap();
        assert!(scan.scan(b"k", None, 10).unwrap().is_empty());
    }

    #[test]
    fn scan_merges_pending_writes_in_order() {
        let engine = engine();
        put(&engine, b"p:b", b"b");
        put(&engine, b"p:d", b"d");
        put(&engine, b"q:a", b"x");

        let mut txn = engine.begin(false).unwrap();
        txn.set(b"p:a", Bytes::from_static(b"a"), None).unwrap();
        txn.set(b"p:c", Bytes::from_static(b"c"), None).unwrap();
        txn.remove(b"p:d").unwrap();

        let keys: Vec<_> = txn
            .scan(b"p:", None, 10)
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![b"p:a".to_vec(), b"p:b".to_vec(), b"p:c".to_vec()]);
    }

    #[test]
    fn scan_resumes_after_cursor() {
        let engine = engine();
        for key in [&b"p:1"[..], b"p:2", b"p:3", b"p:4"] {
            put(&engine, key, b"v");
        }
        let mut txn = engine.begin(true).unwrap();
        let first = txn.scan(b"p:", None, 2).unwrap();
        assert_eq!(first.len(), 2);
        let rest = txn.scan(b"p:", Some(&first[1].0), 2).unwrap();
        let keys: Vec<_> = rest.into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b"p:3".to_vec(), b"p:4".to_vec()]);
    }

    #[test]
    fn pruning_keeps_versions_for_open_snapshots() {
        let engine = engine();
        put(&engine, b"k", b"1");
        let mut reader = engine.begin(true).unwrap();
        put(&engine, b"k", b"2");
        put(&engine, b"k", b"3");

        assert_eq!(reader.get(b"k").unwrap().as_deref(), Some(&b"1"[..]));
        drop(reader);
        assert_eq!(engine.open_snapshots(), 0);

        put(&engine, b"k", b"4");
        // The committer's own snapshot still pins version 3.
        assert_eq!(engine.version_count(), 2);
    }

    #[test]
    fn reopen_replays_committed_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commit.log");
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
        let config = Config::default();

        {
            let backend = FileBackend::open(&path).unwrap();
            let engine = MvccEngine::open(Box::new(backend), clock.clone(), &config).unwrap();
            put(&engine, b"a", b"1");
            put(&engine, b"b", b"2");
            let mut txn = engine.begin(false).unwrap();
            txn.remove(b"a").unwrap();
            assert!(matches!(txn.commit(), CommitOutcome::Committed(_)));
        }

        let backend = FileBackend::open(&path).unwrap();
        let engine = MvccEngine::open(Box::new(backend), clock, &config).unwrap();
        assert_eq!(engine.committed_seq().as_u64(), 3);
        assert_eq!(read(&engine, b"a"), None);
        assert_eq!(read(&engine, b"b").as_deref(), Some(&b"2"[..]));
        assert_eq!(put(&engine, b"c", b"3").as_u64(), 4);
    }

    #[test]
    fn checkpoint_reclaims_dead_versions() {
        let clock = Arc::new(ManualClock::at_millis(1_000));
        let engine = MvccEngine::open(
            Box::new(InMemoryBackend::new()),
            clock.clone(),
            &Config::default(),
        )
        .unwrap();
        put(&engine, b"live", b"v");
        put(&engine, b"gone", b"v");
        let mut txn = engine.begin(false).unwrap();
        txn.remove(b"gone").unwrap();
        txn.set(b"ttl", Bytes::from_static(b"v"), Some(2_000)).unwrap();
        assert!(matches!(txn.commit(), CommitOutcome::Committed(_)));

        clock.advance(Duration::from_secs(5));
        engine.checkpoint().unwrap();

        assert_eq!(engine.version_count(), 1);
        assert_eq!(read(&engine, b"live").as_deref(), Some(&b"v"[..]));
        let replayed = engine.shared.log.as_ref().map(|log| log.replay().unwrap());
        let batch = &replayed.unwrap()[0];
        assert_eq!(batch.sequence.as_u64(), 3);
        assert_eq!(batch.ops.len(), 1);
    }

    #[test]
    fn failed_sync_leaves_no_record_behind() {
        let engine = flaky_engine(FlakyDevice::new(1, false));

        let first = commit_put(&engine, b"lost", b"x");
        assert!(matches!(first, CommitOutcome::Fatal(CoreError::Storage(_))));
        assert_eq!(engine.committed_seq().as_u64(), 0);
        assert_eq!(read(&engine, b"lost"), None);

        let second = commit_put(&engine, b"kept", b"y");
        assert!(matches!(second, CommitOutcome::Committed(seq) if seq.as_u64() == 1));

        let replayed = engine
            .shared
            .log
            .as_ref()
            .map(|log| log.replay().unwrap())
            .unwrap();
        assert_eq!(replayed.len(), 1);
        assert_eq!(replayed[0].sequence.as_u64(), 1);
        assert_eq!(replayed[0].ops[0].key(), b"kept");
    }

    #[test]
    fn failed_undo_poisons_the_log() {
        let engine = flaky_engine(FlakyDevice::new(1, true));

        assert!(matches!(
            commit_put(&engine, b"a", b"x"),
            CommitOutcome::Fatal(CoreError::Storage(_))
        ));
        match commit_put(&engine, b"b", b"y") {
            CommitOutcome::Fatal(err) => {
                assert!(matches!(err, CoreError::LogPoisoned));
                assert!(err.is_fatal());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(engine.committed_seq().as_u64(), 0);
        assert_eq!(read(&engine, b"b"), None);
    }
}
