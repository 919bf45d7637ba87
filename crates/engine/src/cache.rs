//! Durable cache facade
//!
//! `DurableCache` wraps a [`Store`] with a journal and a periodic
//! checkpoint:
//!
//! - every accepted mutation is applied to the store and then appended to
//!   the journal, both under one write lock, so journal order is mutation
//!   order
//! - a mutation that arrives during a checkpoint is deferred and the caller
//!   gets the failure-safe default (`false`, `None`, `0`)
//! - keys expired by the store are journaled as synthetic deletes
//!
//! Mutators never fail for durability reasons; journal and checkpoint
//! errors are logged and counted in [`CacheStats`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use burrow_core::{ttl_secs, CacheValue, KeySelector, LogRecord, Result, SetItem, Store};
use burrow_durability::{
    recover, serializer_for, CachePaths, CacheSerializer, Journal, JournalCounters,
    RecoveryOutcome, SnapshotFile,
};
use burrow_storage::MemoryStore;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::checkpoint::{self, CheckpointCounters, CheckpointOutcome, Checkpointer};
use crate::config::CacheConfig;
use crate::coordinator::{CoordinatorMetrics, DeferredOp, FlushCoordinator};

/// Cumulative statistics of one cache instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Journal writer counters
    pub journal: JournalCounters,
    /// Checkpoints that rewrote the backup
    pub checkpoints_completed: u64,
    /// Checkpoints that found nothing to do
    pub checkpoints_skipped: u64,
    /// Checkpoints that failed
    pub checkpoints_failed: u64,
    /// Deferred-operation counters
    pub coordinator: CoordinatorMetrics,
    /// Whether mutations were journaled since the last checkpoint
    pub dirty: bool,
}

/// State shared between the facade and the checkpoint thread.
pub(crate) struct CacheInner<V: CacheValue> {
    pub(crate) name: String,
    pub(crate) store: Arc<dyn Store<V>>,
    pub(crate) serializer: Arc<dyn CacheSerializer<V>>,
    pub(crate) journal: Journal<V>,
    pub(crate) snapshot: SnapshotFile,
    pub(crate) coordinator: FlushCoordinator<V>,
    /// Serializes "mutate store, then append" against checkpoint capture
    pub(crate) write_lock: Mutex<()>,
    pub(crate) checkpoints: CheckpointCounters,
    expired: Arc<Mutex<Vec<String>>>,
}

impl<V: CacheValue> CacheInner<V> {
    /// Journal a delete for every key the store expired since the last call.
    ///
    /// Keys that were written again after expiring are skipped: their new
    /// value is already in the journal. Caller holds `write_lock`.
    pub(crate) fn journal_expired_locked(&self) {
        if self.coordinator.is_flushing() {
            return;
        }
        let expired = std::mem::take(&mut *self.expired.lock());
        if expired.is_empty() {
            return;
        }
        for key in expired {
            if self.store.get_ttl(&key).is_none() {
                self.journal.append(&LogRecord::delete_one(key));
            }
        }
    }

    /// Apply and journal every operation deferred during the last
    /// checkpoint, in arrival order. Caller holds `write_lock`.
    pub(crate) fn replay_deferred_locked(&self) {
        for op in self.coordinator.drain() {
            match op {
                DeferredOp::Apply(record) => {
                    if self.apply_record(&record) {
                        self.journal.append(&record);
                    }
                }
                DeferredOp::FlushAll => self.flush_all_locked(),
            }
        }
    }

    /// Clear the store and journal the removed keys as one delete. Caller
    /// holds `write_lock`.
    fn flush_all_locked(&self) {
        let keys = self.store.keys();
        self.store.flush_all();
        if !keys.is_empty() {
            self.journal.append(&LogRecord::Delete {
                key: KeySelector::Many(keys),
            });
        }
    }

    /// Apply a record to the store; true if the store accepted it.
    fn apply_record(&self, record: &LogRecord<V>) -> bool {
        match record {
            LogRecord::Set { key, val, ttl } => self.store.set(key, val.clone(), *ttl),
            LogRecord::MultiSet { entries } => self.store.mset(entries.clone()),
            LogRecord::Delete { key } => self.store.del(&key.clone().into_keys()) > 0,
            LogRecord::SetTtl { key, ttl } => self.store.ttl(key, *ttl),
        }
    }
}

/// A key/value cache that survives restarts.
///
/// # Example
///
/// ```no_run
/// use burrow_engine::{CacheConfig, DurableCache};
/// use serde_json::json;
/// use std::time::Duration;
///
/// let cache: DurableCache<serde_json::Value> =
///     DurableCache::open(CacheConfig::new("sessions").with_dir("/tmp"))?;
/// cache.set("foo", json!("bar"), Some(Duration::from_secs(60)));
/// assert_eq!(cache.get("foo"), Some(json!("bar")));
/// # Ok::<(), burrow_core::CacheError>(())
/// ```
pub struct DurableCache<V: CacheValue> {
    inner: Arc<CacheInner<V>>,
    paths: CachePaths,
    recovery: RecoveryOutcome,
    checkpointer: Mutex<Option<Checkpointer>>,
    closed: AtomicBool,
}

impl<V: CacheValue> DurableCache<V> {
    /// Open a cache backed by a [`MemoryStore`] and the configured codec.
    pub fn open(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        let serializer: Arc<dyn CacheSerializer<V>> = Arc::from(serializer_for::<V>(&config.codec)?);
        let store: Arc<dyn Store<V>> = Arc::new(MemoryStore::new(config.store.clone()));
        Self::open_with(config, store, serializer)
    }

    /// Open a cache on top of the given store and serializer.
    ///
    /// Recovers state from existing files (or creates empty ones) before
    /// returning, then starts the checkpoint thread.
    ///
    /// # Errors
    ///
    /// Fails on an invalid config, an unreadable or corrupt backup, or when
    /// a background thread cannot be spawned.
    pub fn open_with(
        config: CacheConfig,
        store: Arc<dyn Store<V>>,
        serializer: Arc<dyn CacheSerializer<V>>,
    ) -> Result<Self> {
        config.validate()?;
        let paths = config.paths()?;

        let recovery = recover(store.as_ref(), &paths, serializer.as_ref())?;

        let journal = Journal::open(
            &config.name,
            paths.journal(),
            Arc::clone(&serializer),
            config.journal_sync,
        )?;
        if recovery.stats().map(|s| s.has_journal()).unwrap_or(false) {
            // compact the replayed journal on the first checkpoint
            journal.mark_dirty();
        }

        let expired = Arc::new(Mutex::new(Vec::new()));
        let queue = Arc::clone(&expired);
        store.on_expired(Box::new(move |key: &str, _value: &V| {
            queue.lock().push(key.to_string());
        }));

        let inner = Arc::new(CacheInner {
            name: config.name.clone(),
            store,
            snapshot: SnapshotFile::new(&paths),
            serializer,
            journal,
            coordinator: FlushCoordinator::new(),
            write_lock: Mutex::new(()),
            checkpoints: CheckpointCounters::default(),
            expired,
        });

        let checkpointer = Checkpointer::start(Arc::clone(&inner), config.checkpoint_period())?;

        info!(
            cache = %config.name,
            dir = %paths.dir().display(),
            codec = inner.serializer.codec_id(),
            recovered = recovery.stats().is_some(),
            "Cache opened"
        );

        Ok(DurableCache {
            inner,
            paths,
            recovery,
            checkpointer: Mutex::new(Some(checkpointer)),
            closed: AtomicBool::new(false),
        })
    }

    /// Cache name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Backup and journal locations
    pub fn paths(&self) -> &CachePaths {
        &self.paths
    }

    /// How this instance came up
    pub fn recovery(&self) -> &RecoveryOutcome {
        &self.recovery
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Current value of `key`.
    pub fn get(&self, key: &str) -> Option<V> {
        let value = self.inner.store.get(key);
        if value.is_none() {
            self.journal_expired_opportunistic();
        }
        value
    }

    /// Expiry of `key`: `None` if absent, `Some(0)` if it never expires,
    /// otherwise milliseconds since the epoch.
    pub fn get_ttl(&self, key: &str) -> Option<u64> {
        self.inner.store.get_ttl(key)
    }

    /// All live keys.
    pub fn keys(&self) -> Vec<String> {
        self.inner.store.keys()
    }

    /// True if `key` is present.
    pub fn has(&self, key: &str) -> bool {
        self.get_ttl(key).is_some()
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Insert or overwrite `key`.
    ///
    /// `ttl`: `None` uses the store's default, zero means never expires.
    /// Returns `false` if the store refused it or a checkpoint was running.
    pub fn set(&self, key: &str, value: V, ttl: Option<Duration>) -> bool {
        let record = LogRecord::Set {
            key: key.to_string(),
            val: value,
            ttl: ttl.map(ttl_secs),
        };
        self.mutate(record, "set", CacheInner::apply_record)
    }

    /// Insert several items; journaled as one record.
    pub fn mset(&self, items: Vec<SetItem<V>>) -> bool {
        if items.is_empty() {
            return true;
        }
        let record = LogRecord::MultiSet { entries: items };
        self.mutate(record, "mset", CacheInner::apply_record)
    }

    /// Delete one or several keys, returning how many existed.
    pub fn del(&self, keys: impl Into<KeySelector>) -> usize {
        let selector = keys.into();
        if selector.is_empty() {
            return 0;
        }
        let keys = selector.clone().into_keys();
        let mut deleted = 0;
        self.mutate(LogRecord::Delete { key: selector }, "del", |inner, _| {
            deleted = inner.store.del(&keys);
            deleted > 0
        });
        deleted
    }

    /// Remove `key` and return its value; journaled as a delete.
    pub fn take(&self, key: &str) -> Option<V> {
        let mut taken = None;
        self.mutate(LogRecord::delete_one(key), "take", |inner, _| {
            taken = inner.store.take(key);
            taken.is_some()
        });
        taken
    }

    /// Redefine the TTL of an existing key.
    pub fn ttl(&self, key: &str, ttl: Option<Duration>) -> bool {
        let record = LogRecord::SetTtl {
            key: key.to_string(),
            ttl: ttl.map(ttl_secs),
        };
        self.mutate(record, "ttl", CacheInner::apply_record)
    }

    /// Remove every key.
    ///
    /// The removed keys are journaled as one multi-key delete so recovery
    /// cannot bring them back.
    pub fn flush_all(&self) {
        if self.reject_closed("flush_all") {
            return;
        }
        let _guard = self.inner.write_lock.lock();
        if self.inner.coordinator.is_flushing() {
            debug!(cache = %self.inner.name, op = "flush_all", "Checkpoint running, operation deferred");
            self.inner.coordinator.defer_flush_all();
            return;
        }
        self.inner.journal_expired_locked();
        self.inner.flush_all_locked();
    }

    /// Shared path of every journaled mutation.
    ///
    /// `apply` runs against the store under the write lock; the record is
    /// journaled only when it reports an effect.
    fn mutate<F>(&self, record: LogRecord<V>, op: &'static str, apply: F) -> bool
    where
        F: FnOnce(&CacheInner<V>, &LogRecord<V>) -> bool,
    {
        if self.reject_closed(op) {
            return false;
        }
        let _guard = self.inner.write_lock.lock();
        if self.inner.coordinator.is_flushing() {
            debug!(cache = %self.inner.name, op, "Checkpoint running, operation deferred");
            self.inner.coordinator.defer(record);
            return false;
        }
        self.inner.journal_expired_locked();
        let applied = apply(&self.inner, &record);
        if applied {
            self.inner.journal.append(&record);
        }
        applied
    }

    fn reject_closed(&self, op: &str) -> bool {
        let closed = self.closed.load(Ordering::Acquire);
        if closed {
            warn!(cache = %self.inner.name, op, "Cache is closed, operation ignored");
        }
        closed
    }

    fn journal_expired_opportunistic(&self) {
        if let Some(_guard) = self.inner.write_lock.try_lock() {
            self.inner.journal_expired_locked();
        }
    }

    // ========================================================================
    // Durability
    // ========================================================================

    /// Run one checkpoint now.
    pub fn checkpoint(&self) -> CheckpointOutcome {
        if self.closed.load(Ordering::Acquire) {
            return CheckpointOutcome::Skipped;
        }
        checkpoint::run(&self.inner)
    }

    /// Journal pending expiry deletes and wait until the journal writer has
    /// written everything queued so far.
    pub fn sync(&self) {
        {
            let _guard = self.inner.write_lock.lock();
            self.inner.journal_expired_locked();
        }
        self.inner.journal.sync();
    }

    /// Cumulative statistics.
    pub fn stats(&self) -> CacheStats {
        let checkpoints = &self.inner.checkpoints;
        CacheStats {
            journal: self.inner.journal.counters(),
            checkpoints_completed: checkpoints.completed.load(Ordering::Relaxed),
            checkpoints_skipped: checkpoints.skipped.load(Ordering::Relaxed),
            checkpoints_failed: checkpoints.failed.load(Ordering::Relaxed),
            coordinator: self.inner.coordinator.metrics(),
            dirty: self.inner.journal.is_dirty(),
        }
    }

    /// True once `close` has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop the checkpoint thread, write out the journal and release it.
    ///
    /// Reads keep working from memory; mutations are ignored afterwards.
    /// Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(mut checkpointer) = self.checkpointer.lock().take() {
            checkpointer.stop();
        }
        {
            let _guard = self.inner.write_lock.lock();
            self.inner.journal_expired_locked();
            let dropped = self.inner.coordinator.pending();
            if dropped > 0 {
                warn!(cache = %self.inner.name, dropped, "Deferred operations dropped on close");
            }
        }
        self.inner.journal.close();
        self.inner.store.close();
        info!(cache = %self.inner.name, "Cache closed");
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &CacheInner<V> {
        &self.inner
    }
}

impl<V: CacheValue> Drop for DurableCache<V> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<V: CacheValue> std::fmt::Debug for DurableCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableCache")
            .field("name", &self.inner.name)
            .field("paths", &self.paths)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burrow_storage::StoreOptions;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> DurableCache<Value> {
        let config = CacheConfig::new("unit")
            .with_dir(dir.path())
            .with_period(Duration::from_secs(3600))
            .with_store(StoreOptions::new().with_check_period(0));
        DurableCache::open(config).unwrap()
    }

    fn journal_lines(cache: &DurableCache<Value>) -> Vec<String> {
        cache.sync();
        std::fs::read_to_string(cache.paths().journal())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_mutations_deferred_while_flushing() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir);
        assert!(cache.inner().coordinator.begin_flush());

        assert!(!cache.set("a", json!(1), None));
        assert_eq!(cache.take("a"), None);
        assert!(!cache.set("b", json!(2), None));
        assert_eq!(cache.del("zzz"), 0);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), None);
        assert!(journal_lines(&cache).is_empty());
        assert_eq!(cache.inner().coordinator.pending(), 4);

        {
            let _guard = cache.inner().write_lock.lock();
            cache.inner().coordinator.end_flush();
            cache.inner().replay_deferred_locked();
        }

        // set a, del a, set b replayed in arrival order; del zzz had no effect
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(json!(2)));
        assert_eq!(
            journal_lines(&cache),
            vec![
                r#"{"cmd":"set","key":"a","val":1}"#,
                r#"{"cmd":"del","key":"a"}"#,
                r#"{"cmd":"set","key":"b","val":2}"#,
            ]
        );
        let stats = cache.stats();
        assert_eq!(stats.coordinator.deferred, 4);
        assert_eq!(stats.coordinator.replayed, 4);
    }

    #[test]
    fn test_deferred_flush_all_removes_keys_deferred_before_it() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir);
        cache.set("old", json!(0), None);
        assert!(cache.inner().coordinator.begin_flush());

        assert!(!cache.set("x", json!(1), None));
        cache.flush_all();
        assert!(!cache.set("y", json!(2), None));
        assert_eq!(cache.get("old"), Some(json!(0)));

        {
            let _guard = cache.inner().write_lock.lock();
            cache.inner().coordinator.end_flush();
            cache.inner().replay_deferred_locked();
        }

        assert_eq!(cache.keys(), vec!["y".to_string()]);
        let lines = journal_lines(&cache);
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], r#"{"cmd":"set","key":"x","val":1}"#);
        assert!(lines[2].starts_with(r#"{"cmd":"del","key":["#));
        assert!(lines[2].contains(r#""old""#) && lines[2].contains(r#""x""#));
        assert_eq!(lines[3], r#"{"cmd":"set","key":"y","val":2}"#);
    }

    /// MemoryStore whose next `keys()` call panics once armed.
    struct PanicOnceStore {
        inner: MemoryStore<Value>,
        armed: AtomicBool,
    }

    impl Store<Value> for PanicOnceStore {
        fn get(&self, key: &str) -> Option<Value> {
            self.inner.get(key)
        }
        fn set(&self, key: &str, value: Value, ttl: Option<u64>) -> bool {
            self.inner.set(key, value, ttl)
        }
        fn mset(&self, items: Vec<SetItem<Value>>) -> bool {
            self.inner.mset(items)
        }
        fn del(&self, keys: &[String]) -> usize {
            self.inner.del(keys)
        }
        fn take(&self, key: &str) -> Option<Value> {
            self.inner.take(key)
        }
        fn ttl(&self, key: &str, ttl: Option<u64>) -> bool {
            self.inner.ttl(key, ttl)
        }
        fn get_ttl(&self, key: &str) -> Option<u64> {
            self.inner.get_ttl(key)
        }
        fn keys(&self) -> Vec<String> {
            if self.armed.swap(false, Ordering::SeqCst) {
                panic!("store enumeration failed");
            }
            self.inner.keys()
        }
        fn on_expired(&self, handler: burrow_core::ExpiredHandler<Value>) {
            self.inner.on_expired(handler)
        }
        fn flush_all(&self) {
            self.inner.flush_all()
        }
    }

    fn open_panicking(dir: &TempDir, period: Duration) -> (Arc<PanicOnceStore>, DurableCache<Value>) {
        let store = Arc::new(PanicOnceStore {
            inner: MemoryStore::new(StoreOptions::new().with_check_period(0)),
            armed: AtomicBool::new(false),
        });
        let config = CacheConfig::new("flaky")
            .with_dir(dir.path())
            .with_period(period);
        let cache = DurableCache::open_with(
            config,
            Arc::clone(&store) as Arc<dyn Store<Value>>,
            Arc::new(burrow_durability::JsonLinesSerializer),
        )
        .unwrap();
        (store, cache)
    }

    #[test]
    fn test_panic_during_capture_does_not_wedge_cache() {
        let dir = TempDir::new().unwrap();
        let (store, cache) = open_panicking(&dir, Duration::from_secs(3600));
        assert!(cache.set("a", json!(1), None));
        store.armed.store(true, Ordering::SeqCst);

        let attempt =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cache.checkpoint()));
        assert!(attempt.is_err());
        assert!(!cache.inner().coordinator.is_flushing());
        assert!(cache.stats().dirty);

        assert!(cache.set("b", json!(2), None));
        assert_eq!(cache.checkpoint(), CheckpointOutcome::Completed);
        let backup = std::fs::read_to_string(cache.paths().backup()).unwrap();
        assert!(backup.contains(r#""key":"a""#) && backup.contains(r#""key":"b""#));
    }

    #[test]
    fn test_periodic_thread_survives_panicking_checkpoint() {
        let dir = TempDir::new().unwrap();
        let (store, cache) = open_panicking(&dir, Duration::from_millis(20));
        store.armed.store(true, Ordering::SeqCst);
        assert!(cache.set("a", json!(1), None));

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while cache.stats().checkpoints_completed == 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        let stats = cache.stats();
        assert_eq!(stats.checkpoints_failed, 1);
        assert!(stats.checkpoints_completed >= 1);
        assert!(!stats.dirty);
    }

    #[test]
    fn test_checkpoint_skipped_while_flushing() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir);
        cache.set("a", json!(1), None);
        assert!(cache.inner().coordinator.begin_flush());
        assert_eq!(cache.checkpoint(), CheckpointOutcome::Skipped);
        cache.inner().coordinator.end_flush();
        assert_eq!(cache.checkpoint(), CheckpointOutcome::Completed);
    }

    #[test]
    fn test_deferred_ops_applied_after_checkpoint() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir);
        cache.set("a", json!(1), None);
        assert!(cache.inner().coordinator.begin_flush());
        cache.set("late", json!("x"), None);
        cache.inner().coordinator.end_flush();

        // the replay happens when the next checkpoint finishes
        assert_eq!(cache.checkpoint(), CheckpointOutcome::Completed);
        assert_eq!(cache.get("late"), Some(json!("x")));
        assert_eq!(
            journal_lines(&cache),
            vec![r#"{"cmd":"set","key":"late","val":"x"}"#]
        );
        assert!(cache.stats().dirty);
    }

    #[test]
    fn test_refused_set_is_not_journaled() {
        let dir = TempDir::new().unwrap();
        let config = CacheConfig::new("full")
            .with_dir(dir.path())
            .with_store(StoreOptions::new().with_check_period(0).with_max_keys(1));
        let cache: DurableCache<Value> = DurableCache::open(config).unwrap();
        assert!(cache.set("a", json!(1), None));
        assert!(!cache.set("b", json!(2), None));
        assert_eq!(journal_lines(&cache).len(), 1);
    }
}
