//! Checkpoint routine and the periodic checkpoint thread
//!
//! A checkpoint:
//! 1. Under the write lock: journal pending expiry deletes; return if
//!    nothing was journaled since the last checkpoint; set the flushing
//!    flag
//! 2. Capture every live key (under the lock again) then, without the
//!    lock, encode the capture, atomically replace the backup and truncate
//!    the journal
//! 3. Under the write lock, whatever happened in step 2: clear the dirty
//!    flag on success, clear the flushing flag, replay the operations
//!    deferred meanwhile
//!
//! Step 3 runs from a drop guard armed as soon as the flag is set, so
//! neither an error nor a panic anywhere in step 2 can leave the cache
//! flushing forever. Mutations are deferred from the moment the flag is
//! set, so the capture sees the same state whether or not the lock was
//! released in between.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use burrow_core::{CacheValue, Result, SnapshotEntry};
use burrow_durability::snapshot;
use tracing::{debug, error, info};

use crate::cache::CacheInner;

/// Result of one checkpoint attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointOutcome {
    /// Nothing changed since the last checkpoint, or one was already running
    Skipped,
    /// Backup rewritten and journal emptied
    Completed,
    /// Writing the backup or truncating the journal failed; the journal
    /// stays dirty and the next checkpoint retries
    Failed,
}

/// Checkpoint counters.
#[derive(Debug, Default)]
pub(crate) struct CheckpointCounters {
    pub(crate) completed: AtomicU64,
    pub(crate) skipped: AtomicU64,
    pub(crate) failed: AtomicU64,
}

impl CheckpointCounters {
    fn record(&self, outcome: CheckpointOutcome) {
        let counter = match outcome {
            CheckpointOutcome::Skipped => &self.skipped,
            CheckpointOutcome::Completed => &self.completed,
            CheckpointOutcome::Failed => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Ends the flush when dropped.
struct FlushGuard<'a, V: CacheValue> {
    inner: &'a CacheInner<V>,
    succeeded: bool,
}

impl<V: CacheValue> Drop for FlushGuard<'_, V> {
    fn drop(&mut self) {
        let _guard = self.inner.write_lock.lock();
        if self.succeeded {
            self.inner.journal.clear_dirty();
        }
        self.inner.coordinator.end_flush();
        self.inner.journal_expired_locked();
        self.inner.replay_deferred_locked();
    }
}

/// Run one checkpoint.
pub(crate) fn run<V: CacheValue>(inner: &CacheInner<V>) -> CheckpointOutcome {
    let outcome = run_inner(inner);
    inner.checkpoints.record(outcome);
    outcome
}

fn run_inner<V: CacheValue>(inner: &CacheInner<V>) -> CheckpointOutcome {
    {
        let _lock = inner.write_lock.lock();
        if inner.coordinator.is_flushing() {
            return CheckpointOutcome::Skipped;
        }
        inner.journal_expired_locked();
        if !inner.journal.is_dirty() {
            return CheckpointOutcome::Skipped;
        }
        if !inner.coordinator.begin_flush() {
            return CheckpointOutcome::Skipped;
        }
    }

    // The guard takes the write lock on drop, so it must outlive every
    // lock taken below.
    let mut guard = FlushGuard {
        inner,
        succeeded: false,
    };
    let started = Instant::now();
    let entries = {
        let _lock = inner.write_lock.lock();
        snapshot::capture(inner.store.as_ref())
    };
    match write_and_truncate(inner, &entries) {
        Ok(()) => {
            guard.succeeded = true;
            debug!(
                cache = %inner.name,
                entries = entries.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Checkpoint complete"
            );
            CheckpointOutcome::Completed
        }
        Err(e) => {
            error!(cache = %inner.name, error = %e, "Checkpoint failed");
            CheckpointOutcome::Failed
        }
    }
}

fn write_and_truncate<V: CacheValue>(
    inner: &CacheInner<V>,
    entries: &[SnapshotEntry<V>],
) -> Result<()> {
    let bytes = inner.serializer.serialize_snapshot(entries)?;
    inner.snapshot.write(&bytes)?;
    inner.journal.truncate()
}

/// Background thread firing a checkpoint every period.
pub(crate) struct Checkpointer {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Checkpointer {
    /// Start the thread. It holds its own reference to the cache state.
    pub(crate) fn start<V: CacheValue>(
        inner: Arc<CacheInner<V>>,
        period: Duration,
    ) -> std::io::Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let name = format!("burrow-checkpoint-{}", inner.name);

        let handle = thread::Builder::new().name(name).spawn(move || {
            // Short slices keep shutdown responsive for long periods
            let slice = Duration::from_millis(50).min(period);
            while !flag.load(Ordering::Relaxed) {
                let mut elapsed = Duration::ZERO;
                while elapsed < period {
                    if flag.load(Ordering::Relaxed) {
                        return;
                    }
                    thread::sleep(slice);
                    elapsed += slice;
                }
                let attempt = panic::catch_unwind(AssertUnwindSafe(|| run(&inner)));
                if attempt.is_err() {
                    inner.checkpoints.record(CheckpointOutcome::Failed);
                    error!(cache = %inner.name, "Checkpoint panicked");
                }
            }
        })?;

        info!(period_ms = period.as_millis() as u64, "Checkpoint thread started");
        Ok(Checkpointer {
            shutdown,
            handle: Some(handle),
        })
    }

    /// Signal the thread and wait for it to exit.
    pub(crate) fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Checkpoint thread panicked");
            }
        }
    }
}

impl Drop for Checkpointer {
    fn drop(&mut self) {
        self.stop();
    }
}
