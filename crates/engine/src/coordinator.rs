//! Flush coordinator
//!
//! Gates mutations against an in-progress checkpoint. While the flushing
//! flag is set, a mutation is not applied; the caller's exact operation is
//! queued as a [`DeferredOp`] and the caller gets the failure-safe default
//! right away.
//!
//! Deferred operations are kept in arrival order and handed back exactly
//! once, by [`FlushCoordinator::drain`], when the checkpoint ends.
//!
//! The flag itself is only flipped while the cache's write lock is held, so
//! a mutation either sees the checkpoint or completes before its capture.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use burrow_core::{LogRecord, SetItem};
use parking_lot::Mutex;
use tracing::debug;

/// An operation held back by a running checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum DeferredOp<V> {
    /// A journaled mutation, replayed as recorded
    Apply(LogRecord<V>),
    /// Remove every key present at replay time
    FlushAll,
}

#[derive(Debug, Clone)]
struct Deferred<V> {
    op: DeferredOp<V>,
    arrived: Instant,
}

/// Coordinator metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinatorMetrics {
    /// Operations queued because a checkpoint was running
    pub deferred: u64,
    /// Queued operations handed back for replay
    pub replayed: u64,
    /// Operations currently waiting
    pub pending: usize,
    /// Whether a checkpoint is running
    pub flushing: bool,
}

/// Mutation gate plus FIFO of deferred operations.
///
/// # Memory Ordering
///
/// The metric counters use Relaxed ordering; they are observational only.
pub struct FlushCoordinator<V> {
    flushing: AtomicBool,
    queue: Mutex<VecDeque<Deferred<V>>>,
    total_deferred: AtomicU64,
    total_replayed: AtomicU64,
}

impl<V> Default for FlushCoordinator<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> FlushCoordinator<V> {
    /// Create an idle coordinator.
    pub fn new() -> Self {
        FlushCoordinator {
            flushing: AtomicBool::new(false),
            queue: Mutex::new(VecDeque::new()),
            total_deferred: AtomicU64::new(0),
            total_replayed: AtomicU64::new(0),
        }
    }

    /// True while a checkpoint is running.
    pub fn is_flushing(&self) -> bool {
        self.flushing.load(Ordering::Acquire)
    }

    /// Enter the flushing state.
    ///
    /// Returns `false` if a checkpoint is already running.
    pub fn begin_flush(&self) -> bool {
        self.flushing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Leave the flushing state.
    pub fn end_flush(&self) {
        self.flushing.store(false, Ordering::Release);
    }

    /// Queue a mutation until the current checkpoint ends.
    pub fn defer(&self, record: LogRecord<V>) {
        self.push(DeferredOp::Apply(record));
    }

    /// Queue a flush of the whole store.
    ///
    /// The keys are resolved at replay time, so the flush also removes keys
    /// written by operations deferred before it.
    pub fn defer_flush_all(&self) {
        self.push(DeferredOp::FlushAll);
    }

    fn push(&self, op: DeferredOp<V>) {
        self.queue.lock().push_back(Deferred {
            op,
            arrived: Instant::now(),
        });
        self.total_deferred.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of operations waiting.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Take every queued operation in arrival order.
    ///
    /// Relative TTLs are shortened by the time each operation spent in the
    /// queue, never below one second.
    pub fn drain(&self) -> Vec<DeferredOp<V>> {
        let drained: Vec<Deferred<V>> = self.queue.lock().drain(..).collect();
        if drained.is_empty() {
            return Vec::new();
        }
        let now = Instant::now();
        self.total_replayed
            .fetch_add(drained.len() as u64, Ordering::Relaxed);
        debug!(count = drained.len(), "Replaying deferred operations");
        drained
            .into_iter()
            .map(|d| match d.op {
                DeferredOp::Apply(record) => {
                    let waited = now.saturating_duration_since(d.arrived);
                    DeferredOp::Apply(age_record(record, waited))
                }
                flush @ DeferredOp::FlushAll => flush,
            })
            .collect()
    }

    /// Snapshot of the coordinator metrics.
    pub fn metrics(&self) -> CoordinatorMetrics {
        CoordinatorMetrics {
            deferred: self.total_deferred.load(Ordering::Relaxed),
            replayed: self.total_replayed.load(Ordering::Relaxed),
            pending: self.pending(),
            flushing: self.is_flushing(),
        }
    }
}

/// Shorten a relative TTL by `waited`. `None` and `Some(0)` are left alone.
fn age_ttl(ttl: Option<u64>, waited: Duration) -> Option<u64> {
    match ttl {
        Some(secs) if secs > 0 => Some(secs.saturating_sub(waited.as_secs()).max(1)),
        other => other,
    }
}

fn age_record<V>(record: LogRecord<V>, waited: Duration) -> LogRecord<V> {
    if waited.as_secs() == 0 {
        return record;
    }
    match record {
        LogRecord::Set { key, val, ttl } => LogRecord::Set {
            key,
            val,
            ttl: age_ttl(ttl, waited),
        },
        LogRecord::MultiSet { entries } => LogRecord::MultiSet {
            entries: entries
                .into_iter()
                .map(|item| SetItem {
                    ttl: age_ttl(item.ttl, waited),
                    ..item
                })
                .collect(),
        },
        LogRecord::SetTtl { key, ttl } => LogRecord::SetTtl {
            key,
            ttl: age_ttl(ttl, waited),
        },
        delete @ LogRecord::Delete { .. } => delete,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(key: &str, ttl: Option<u64>) -> LogRecord<u32> {
        LogRecord::Set {
            key: key.to_string(),
            val: 1,
            ttl,
        }
    }

    fn apply(record: LogRecord<u32>) -> DeferredOp<u32> {
        DeferredOp::Apply(record)
    }

    #[test]
    fn test_begin_flush_is_exclusive() {
        let coordinator: FlushCoordinator<u32> = FlushCoordinator::new();
        assert!(!coordinator.is_flushing());
        assert!(coordinator.begin_flush());
        assert!(!coordinator.begin_flush());
        assert!(coordinator.is_flushing());
        coordinator.end_flush();
        assert!(!coordinator.is_flushing());
        assert!(coordinator.begin_flush());
    }

    #[test]
    fn test_drain_preserves_arrival_order() {
        let coordinator = FlushCoordinator::new();
        coordinator.defer(set("a", None));
        coordinator.defer(LogRecord::delete_one("a"));
        coordinator.defer(set("b", None));
        assert_eq!(coordinator.pending(), 3);

        let drained = coordinator.drain();
        assert_eq!(
            drained,
            vec![
                apply(set("a", None)),
                apply(LogRecord::delete_one("a")),
                apply(set("b", None)),
            ]
        );
        assert_eq!(coordinator.pending(), 0);
        assert!(coordinator.drain().is_empty());
    }

    #[test]
    fn test_each_operation_drained_once() {
        let coordinator = FlushCoordinator::new();
        coordinator.defer(set("a", None));
        assert_eq!(coordinator.drain().len(), 1);
        coordinator.defer(set("b", None));
        assert_eq!(coordinator.drain(), vec![apply(set("b", None))]);

        let metrics = coordinator.metrics();
        assert_eq!(metrics.deferred, 2);
        assert_eq!(metrics.replayed, 2);
        assert_eq!(metrics.pending, 0);
    }

    #[test]
    fn test_flush_all_keeps_its_place() {
        let coordinator = FlushCoordinator::new();
        coordinator.defer(set("x", None));
        coordinator.defer_flush_all();
        coordinator.defer(set("y", None));
        assert_eq!(
            coordinator.drain(),
            vec![apply(set("x", None)), DeferredOp::FlushAll, apply(set("y", None))]
        );
        assert_eq!(coordinator.metrics().deferred, 3);
    }

    #[test]
    fn test_age_ttl() {
        let waited = Duration::from_millis(3_500);
        assert_eq!(age_ttl(None, waited), None);
        assert_eq!(age_ttl(Some(0), waited), Some(0));
        assert_eq!(age_ttl(Some(10), waited), Some(7));
        assert_eq!(age_ttl(Some(2), waited), Some(1));
    }

    #[test]
    fn test_age_record_variants() {
        let waited = Duration::from_secs(2);
        assert_eq!(age_record(set("a", Some(5)), waited), set("a", Some(3)));

        let mset: LogRecord<u32> = LogRecord::MultiSet {
            entries: vec![SetItem::new("a", 1).with_ttl(4), SetItem::new("b", 2)],
        };
        match age_record(mset, waited) {
            LogRecord::MultiSet { entries } => {
                assert_eq!(entries[0].ttl, Some(2));
                assert_eq!(entries[1].ttl, None);
            }
            other => panic!("unexpected record {:?}", other),
        }

        let ttl: LogRecord<u32> = LogRecord::SetTtl {
            key: "a".into(),
            ttl: Some(1),
        };
        assert_eq!(
            age_record(ttl, waited),
            LogRecord::SetTtl {
                key: "a".into(),
                ttl: Some(1)
            }
        );
    }
}
