//! Burrow - durable in-process key/value cache
//!
//! Burrow keeps every key in memory and survives restarts by combining two
//! files per cache: a periodic full backup and an append-only journal of
//! the mutations made since that backup. Opening a cache loads the backup
//! and replays the journal on top of it.
//!
//! # Quick Start
//!
//! ```no_run
//! use burrow::{CacheConfig, DurableCache};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! let cache: DurableCache<serde_json::Value> =
//!     DurableCache::open(CacheConfig::new("sessions").with_dir("/var/lib/app"))?;
//!
//! cache.set("user:123", json!({"name": "Alice"}), Some(Duration::from_secs(1800)));
//! assert!(cache.get("user:123").is_some());
//! # Ok::<(), burrow::CacheError>(())
//! ```
//!
//! # Architecture
//!
//! - `burrow-core`: records, the `Store` trait, errors
//! - `burrow-storage`: the default in-memory store
//! - `burrow-durability`: codecs, journal, backup file, recovery
//! - `burrow-engine`: the `DurableCache` facade and its checkpoint thread
//!
//! [`local`] holds a process-wide cache for applications that want one.

pub mod local;

pub use burrow_core::{
    now_millis, CacheError, CacheValue, ExpiredHandler, KeySelector, LogRecord, Result, SetItem,
    SnapshotEntry, Store,
};
pub use burrow_durability::{
    CacheSerializer, CodecError, JournalCounters, JournalSync, RecoveryOutcome, RecoveryStats,
};
pub use burrow_engine::{CacheConfig, CacheStats, CheckpointOutcome, DurableCache};
pub use burrow_storage::{MemoryStore, StoreOptions};
