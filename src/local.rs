//! Process-wide cache handle
//!
//! A single `DurableCache<serde_json::Value>` shared by the whole process,
//! with an explicit lifecycle: [`initiate`] opens it once, [`teardown`]
//! closes it. [`install`] injects an already opened cache, which is how
//! tests run against a scratch directory.
//!
//! [`set`] stretches every explicit TTL by a random amount of up to 10% so
//! that keys written together do not all expire together.
//!
//! Calls made before `initiate` (or after `teardown`) do nothing and return
//! the same defaults as a cache that refused the operation.

use std::sync::Arc;
use std::time::Duration;

use burrow_core::{ttl_secs, KeySelector, Result};
use burrow_engine::{CacheConfig, DurableCache};
use burrow_storage::StoreOptions;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rand::Rng;
use serde_json::Value;
use tracing::{info, warn};

/// Cache type held by the process-wide handle.
pub type LocalCache = DurableCache<Value>;

static CACHE: Lazy<RwLock<Option<Arc<LocalCache>>>> = Lazy::new(|| RwLock::new(None));

const DEFAULT_NAME: &str = "mycache";
const DEFAULT_PERIOD: Duration = Duration::from_millis(10_000);
const HALF_HOUR_SECS: u64 = 1800;
const FIFTEEN_MINUTES_SECS: u64 = 900;

/// Configuration used by [`initiate`] callers that have no opinion: cache
/// `mycache` in the home directory, 10s checkpoints, 30 minute default TTL
/// swept every 15 minutes.
pub fn default_config() -> CacheConfig {
    CacheConfig::new(DEFAULT_NAME)
        .with_period(DEFAULT_PERIOD)
        .with_store(
            StoreOptions::new()
                .with_std_ttl(HALF_HOUR_SECS)
                .with_check_period(FIFTEEN_MINUTES_SECS),
        )
}

/// Open the process-wide cache. Does nothing if one is already installed.
pub fn initiate(config: CacheConfig) -> Result<()> {
    let mut slot = CACHE.write();
    if slot.is_some() {
        return Ok(());
    }
    let cache = DurableCache::open(config)?;
    info!(cache = cache.name(), "Process-wide cache initiated");
    *slot = Some(Arc::new(cache));
    Ok(())
}

/// Install `cache` as the process-wide cache, returning the one it replaces.
///
/// The replaced cache is not closed; it closes when its last handle drops.
pub fn install(cache: LocalCache) -> Option<Arc<LocalCache>> {
    CACHE.write().replace(Arc::new(cache))
}

/// Close and remove the process-wide cache.
pub fn teardown() {
    let cache = CACHE.write().take();
    if let Some(cache) = cache {
        cache.close();
    }
}

/// True while a process-wide cache is installed.
pub fn is_initiated() -> bool {
    CACHE.read().is_some()
}

/// Handle to the installed cache.
pub fn handle() -> Option<Arc<LocalCache>> {
    CACHE.read().clone()
}

fn with_cache<T>(op: &str, fallback: T, f: impl FnOnce(&LocalCache) -> T) -> T {
    match handle() {
        Some(cache) => f(&cache),
        None => {
            warn!(op, "Process-wide cache not initiated");
            fallback
        }
    }
}

/// Current value of `key`.
pub fn get(key: &str) -> Option<Value> {
    with_cache("get", None, |cache| cache.get(key))
}

/// Store `value` under `key`.
///
/// A non-zero `ttl` is rounded up to whole seconds and extended by a
/// random jitter; `None` and zero are passed through unchanged.
pub fn set(key: &str, value: Value, ttl: Option<Duration>) -> bool {
    let ttl = ttl.map(|ttl| jittered_ttl(ttl, rand::thread_rng().gen::<f64>()));
    with_cache("set", false, |cache| cache.set(key, value, ttl))
}

/// Delete one or several keys.
pub fn del(keys: impl Into<KeySelector>) -> usize {
    with_cache("del", 0, |cache| cache.del(keys))
}

/// Expiry timestamp of `key` (see [`DurableCache::get_ttl`]).
pub fn get_ttl(key: &str) -> Option<u64> {
    with_cache("get_ttl", None, |cache| cache.get_ttl(key))
}

/// Remove every key.
pub fn flush_all() {
    with_cache("flush_all", (), |cache| cache.flush_all())
}

fn jittered_ttl(ttl: Duration, sample: f64) -> Duration {
    match ttl_secs(ttl) {
        0 => ttl,
        secs => Duration::from_secs(jittered_secs(secs, sample)),
    }
}

/// `secs` plus `floor(sample * round(secs / 10))`, `sample` in `[0, 1)`.
fn jittered_secs(secs: u64, sample: f64) -> u64 {
    let max_jitter = (secs as f64 * 0.1).round();
    secs + (sample * max_jitter).floor() as u64
}
