//! TTL cleanup background task
//!
//! This module provides TTLCleaner that runs in a background thread
//! and periodically evicts expired keys from a `MemoryStore`.
//!
//! # Design Notes
//!
//! - Evictions go through the same path as lazy expiry, so expiry handlers fire
//! - Runs in background thread, doesn't block writes for longer than one sweep
//! - Graceful shutdown via atomic flag
//! - Configurable check interval

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use burrow_core::CacheValue;
use tracing::debug;

use crate::memory::StoreInner;

/// Background TTL cleanup task
pub(crate) struct TTLCleaner<V> {
    store: Arc<StoreInner<V>>,
    check_interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl<V: CacheValue> TTLCleaner<V> {
    /// Create a new TTL cleaner
    pub(crate) fn new(store: Arc<StoreInner<V>>, check_interval: Duration) -> Self {
        Self {
            store,
            check_interval,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the background cleanup task
    ///
    /// The thread runs until `shutdown()` is called.
    pub(crate) fn start(&self) -> std::io::Result<JoinHandle<()>> {
        let store = Arc::clone(&self.store);
        let shutdown = Arc::clone(&self.shutdown);
        let check_interval = self.check_interval;

        thread::Builder::new()
            .name("burrow-ttl".to_string())
            .spawn(move || {
                while !shutdown.load(Ordering::Relaxed) {
                    // Sleep first (don't sweep immediately on start).
                    // Short slices keep shutdown responsive.
                    let sleep_interval = Duration::from_millis(100).min(check_interval);
                    let mut elapsed = Duration::ZERO;

                    while elapsed < check_interval {
                        if shutdown.load(Ordering::Relaxed) {
                            return;
                        }
                        thread::sleep(sleep_interval);
                        elapsed += sleep_interval;
                    }

                    let evicted = store.sweep();
                    if evicted > 0 {
                        debug!(evicted, "TTL sweep evicted expired keys");
                    }
                }
            })
    }

    /// Signal shutdown (for graceful termination)
    pub(crate) fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Check if shutdown has been signaled
    #[cfg(test)]
    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}
