//! In-memory store with TTL expiry
//!
//! `MemoryStore` is the default [`Store`] implementation:
//! - FxHashMap of key → StoredValue (value + absolute expiry)
//! - TTLIndex for O(expired) sweeps
//! - Lazy expiry on access plus an optional background cleaner
//!
//! # Expiry notifications
//!
//! Every key removed because its TTL elapsed fires the registered
//! [`ExpiredHandler`]s. Handlers run while the map lock is held, so the
//! expiry is ordered with respect to every other mutation of the same key.
//! A handler must not call back into the store.

use std::sync::Arc;

use burrow_core::{now_millis, CacheValue, ExpiredHandler, SetItem, Store};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tracing::{error, trace, warn};

use crate::cleaner::TTLCleaner;
use crate::options::StoreOptions;
use crate::stored_value::StoredValue;
use crate::ttl::TTLIndex;

struct StoreState<V> {
    data: FxHashMap<String, StoredValue<V>>,
    ttl_index: TTLIndex,
}

impl<V> StoreState<V> {
    fn insert(&mut self, key: String, value: StoredValue<V>) {
        self.remove(&key);
        if value.expires_at() != 0 {
            self.ttl_index.insert(value.expires_at(), key.clone());
        }
        self.data.insert(key, value);
    }

    fn remove(&mut self, key: &str) -> Option<StoredValue<V>> {
        let old = self.data.remove(key)?;
        if old.expires_at() != 0 {
            self.ttl_index.remove(old.expires_at(), key);
        }
        Some(old)
    }
}

pub(crate) struct StoreInner<V> {
    state: Mutex<StoreState<V>>,
    handlers: RwLock<Vec<ExpiredHandler<V>>>,
    options: StoreOptions,
}

impl<V: CacheValue> StoreInner<V> {
    /// Remove `key` if it has expired, firing handlers. Returns true if evicted.
    fn evict_if_expired(&self, state: &mut StoreState<V>, key: &str, now: u64) -> bool {
        let expired = state
            .data
            .get(key)
            .map(|sv| sv.is_expired(now))
            .unwrap_or(false);
        if !expired {
            return false;
        }
        if let Some(old) = state.remove(key) {
            trace!(key, "Key expired");
            for handler in self.handlers.read().iter() {
                handler(key, old.value());
            }
        }
        true
    }

    /// Evict every expired key. Returns how many were removed.
    pub(crate) fn sweep(&self) -> usize {
        let now = now_millis();
        let mut state = self.state.lock();
        let expired = state.ttl_index.find_expired(now);
        let mut count = 0;
        for key in expired {
            if self.evict_if_expired(&mut state, &key, now) {
                count += 1;
            }
        }
        count
    }

    fn admits(&self, state: &StoreState<V>, new_keys: usize) -> bool {
        match self.options.max_keys {
            Some(max) => state.data.len() + new_keys <= max,
            None => true,
        }
    }
}

/// Default in-memory [`Store`].
pub struct MemoryStore<V: CacheValue> {
    inner: Arc<StoreInner<V>>,
    cleaner: Mutex<Option<(TTLCleaner<V>, std::thread::JoinHandle<()>)>>,
}

impl<V: CacheValue> MemoryStore<V> {
    /// Create a store, starting the background cleaner when the options
    /// ask for one.
    pub fn new(options: StoreOptions) -> Self {
        let check_period = options.check_period();
        let inner = Arc::new(StoreInner {
            state: Mutex::new(StoreState {
                data: FxHashMap::default(),
                ttl_index: TTLIndex::new(),
            }),
            handlers: RwLock::new(Vec::new()),
            options,
        });

        let cleaner = check_period.and_then(|interval| {
            let cleaner = TTLCleaner::new(Arc::clone(&inner), interval);
            match cleaner.start() {
                Ok(handle) => Some((cleaner, handle)),
                Err(e) => {
                    // Lazy expiry on access still works without the sweeper
                    error!(error = %e, "Failed to spawn TTL cleaner thread");
                    None
                }
            }
        });

        MemoryStore {
            inner,
            cleaner: Mutex::new(cleaner),
        }
    }

    /// Options this store was created with.
    pub fn options(&self) -> &StoreOptions {
        &self.inner.options
    }

    /// Number of entries currently held, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.inner.state.lock().data.len()
    }

    /// True when the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run one expiry sweep now. Returns how many keys expired.
    pub fn sweep(&self) -> usize {
        self.inner.sweep()
    }

    #[cfg(test)]
    pub(crate) fn inner_for_tests(&self) -> &Arc<StoreInner<V>> {
        &self.inner
    }

    fn ttl_or_default(&self, ttl: Option<u64>) -> u64 {
        ttl.unwrap_or(self.inner.options.std_ttl_secs)
    }
}

impl<V: CacheValue> Store<V> for MemoryStore<V> {
    fn get(&self, key: &str) -> Option<V> {
        let now = now_millis();
        let mut state = self.inner.state.lock();
        if self.inner.evict_if_expired(&mut state, key, now) {
            return None;
        }
        state.data.get(key).map(|sv| sv.value().clone())
    }

    fn set(&self, key: &str, value: V, ttl: Option<u64>) -> bool {
        let ttl = self.ttl_or_default(ttl);
        let now = now_millis();
        let mut state = self.inner.state.lock();
        let is_new = !state.data.contains_key(key);
        if is_new && !self.inner.admits(&state, 1) {
            warn!(key, max_keys = ?self.inner.options.max_keys, "Store is full, set refused");
            return false;
        }
        state.insert(key.to_string(), StoredValue::new(value, ttl, now));
        true
    }

    fn mset(&self, items: Vec<SetItem<V>>) -> bool {
        let now = now_millis();
        let mut state = self.inner.state.lock();

        let mut new_keys: Vec<&str> = items
            .iter()
            .map(|item| item.key.as_str())
            .filter(|key| !state.data.contains_key(*key))
            .collect();
        new_keys.sort_unstable();
        new_keys.dedup();
        if !self.inner.admits(&state, new_keys.len()) {
            warn!(
                items = items.len(),
                max_keys = ?self.inner.options.max_keys,
                "Store is full, mset refused"
            );
            return false;
        }

        for item in items {
            let ttl = self.ttl_or_default(item.ttl);
            state.insert(item.key, StoredValue::new(item.val, ttl, now));
        }
        true
    }

    fn del(&self, keys: &[String]) -> usize {
        let mut state = self.inner.state.lock();
        keys.iter()
            .filter(|key| state.remove(key.as_str()).is_some())
            .count()
    }

    fn take(&self, key: &str) -> Option<V> {
        let now = now_millis();
        let mut state = self.inner.state.lock();
        if self.inner.evict_if_expired(&mut state, key, now) {
            return None;
        }
        state.remove(key).map(StoredValue::into_value)
    }

    fn ttl(&self, key: &str, ttl: Option<u64>) -> bool {
        let ttl = self.ttl_or_default(ttl);
        let now = now_millis();
        let mut state = self.inner.state.lock();
        if self.inner.evict_if_expired(&mut state, key, now) {
            return false;
        }
        match state.remove(key) {
            Some(mut sv) => {
                sv.set_ttl(ttl, now);
                state.insert(key.to_string(), sv);
                true
            }
            None => false,
        }
    }

    fn get_ttl(&self, key: &str) -> Option<u64> {
        let now = now_millis();
        let mut state = self.inner.state.lock();
        if self.inner.evict_if_expired(&mut state, key, now) {
            return None;
        }
        state.data.get(key).map(StoredValue::expires_at)
    }

    fn keys(&self) -> Vec<String> {
        let now = now_millis();
        let state = self.inner.state.lock();
        state
            .data
            .iter()
            .filter(|(_, sv)| !sv.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn on_expired(&self, handler: ExpiredHandler<V>) {
        self.inner.handlers.write().push(handler);
    }

    fn flush_all(&self) {
        let mut state = self.inner.state.lock();
        state.data.clear();
        state.ttl_index.clear();
    }

    fn close(&self) {
        if let Some((cleaner, handle)) = self.cleaner.lock().take() {
            cleaner.shutdown();
            let _ = handle.join();
        }
    }
}

impl<V: CacheValue> Drop for MemoryStore<V> {
    fn drop(&mut self) {
        <Self as Store<V>>::close(self);
    }
}
