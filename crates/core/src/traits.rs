//! Store abstraction
//!
//! The durability layer never owns an associative data structure of its
//! own. It drives a `Store` through this trait: every journaled mutation is
//! a call on the store followed by a journal append, and every checkpoint
//! is an enumeration of the store.
//!
//! Thread safety: all methods must be safe to call concurrently from
//! multiple threads (requires Send + Sync).

use crate::types::SetItem;

/// Callback invoked with `(key, value)` when a key expires.
///
/// Implementations may call handlers while holding internal locks, so a
/// handler must never call back into the store that invoked it.
pub type ExpiredHandler<V> = Box<dyn Fn(&str, &V) + Send + Sync>;

/// In-memory key/value store with per-key TTL.
///
/// TTL arguments are relative whole seconds: `None` selects the store's
/// default TTL, `Some(0)` means the key never expires.
pub trait Store<V>: Send + Sync {
    /// Current value for `key`, or `None` if absent or expired.
    fn get(&self, key: &str) -> Option<V>;

    /// Insert or overwrite `key`. Returns `false` if the store refused it.
    fn set(&self, key: &str, value: V, ttl: Option<u64>) -> bool;

    /// Insert several items in order. Returns `false` if the store refused them.
    fn mset(&self, items: Vec<SetItem<V>>) -> bool;

    /// Delete keys, returning how many existed.
    fn del(&self, keys: &[String]) -> usize;

    /// Remove `key` and return its value.
    fn take(&self, key: &str) -> Option<V>;

    /// Redefine the TTL of an existing key. Returns `false` if the key is absent.
    fn ttl(&self, key: &str, ttl: Option<u64>) -> bool;

    /// Expiry of `key`: `None` if absent, `Some(0)` if it never expires,
    /// otherwise the absolute expiry in milliseconds since the epoch.
    fn get_ttl(&self, key: &str) -> Option<u64>;

    /// All live keys.
    fn keys(&self) -> Vec<String>;

    /// Register a handler fired for every key that expires.
    fn on_expired(&self, handler: ExpiredHandler<V>);

    /// Remove every key without firing expiry handlers.
    fn flush_all(&self);

    /// Stop any background work owned by the store.
    fn close(&self) {}
}
