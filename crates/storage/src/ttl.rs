//! TTL (Time-To-Live) index for efficient expiration cleanup
//!
//! This module provides TTLIndex that enables efficient queries for expired keys
//! without scanning the entire data store:
//! - Maps expiry timestamp (ms) → Set<key> using BTreeMap for sorted order
//! - find_expired() returns all keys expired at or before a given timestamp
//! - O(expired count) instead of O(total data)

use std::collections::{BTreeMap, HashSet};

/// TTL index: expiry_ms → keys
///
/// Keys that never expire are not tracked.
#[derive(Debug, Default)]
pub struct TTLIndex {
    index: BTreeMap<u64, HashSet<String>>,
}

impl TTLIndex {
    /// Create a new empty TTLIndex
    pub fn new() -> Self {
        Self {
            index: BTreeMap::new(),
        }
    }

    /// Add key to TTL index with given expiry timestamp
    pub fn insert(&mut self, expires_at: u64, key: String) {
        self.index.entry(expires_at).or_default().insert(key);
    }

    /// Remove key from TTL index at given expiry timestamp
    ///
    /// Used when a key is deleted, overwritten, or has its TTL changed.
    /// If the set becomes empty, removes the timestamp entry entirely.
    pub fn remove(&mut self, expires_at: u64, key: &str) {
        if let Some(keys) = self.index.get_mut(&expires_at) {
            keys.remove(key);
            if keys.is_empty() {
                self.index.remove(&expires_at);
            }
        }
    }

    /// Find all keys whose expiry is at or before `now`
    pub fn find_expired(&self, now: u64) -> Vec<String> {
        self.index
            .range(..=now)
            .flat_map(|(_, keys)| keys.iter().cloned())
            .collect()
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.index.clear();
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Get the total number of keys in the index
    pub fn len(&self) -> usize {
        self.index.values().map(|keys| keys.len()).sum()
    }

    /// Get the number of unique expiry timestamps
    pub fn timestamp_count(&self) -> usize {
        self.index.len()
    }
}
