//! Journal and snapshot record types
//!
//! The serde shape of these types is the on-disk contract of the default
//! line-delimited codec:
//!
//! ```text
//! {"cmd":"set","key":"foo","val":"bar","ttl":10}
//! {"cmd":"mset","keyValue":[{"key":"a","val":1},{"key":"b","val":2,"ttl":5}]}
//! {"cmd":"del","key":"foo"}
//! {"cmd":"del","key":["a","b"]}
//! {"cmd":"ttl","key":"foo","ttl":1}
//! ```
//!
//! A snapshot is an array of `{"key":..,"val":..,"ttl":<expiry ms or 0>}`.

use serde::{Deserialize, Serialize};

use crate::traits::Store;
use crate::value::CacheValue;

/// One key/value pair of a bulk set.
///
/// `ttl` is a relative TTL in whole seconds; `None` means "use the store's
/// default TTL" and `Some(0)` means "never expires".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetItem<V> {
    /// Key
    pub key: String,
    /// Value
    pub val: V,
    /// Relative TTL in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
}

impl<V> SetItem<V> {
    /// Create an item that uses the store's default TTL
    pub fn new(key: impl Into<String>, val: V) -> Self {
        SetItem {
            key: key.into(),
            val,
            ttl: None,
        }
    }

    /// Set an explicit TTL in seconds (builder pattern)
    pub fn with_ttl(mut self, ttl_secs: u64) -> Self {
        self.ttl = Some(ttl_secs);
        self
    }
}

/// Target of a delete: one key or many.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeySelector {
    /// A single key
    One(String),
    /// Several keys, deleted together
    Many(Vec<String>),
}

impl KeySelector {
    /// Flatten into the list of keys it names.
    pub fn into_keys(self) -> Vec<String> {
        match self {
            KeySelector::One(key) => vec![key],
            KeySelector::Many(keys) => keys,
        }
    }

    /// Number of keys named.
    pub fn len(&self) -> usize {
        match self {
            KeySelector::One(_) => 1,
            KeySelector::Many(keys) => keys.len(),
        }
    }

    /// True when no key is named.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&str> for KeySelector {
    fn from(key: &str) -> Self {
        KeySelector::One(key.to_string())
    }
}

impl From<String> for KeySelector {
    fn from(key: String) -> Self {
        KeySelector::One(key)
    }
}

impl From<Vec<String>> for KeySelector {
    fn from(keys: Vec<String>) -> Self {
        KeySelector::Many(keys)
    }
}

impl From<&[&str]> for KeySelector {
    fn from(keys: &[&str]) -> Self {
        KeySelector::Many(keys.iter().map(|k| k.to_string()).collect())
    }
}

/// One journaled mutation.
///
/// Replaying every record in order against the store that a snapshot was
/// loaded into reproduces the state at the time the last record was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum LogRecord<V> {
    /// Single-key set
    #[serde(rename = "set")]
    Set {
        /// Key
        key: String,
        /// Value
        val: V,
        /// Relative TTL in seconds
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ttl: Option<u64>,
    },

    /// Bulk set, applied in order
    #[serde(rename = "mset")]
    MultiSet {
        /// Items to set
        #[serde(rename = "keyValue")]
        entries: Vec<SetItem<V>>,
    },

    /// Delete of one or several keys
    #[serde(rename = "del")]
    Delete {
        /// Keys to delete
        key: KeySelector,
    },

    /// TTL update of an existing key
    #[serde(rename = "ttl")]
    SetTtl {
        /// Key
        key: String,
        /// New relative TTL in seconds; `None` resets to the default TTL
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ttl: Option<u64>,
    },
}

impl<V> LogRecord<V> {
    /// Synthetic single-key delete (used for `take` and expiry events).
    pub fn delete_one(key: impl Into<String>) -> Self {
        LogRecord::Delete {
            key: KeySelector::One(key.into()),
        }
    }

    /// Wire tag of this record (`set`, `mset`, `del`, `ttl`).
    pub fn cmd(&self) -> &'static str {
        match self {
            LogRecord::Set { .. } => "set",
            LogRecord::MultiSet { .. } => "mset",
            LogRecord::Delete { .. } => "del",
            LogRecord::SetTtl { .. } => "ttl",
        }
    }
}

impl<V: CacheValue> LogRecord<V> {
    /// Apply this record directly to a store, bypassing any journaling.
    ///
    /// Used by recovery replay.
    pub fn apply<S: Store<V> + ?Sized>(self, store: &S) {
        match self {
            LogRecord::Set { key, val, ttl } => {
                store.set(&key, val, ttl);
            }
            LogRecord::MultiSet { entries } => {
                store.mset(entries);
            }
            LogRecord::Delete { key } => {
                store.del(&key.into_keys());
            }
            LogRecord::SetTtl { key, ttl } => {
                store.ttl(&key, ttl);
            }
        }
    }
}

/// One live key captured at checkpoint time.
///
/// `expires_at` is an absolute timestamp in milliseconds since the epoch,
/// `0` meaning the key never expires. It is stored under the `ttl` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry<V> {
    /// Key
    pub key: String,
    /// Value
    pub val: V,
    /// Absolute expiry in milliseconds, 0 = none
    #[serde(rename = "ttl", default)]
    pub expires_at: u64,
}
