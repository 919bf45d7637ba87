//! Store options
//!
//! Passed through untouched by the durability layer; only the store
//! interprets them.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Options for [`MemoryStore`](crate::MemoryStore).
///
/// # Example
///
/// ```toml
/// [store]
/// std_ttl_secs = 1800      # default TTL, 0 = unlimited
/// check_period_secs = 900  # expiry sweep interval, 0 = lazy expiry only
/// max_keys = 100000        # optional cap on live keys
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreOptions {
    /// Default TTL in seconds applied when a set carries none (0 = unlimited)
    #[serde(default)]
    pub std_ttl_secs: u64,

    /// Interval of the background expiry sweep in seconds (0 disables it)
    #[serde(default = "default_check_period_secs")]
    pub check_period_secs: u64,

    /// Maximum number of keys; inserts of new keys beyond it are refused
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_keys: Option<usize>,
}

fn default_check_period_secs() -> u64 {
    600
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            std_ttl_secs: 0,
            check_period_secs: default_check_period_secs(),
            max_keys: None,
        }
    }
}

impl StoreOptions {
    /// Create options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default TTL (builder pattern).
    pub fn with_std_ttl(mut self, secs: u64) -> Self {
        self.std_ttl_secs = secs;
        self
    }

    /// Set the expiry sweep interval (builder pattern).
    pub fn with_check_period(mut self, secs: u64) -> Self {
        self.check_period_secs = secs;
        self
    }

    /// Cap the number of keys (builder pattern).
    pub fn with_max_keys(mut self, max: usize) -> Self {
        self.max_keys = Some(max);
        self
    }

    /// Sweep interval, or `None` when sweeping is disabled.
    pub fn check_period(&self) -> Option<Duration> {
        if self.check_period_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.check_period_secs))
        }
    }
}
