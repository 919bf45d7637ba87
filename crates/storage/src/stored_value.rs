//! Storage-layer value wrapper with expiry metadata

/// A stored value with an absolute expiry
///
/// `expires_at` is milliseconds since the epoch; `0` means the value never
/// expires.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredValue<V> {
    value: V,
    expires_at: u64,
}

impl<V> StoredValue<V> {
    /// Create a stored value from a relative TTL in seconds (0 = never)
    pub fn new(value: V, ttl_secs: u64, now_ms: u64) -> Self {
        StoredValue {
            value,
            expires_at: expiry_from(ttl_secs, now_ms),
        }
    }

    /// Get the value
    #[inline]
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Consume and return the value
    #[inline]
    pub fn into_value(self) -> V {
        self.value
    }

    /// Absolute expiry in milliseconds, 0 = never
    #[inline]
    pub fn expires_at(&self) -> u64 {
        self.expires_at
    }

    /// Replace the expiry with a new relative TTL
    pub fn set_ttl(&mut self, ttl_secs: u64, now_ms: u64) {
        self.expires_at = expiry_from(ttl_secs, now_ms);
    }

    /// Check if this value has expired at `now_ms`
    #[inline]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at != 0 && now_ms >= self.expires_at
    }
}

fn expiry_from(ttl_secs: u64, now_ms: u64) -> u64 {
    if ttl_secs == 0 {
        0
    } else {
        now_ms.saturating_add(ttl_secs.saturating_mul(1000))
    }
}
