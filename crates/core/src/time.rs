//! Wall-clock helpers shared by the store and the durability layer.
//!
//! Expiry timestamps are milliseconds since the Unix epoch, `0` meaning
//! "never expires". Relative TTLs travel as whole seconds.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Convert an API-level TTL to whole seconds, rounding up.
///
/// `Duration::ZERO` maps to `0` (never expires); any non-zero duration maps
/// to at least one second so a short TTL never turns into "unlimited".
pub fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

/// Seconds left until `expires_at_ms`, rounded up.
///
/// Returns `None` when the deadline has already passed.
pub fn remaining_secs(expires_at_ms: u64, now_ms: u64) -> Option<u64> {
    if expires_at_ms <= now_ms {
        return None;
    }
    Some(ttl_secs(Duration::from_millis(expires_at_ms - now_ms)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_secs_rounds_up() {
        assert_eq!(ttl_secs(Duration::ZERO), 0);
        assert_eq!(ttl_secs(Duration::from_millis(1)), 1);
        assert_eq!(ttl_secs(Duration::from_secs(10)), 10);
        assert_eq!(ttl_secs(Duration::from_millis(10_001)), 11);
    }

    #[test]
    fn test_remaining_secs() {
        assert_eq!(remaining_secs(1_000, 2_000), None);
        assert_eq!(remaining_secs(2_000, 2_000), None);
        assert_eq!(remaining_secs(2_500, 2_000), Some(1));
        assert_eq!(remaining_secs(12_000, 2_000), Some(10));
    }

    #[test]
    fn test_now_is_after_2020() {
        assert!(now_millis() > 1_577_836_800_000);
    }
}
