//! Time utilities for Summoner
//!
//! Credential expiry is tracked as wall-clock `SystemTime`; these helpers keep
//! the arithmetic in one place.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Get the current Unix timestamp in seconds.
///
/// Returns 0 if the system clock is before the Unix epoch.
pub fn current_time_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Absolute expiry `ttl` from now
pub fn expiry_after(ttl: Duration) -> SystemTime {
    SystemTime::now() + ttl
}

/// Time remaining until `expiry`.
///
/// Returns Duration::ZERO if `expiry` is already in the past.
pub fn remaining(expiry: SystemTime) -> Duration {
    expiry
        .duration_since(SystemTime::now())
        .unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_time_secs_is_positive() {
        assert!(current_time_secs() > 0);
    }

    #[test]
    fn test_expiry_after_is_in_future() {
        let expiry = expiry_after(Duration::from_secs(900));
        assert!(expiry > SystemTime::now());
        assert!(remaining(expiry) <= Duration::from_secs(900));
        assert!(remaining(expiry) > Duration::from_secs(890));
    }

    #[test]
    fn test_remaining_past_expiry() {
        let past = SystemTime::now() - Duration::from_secs(10);
        assert_eq!(remaining(past), Duration::ZERO);
    }
}
