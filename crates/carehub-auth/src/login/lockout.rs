//! Exponential backoff after PIN mismatches.

use std::time::Duration as StdDuration;

use time::{Duration, OffsetDateTime, PrimitiveDateTime};

use crate::config::LockoutConfig;

/// Computes how long a user must wait after consecutive PIN mismatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    base: StdDuration,
    cap: u32,
}

impl LockoutPolicy {
    #[must_use]
    pub fn new(base: StdDuration, cap: u32) -> Self {
        Self { base, cap }
    }

    /// `base * 2^min(failed_count, cap)`, saturating.
    #[must_use]
    pub fn backoff(&self, failed_count: u32) -> Duration {
        let exponent = failed_count.min(self.cap);
        let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        let delay = self.base.checked_mul(factor).unwrap_or(StdDuration::MAX);
        Duration::try_from(delay).unwrap_or(Duration::MAX)
    }

    /// Instant at which the next attempt is accepted.
    #[must_use]
    pub fn next_allowed_login(&self, failed_count: u32, now: OffsetDateTime) -> OffsetDateTime {
        now.checked_add(self.backoff(failed_count))
            .unwrap_or(PrimitiveDateTime::MAX.assume_utc())
    }
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        LockoutConfig::default().into()
    }
}

impl From<LockoutConfig> for LockoutPolicy {
    fn from(config: LockoutConfig) -> Self {
        Self::new(config.base, config.cap)
    }
}

impl From<&LockoutConfig> for LockoutPolicy {
    fn from(config: &LockoutConfig) -> Self {
        Self::new(config.base, config.cap)
    }
}

/// Whole seconds until `until`, rounded up. Zero if already past.
#[must_use]
pub fn retry_after_seconds(until: OffsetDateTime, now: OffsetDateTime) -> i64 {
    let remaining = until - now;
    if remaining <= Duration::ZERO {
        return 0;
    }
    let secs = remaining.whole_seconds();
    if remaining > Duration::seconds(secs) {
        secs + 1
    } else {
        secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_until_cap() {
        let policy = LockoutPolicy::new(StdDuration::from_secs(3), 4);
        assert_eq!(policy.backoff(0), Duration::seconds(3));
        assert_eq!(policy.backoff(1), Duration::seconds(6));
        assert_eq!(policy.backoff(2), Duration::seconds(12));
        assert_eq!(policy.backoff(4), Duration::seconds(48));
        assert_eq!(policy.backoff(5), Duration::seconds(48));
        assert_eq!(policy.backoff(100), Duration::seconds(48));
    }

    #[test]
    fn test_backoff_is_monotonic() {
        let policy = LockoutPolicy::default();
        let mut previous = Duration::ZERO;
        for count in 0..40 {
            let current = policy.backoff(count);
            assert!(current >= previous, "backoff decreased at count {count}");
            previous = current;
        }
    }

    #[test]
    fn test_huge_cap_saturates() {
        let policy = LockoutPolicy::new(StdDuration::from_secs(3), u32::MAX);
        let now = OffsetDateTime::now_utc();
        assert!(policy.next_allowed_login(u32::MAX, now) > now);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let now = OffsetDateTime::now_utc();
        assert_eq!(retry_after_seconds(now + Duration::milliseconds(1500), now), 2);
        assert_eq!(retry_after_seconds(now + Duration::seconds(6), now), 6);
        assert_eq!(retry_after_seconds(now - Duration::seconds(1), now), 0);
    }
}
