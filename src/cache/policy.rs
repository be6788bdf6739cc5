//! Cache Policy Module
//!
//! Time-based expiration and refresh settings, built once and shared by the engine.

use std::time::Duration;

use crate::error::{CacheError, Result};

// == Time Unit ==
/// Unit of a `(duration, unit)` pair handed to the policy builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Nanoseconds per unit.
    fn nanos(self) -> u64 {
        match self {
            TimeUnit::Nanoseconds => 1,
            TimeUnit::Microseconds => 1_000,
            TimeUnit::Milliseconds => 1_000_000,
            TimeUnit::Seconds => 1_000_000_000,
            TimeUnit::Minutes => 60 * 1_000_000_000,
            TimeUnit::Hours => 3_600 * 1_000_000_000,
            TimeUnit::Days => 86_400 * 1_000_000_000,
        }
    }

    /// Converts `amount` of this unit into a normalized `Duration`.
    ///
    /// Saturates at `u64::MAX` nanoseconds.
    pub fn to_duration(self, amount: u64) -> Duration {
        Duration::from_nanos(amount.saturating_mul(self.nanos()))
    }
}

// == Cache Policy ==
/// Expiration and refresh intervals. A zero duration disables the setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CachePolicy {
    expire_after_access: Duration,
    expire_after_write: Duration,
    refresh_after_write: Duration,
}

impl CachePolicy {
    /// Starts a builder with every setting disabled.
    pub fn builder() -> CachePolicyBuilder {
        CachePolicyBuilder::default()
    }

    pub fn expire_after_access(&self) -> Duration {
        self.expire_after_access
    }

    pub fn expire_after_write(&self) -> Duration {
        self.expire_after_write
    }

    pub fn refresh_after_write(&self) -> Duration {
        self.refresh_after_write
    }

    /// True when reads must be timestamped.
    pub fn records_access(&self) -> bool {
        !self.expire_after_access.is_zero()
    }

    /// True when writes must be timestamped.
    pub fn records_write(&self) -> bool {
        !self.expire_after_write.is_zero() || !self.refresh_after_write.is_zero()
    }

    pub fn expires(&self) -> bool {
        !self.expire_after_access.is_zero() || !self.expire_after_write.is_zero()
    }

    pub fn refreshes(&self) -> bool {
        !self.refresh_after_write.is_zero()
    }
}

// == Cache Policy Builder ==
/// Validating builder for [`CachePolicy`].
///
/// ```
/// use stampede::cache::{CachePolicy, TimeUnit};
///
/// let policy = CachePolicy::builder()
///     .expire_after_write(10, TimeUnit::Minutes)?
///     .refresh_after_write(30, TimeUnit::Seconds)?
///     .build();
/// assert!(policy.refreshes());
/// # Ok::<(), stampede::error::CacheError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct CachePolicyBuilder {
    policy: CachePolicy,
}

impl CachePolicyBuilder {
    /// Expire entries once `duration` has elapsed since their last read or write.
    pub fn expire_after_access(mut self, duration: i64, unit: TimeUnit) -> Result<Self> {
        self.policy.expire_after_access = normalize("expire_after_access", duration, unit)?;
        Ok(self)
    }

    /// Expire entries once `duration` has elapsed since they were written.
    pub fn expire_after_write(mut self, duration: i64, unit: TimeUnit) -> Result<Self> {
        self.policy.expire_after_write = normalize("expire_after_write", duration, unit)?;
        Ok(self)
    }

    /// Refresh entries in the background once `duration` has elapsed since they
    /// were written. Stale values keep being served while the refresh runs.
    pub fn refresh_after_write(mut self, duration: i64, unit: TimeUnit) -> Result<Self> {
        self.policy.refresh_after_write = normalize("refresh_after_write", duration, unit)?;
        Ok(self)
    }

    pub fn expire_after_access_duration(mut self, duration: Duration) -> Self {
        self.policy.expire_after_access = duration;
        self
    }

    pub fn expire_after_write_duration(mut self, duration: Duration) -> Self {
        self.policy.expire_after_write = duration;
        self
    }

    pub fn refresh_after_write_duration(mut self, duration: Duration) -> Self {
        self.policy.refresh_after_write = duration;
        self
    }

    pub fn build(self) -> CachePolicy {
        self.policy
    }
}

fn normalize(setting: &str, duration: i64, unit: TimeUnit) -> Result<Duration> {
    let amount = u64::try_from(duration).map_err(|_| {
        CacheError::InvalidArgument(format!(
            "{} must not be negative, got {} {:?}",
            setting, duration, unit
        ))
    })?;
    Ok(unit.to_duration(amount))
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_disabled() {
        let policy = CachePolicy::default();
        assert!(!policy.expires());
        assert!(!policy.refreshes());
        assert!(!policy.records_access());
        assert!(!policy.records_write());
    }

    #[test]
    fn test_builder_normalizes_units() {
        let policy = CachePolicy::builder()
            .expire_after_access(2, TimeUnit::Minutes)
            .unwrap()
            .expire_after_write(1500, TimeUnit::Milliseconds)
            .unwrap()
            .refresh_after_write(250, TimeUnit::Microseconds)
            .unwrap()
            .build();

        assert_eq!(policy.expire_after_access(), Duration::from_secs(120));
        assert_eq!(policy.expire_after_write(), Duration::from_millis(1500));
        assert_eq!(policy.refresh_after_write(), Duration::from_micros(250));
        assert!(policy.records_access());
        assert!(policy.records_write());
    }

    #[test]
    fn test_negative_duration_rejected() {
        let result = CachePolicy::builder().expire_after_write(-1, TimeUnit::Seconds);
        assert!(matches!(result, Err(CacheError::InvalidArgument(_))));

        let result = CachePolicy::builder().refresh_after_write(-5, TimeUnit::Days);
        assert!(matches!(result, Err(CacheError::InvalidArgument(_))));
    }

    #[test]
    fn test_zero_duration_disables() {
        let policy = CachePolicy::builder()
            .expire_after_write(0, TimeUnit::Hours)
            .unwrap()
            .build();
        assert!(!policy.expires());
    }

    #[test]
    fn test_refresh_alone_records_writes() {
        let policy = CachePolicy::builder()
            .refresh_after_write_duration(Duration::from_secs(1))
            .build();
        assert!(policy.records_write());
        assert!(!policy.records_access());
        assert!(!policy.expires());
    }

    #[test]
    fn test_huge_duration_saturates() {
        let policy = CachePolicy::builder()
            .expire_after_write(i64::MAX, TimeUnit::Days)
            .unwrap()
            .build();
        assert_eq!(policy.expire_after_write(), Duration::from_nanos(u64::MAX));
    }
}
