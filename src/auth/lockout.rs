//! Failed-login lockout policy.
//!
//! The policy itself is pure: it interprets the counters stored on a user
//! row. The store applies the transitions with single conditional updates.

use chrono::{DateTime, Duration, Utc};

use crate::config::LockoutConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    pub max_failed_attempts: u32,
    pub lock_duration: Duration,
}

impl LockoutPolicy {
    #[must_use]
    pub fn from_config(config: &LockoutConfig) -> Self {
        let seconds = i64::try_from(config.lock_duration_seconds).unwrap_or(i64::MAX);
        Self {
            max_failed_attempts: config.max_failed_attempts,
            lock_duration: Duration::try_seconds(seconds).unwrap_or(Duration::MAX),
        }
    }

    /// Where an account stands at `now`.
    #[must_use]
    pub fn state(
        &self,
        failed_attempts: i32,
        locked_until: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> LockState {
        match locked_until {
            Some(until) if now <= until => LockState::Locked { until },
            Some(_) => LockState::LockExpired,
            None => LockState::Unlocked {
                attempts: u32::try_from(failed_attempts).unwrap_or(0),
            },
        }
    }

    /// Lock expiry for a lock triggered at `now`, or `None` when the
    /// configured duration runs past the representable range.
    #[must_use]
    pub fn lock_deadline(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        now.checked_add_signed(self.lock_duration)
    }

    #[must_use]
    pub fn is_threshold_reached(&self, attempts: u32) -> bool {
        attempts >= self.max_failed_attempts
    }
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self::from_config(&LockoutConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Unlocked { attempts: u32 },
    Locked { until: DateTime<Utc> },
    /// The lock has run out but has not been cleared in storage yet.
    LockExpired,
}

impl LockState {
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        matches!(self, Self::Locked { .. })
    }
}
