//! Per-client request budgets over fixed windows.
//!
//! Counters live in memory and are keyed by bucket and client address. The
//! window length and budgets come from [`RateLimitConfig`]; time comes from
//! the injected [`Clock`].

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::clock::Clock;
use crate::config::RateLimitConfig;

/// Stale windows are swept roughly once per this many checks.
const EVICTION_INTERVAL: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    /// Register and login share one budget.
    Auth,
    Refresh,
}

impl Bucket {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Refresh => "refresh",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: u32 },
    Limited { retry_after_secs: u64 },
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    started: DateTime<Utc>,
}

pub struct RateLimiter {
    enabled: bool,
    window: Duration,
    auth_max: u32,
    refresh_max: u32,
    windows: Mutex<HashMap<(Bucket, String), Window>>,
    checks: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("enabled", &self.enabled)
            .field("window", &self.window)
            .field("auth_max", &self.auth_max)
            .field("refresh_max", &self.refresh_max)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        let seconds = i64::try_from(config.window_seconds).unwrap_or(i64::MAX);
        Self {
            enabled: config.enabled,
            window: Duration::try_seconds(seconds).unwrap_or(Duration::MAX),
            auth_max: config.auth_max_requests,
            refresh_max: config.refresh_max_requests,
            windows: Mutex::new(HashMap::new()),
            checks: AtomicU64::new(0),
            clock,
        }
    }

    const fn budget(&self, bucket: Bucket) -> u32 {
        match bucket {
            Bucket::Auth => self.auth_max,
            Bucket::Refresh => self.refresh_max,
        }
    }

    /// Counts one request from `client` against `bucket`.
    ///
    /// A refused request is not counted, so the window still ends on time.
    pub async fn check(&self, bucket: Bucket, client: &str) -> Decision {
        let budget = self.budget(bucket);
        if !self.enabled {
            return Decision::Allowed { remaining: budget };
        }

        let now = self.clock.now();
        let mut windows = self.windows.lock().await;

        if self.checks.fetch_add(1, Ordering::Relaxed) % EVICTION_INTERVAL == 0 {
            windows.retain(|_, w| now.signed_duration_since(w.started) < self.window);
        }

        let window = windows
            .entry((bucket, client.to_string()))
            .or_insert(Window {
                count: 0,
                started: now,
            });

        let elapsed = now.signed_duration_since(window.started);
        if elapsed >= self.window || elapsed < Duration::zero() {
            *window = Window {
                count: 0,
                started: now,
            };
        }

        if window.count >= budget {
            let left = self.window - now.signed_duration_since(window.started);
            let millis = left.num_milliseconds().max(1);
            let retry_after_secs = u64::try_from((millis + 999) / 1000).unwrap_or(1);
            return Decision::Limited { retry_after_secs };
        }

        window.count += 1;
        Decision::Allowed {
            remaining: budget - window.count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn limiter(clock: &ManualClock, max: u32) -> RateLimiter {
        RateLimiter::new(
            &RateLimitConfig {
                enabled: true,
                window_seconds: 60,
                auth_max_requests: max,
                refresh_max_requests: max * 2,
            },
            Arc::new(clock.clone()),
        )
    }

    #[tokio::test]
    async fn refuses_once_the_budget_is_spent() {
        let clock = ManualClock::new(Utc::now());
        let limiter = limiter(&clock, 3);

        for remaining in [2, 1, 0] {
            assert_eq!(
                limiter.check(Bucket::Auth, "198.51.100.1").await,
                Decision::Allowed { remaining }
            );
        }
        assert_eq!(
            limiter.check(Bucket::Auth, "198.51.100.1").await,
            Decision::Limited {
                retry_after_secs: 60
            }
        );

        clock.advance(Duration::seconds(45));
        assert_eq!(
            limiter.check(Bucket::Auth, "198.51.100.1").await,
            Decision::Limited {
                retry_after_secs: 15
            }
        );
    }

    #[tokio::test]
    async fn budgets_are_per_client_and_per_bucket() {
        let clock = ManualClock::new(Utc::now());
        let limiter = limiter(&clock, 1);

        assert!(matches!(
            limiter.check(Bucket::Auth, "198.51.100.1").await,
            Decision::Allowed { .. }
        ));
        assert!(matches!(
            limiter.check(Bucket::Auth, "198.51.100.1").await,
            Decision::Limited { .. }
        ));
        assert!(matches!(
            limiter.check(Bucket::Auth, "198.51.100.2").await,
            Decision::Allowed { .. }
        ));
        assert_eq!(
            limiter.check(Bucket::Refresh, "198.51.100.1").await,
            Decision::Allowed { remaining: 1 }
        );
    }

    #[tokio::test]
    async fn new_window_restores_the_budget() {
        let clock = ManualClock::new(Utc::now());
        let limiter = limiter(&clock, 1);

        limiter.check(Bucket::Auth, "198.51.100.1").await;
        assert!(matches!(
            limiter.check(Bucket::Auth, "198.51.100.1").await,
            Decision::Limited { .. }
        ));

        clock.advance(Duration::seconds(60));
        assert_eq!(
            limiter.check(Bucket::Auth, "198.51.100.1").await,
            Decision::Allowed { remaining: 0 }
        );
    }

    #[tokio::test]
    async fn disabled_limiter_never_refuses() {
        let clock = ManualClock::new(Utc::now());
        let limiter = RateLimiter::new(
            &RateLimitConfig {
                enabled: false,
                auth_max_requests: 1,
                ..RateLimitConfig::default()
            },
            Arc::new(clock),
        );

        for _ in 0..5 {
            assert!(matches!(
                limiter.check(Bucket::Auth, "198.51.100.1").await,
                Decision::Allowed { .. }
            ));
        }
    }
}
