//! Sliding-window rate limiter keyed by `(platform, user_id)`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// How often (in calls to [`RateLimiter::check_rate_limit`]) the lazy
/// eviction sweep runs.
const EVICTION_SWEEP_INTERVAL: usize = 500;

/// A window untouched for this long is considered abandoned.
const IDLE_EVICTION_THRESHOLD: Duration = Duration::from_secs(600);

struct Window {
    max_actions: usize,
    timestamps: VecDeque<Instant>,
}

impl Window {
    fn new(max_actions: usize) -> Self {
        Self {
            max_actions,
            timestamps: VecDeque::new(),
        }
    }

    /// Returns `true` if under the limit; denial never consumes the budget.
    fn check_and_record(&mut self, period: Duration) -> bool {
        let now = Instant::now();
        self.timestamps.retain(|t| now.duration_since(*t) < period);
        if self.timestamps.len() >= self.max_actions {
            return false;
        }
        self.timestamps.push_back(now);
        true
    }
}

/// Token-bucket-style sliding window rate limiter, one window per
/// `(platform, user_id)` key, evicted lazily (empty windows are left in
/// place; they cost only a tiny `VecDeque` until the next eviction sweep).
pub struct RateLimiter {
    per_minute: usize,
    windows: DashMap<(String, String), Window>,
    calls_since_sweep: AtomicUsize,
}

impl RateLimiter {
    pub fn new(rate_limit_per_minute: usize) -> Self {
        Self {
            per_minute: rate_limit_per_minute,
            windows: DashMap::new(),
            calls_since_sweep: AtomicUsize::new(0),
        }
    }

    /// Returns `true` when `(platform, user_id)` is within its budget.
    /// Every [`EVICTION_SWEEP_INTERVAL`] calls, piggybacks a lazy sweep of
    /// windows idle for longer than [`IDLE_EVICTION_THRESHOLD`] — there is
    /// no dedicated background task, matching the spec's "evicted lazily".
    pub fn check_rate_limit(&self, platform: &str, user_id: &str) -> bool {
        let key = (platform.to_string(), user_id.to_string());
        let mut entry = self
            .windows
            .entry(key)
            .or_insert_with(|| Window::new(self.per_minute));
        let allowed = entry.check_and_record(Duration::from_secs(60));
        drop(entry);

        if self.calls_since_sweep.fetch_add(1, Ordering::Relaxed) + 1 >= EVICTION_SWEEP_INTERVAL {
            self.calls_since_sweep.store(0, Ordering::Relaxed);
            self.evict_idle(IDLE_EVICTION_THRESHOLD);
        }

        allowed
    }

    /// Drop windows that have had no activity for `idle_for`, bounding
    /// memory use across long-running processes.
    pub fn evict_idle(&self, idle_for: Duration) {
        let now = Instant::now();
        self.windows.retain(|_, w| {
            w.timestamps
                .back()
                .is_some_and(|t| now.duration_since(*t) < idle_for)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_limit_then_denies() {
        let limiter = RateLimiter::new(2);
        assert!(limiter.check_rate_limit("discord", "user1"));
        assert!(limiter.check_rate_limit("discord", "user1"));
        assert!(!limiter.check_rate_limit("discord", "user1"));
    }

    #[test]
    fn denial_does_not_consume_budget() {
        let limiter = RateLimiter::new(1);
        assert!(limiter.check_rate_limit("discord", "user1"));
        assert!(!limiter.check_rate_limit("discord", "user1"));
        // Still denied on a third call with the same (unconsumed) budget.
        assert!(!limiter.check_rate_limit("discord", "user1"));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new(1);
        assert!(limiter.check_rate_limit("discord", "user1"));
        assert!(limiter.check_rate_limit("discord", "user2"));
        assert!(limiter.check_rate_limit("signal", "user1"));
    }

    #[test]
    fn evict_idle_drops_only_stale_windows() {
        let limiter = RateLimiter::new(5);
        limiter.check_rate_limit("discord", "stale");
        std::thread::sleep(Duration::from_millis(20));
        limiter.check_rate_limit("discord", "fresh");

        limiter.evict_idle(Duration::from_millis(10));

        assert!(!limiter.windows.contains_key(&("discord".to_string(), "stale".to_string())));
        assert!(limiter.windows.contains_key(&("discord".to_string(), "fresh".to_string())));
    }
}
