//! Per-key fixed-window rate limiting.
//!
//! # Algorithm
//!
//! Each API key owns a [`RateLimitWindow`]: a request counter and the epoch
//! second at which its current window started. A window lasts
//! [`WINDOW_SECONDS`]. The first request at or after `start + 60` resets the
//! window to begin at that request's time, never at an earlier boundary.
//!
//! Within a window a request is allowed while `count < limit`; an allowed
//! request increments the counter in the same locked step, a denied one does
//! not. Bursts of up to twice the limit across a window edge are possible and
//! accepted; this is a fixed window, not a sliding window or token bucket.
//!
//! # Concurrency
//!
//! Windows live in a sharded [`DashMap`], one `parking_lot::Mutex` per key.
//! The map shard is only held long enough to find (or lazily create) the
//! key's slot; the check-and-increment runs under the per-key mutex, so
//! unrelated keys never wait on each other and the count for one key cannot
//! overshoot the limit.
//!
//! # Response Headers
//!
//! [`RateLimitStatus`] carries everything needed for:
//! - `X-RateLimit-Limit`: configured per-minute limit
//! - `X-RateLimit-Remaining`: requests left in the current window
//! - `X-RateLimit-Reset`: epoch second at which the window resets
//!
//! # Memory
//!
//! Windows are created on first use. [`FixedWindowRateLimiter::purge_idle`]
//! drops windows that have not restarted for a while; a purged key simply
//! starts a fresh window on its next request.

use std::fmt;
use std::num::NonZeroU32;

use axum::http::HeaderValue;
use axum::http::header::{HeaderMap, HeaderName};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

/// Length of a rate-limit window in seconds.
pub const WINDOW_SECONDS: i64 = 60;

/// Header carrying the configured limit.
pub const RATE_LIMIT_LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");

/// Header carrying the remaining quota in the current window.
pub const RATE_LIMIT_REMAINING_HEADER: HeaderName =
    HeaderName::from_static("x-ratelimit-remaining");

/// Header carrying the epoch second at which the window resets.
pub const RATE_LIMIT_RESET_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Error type for rate limiter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitError {
    /// The per-minute limit cannot be zero.
    ZeroLimit,
}

impl fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitError::ZeroLimit => {
                write!(f, "rate limit per minute must be greater than 0")
            }
        }
    }
}

impl std::error::Error for RateLimitError {}

/// Mutable counter state for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitWindow {
    /// Requests admitted in this window.
    pub count: u32,
    /// Epoch second at which this window started.
    pub window_start: i64,
}

impl RateLimitWindow {
    fn starting_at(now: i64) -> Self {
        Self {
            count: 0,
            window_start: now,
        }
    }

    fn is_expired(&self, now: i64) -> bool {
        now - self.window_start >= WINDOW_SECONDS
    }

    fn reset_at(&self) -> i64 {
        self.window_start + WINDOW_SECONDS
    }
}

/// Outcome of a single check-and-increment, captured under the key's lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    /// Whether the request was admitted.
    pub allowed: bool,
    /// Configured per-minute limit.
    pub limit: u32,
    /// Requests left in the window after this one.
    pub remaining: u32,
    /// Epoch second at which the window resets.
    pub reset_at: i64,
}

impl RateLimitStatus {
    /// Write the three `X-RateLimit-*` headers into `headers`.
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert(RATE_LIMIT_LIMIT_HEADER, HeaderValue::from(self.limit));
        headers.insert(
            RATE_LIMIT_REMAINING_HEADER,
            HeaderValue::from(self.remaining),
        );
        headers.insert(RATE_LIMIT_RESET_HEADER, HeaderValue::from(self.reset_at));
    }
}

/// Concurrency-safe fixed-window limiter keyed by API key.
pub struct FixedWindowRateLimiter {
    limit: NonZeroU32,
    windows: DashMap<String, Mutex<RateLimitWindow>>,
}

impl fmt::Debug for FixedWindowRateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedWindowRateLimiter")
            .field("limit", &self.limit)
            .field("windows", &self.windows.len())
            .finish()
    }
}

impl FixedWindowRateLimiter {
    /// Create a limiter admitting `limit_per_minute` requests per key per window.
    ///
    /// # Errors
    ///
    /// Returns `RateLimitError::ZeroLimit` if `limit_per_minute` is 0.
    pub fn new(limit_per_minute: u32) -> Result<Self, RateLimitError> {
        let limit = NonZeroU32::new(limit_per_minute).ok_or(RateLimitError::ZeroLimit)?;
        Ok(Self {
            limit,
            windows: DashMap::new(),
        })
    }

    /// Configured per-minute limit.
    pub fn limit(&self) -> u32 {
        self.limit.get()
    }

    /// Atomically check the key's window and consume one request if allowed.
    pub fn check(&self, key: &str, now: i64) -> RateLimitStatus {
        let limit = self.limit.get();

        self.with_window(key, now, |window| {
            if window.is_expired(now) {
                debug!(
                    previous_count = window.count,
                    "Rate limit window expired, starting a new one"
                );
                *window = RateLimitWindow::starting_at(now);
            }

            let allowed = window.count < limit;
            if allowed {
                window.count += 1;
            } else {
                debug!(count = window.count, limit, "Rate limit window exhausted");
            }

            RateLimitStatus {
                allowed,
                limit,
                remaining: limit.saturating_sub(window.count),
                reset_at: window.reset_at(),
            }
        })
    }

    /// Check-and-increment, returning only whether the request is allowed.
    pub fn is_allowed(&self, key: &str, now: i64) -> bool {
        self.check(key, now).allowed
    }

    /// Requests left in the key's current window without consuming one.
    ///
    /// Unknown keys and expired windows report the full limit.
    pub fn remaining_requests(&self, key: &str, now: i64) -> u32 {
        let limit = self.limit.get();
        self.peek(key, now)
            .map_or(limit, |window| limit.saturating_sub(window.count))
    }

    /// Epoch second at which the key's current window resets.
    ///
    /// Unknown keys and expired windows report `now + 60`, the reset time of
    /// a window that would start with the next request.
    pub fn reset_time(&self, key: &str, now: i64) -> i64 {
        self.peek(key, now)
            .map_or(now + WINDOW_SECONDS, |window| window.reset_at())
    }

    /// Drop expired windows that started more than `idle_ttl_secs` ago.
    ///
    /// A window that is still live is never dropped, whatever the TTL, so a
    /// purge cannot reset a key's count mid-window. Returns the number of
    /// windows removed.
    pub fn purge_idle(&self, now: i64, idle_ttl_secs: i64) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, slot| {
            let window = slot.get_mut();
            !window.is_expired(now) || now - window.window_start <= idle_ttl_secs
        });
        let purged = before.saturating_sub(self.windows.len());
        if purged > 0 {
            debug!(purged, remaining = self.windows.len(), "Purged idle rate limit windows");
        }
        purged
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    /// Snapshot of the key's window if it exists and has not expired.
    fn peek(&self, key: &str, now: i64) -> Option<RateLimitWindow> {
        let slot = self.windows.get(key)?;
        let window = *slot.lock();
        (!window.is_expired(now)).then_some(window)
    }

    /// Run `f` with exclusive access to the key's window, creating it lazily.
    fn with_window<R>(&self, key: &str, now: i64, f: impl FnOnce(&mut RateLimitWindow) -> R) -> R {
        // Fast path: shard read lock only.
        if let Some(slot) = self.windows.get(key) {
            let mut window = slot.lock();
            return f(&mut window);
        }

        let slot = self
            .windows
            .entry(key.to_owned())
            .or_insert_with(|| Mutex::new(RateLimitWindow::starting_at(now)))
            .downgrade();
        let mut window = slot.lock();
        f(&mut window)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    const T0: i64 = 1_700_000_000;

    #[test]
    fn test_zero_limit_returns_error() {
        assert!(matches!(
            FixedWindowRateLimiter::new(0),
            Err(RateLimitError::ZeroLimit)
        ));
    }

    #[test]
    fn test_denies_after_limit_within_window() {
        let limiter = FixedWindowRateLimiter::new(5).unwrap();

        for n in 1..=5 {
            let status = limiter.check("k1", T0 + 10);
            assert!(status.allowed, "request {n} should be allowed");
            assert_eq!(status.remaining, 5 - n);
        }

        for _ in 0..3 {
            let status = limiter.check("k1", T0 + 20);
            assert!(!status.allowed);
            assert_eq!(status.remaining, 0);
            assert_eq!(status.reset_at, T0 + 10 + WINDOW_SECONDS);
        }
    }

    #[test]
    fn test_remaining_matches_allowed_calls() {
        let limiter = FixedWindowRateLimiter::new(10).unwrap();
        assert_eq!(limiter.remaining_requests("k1", T0), 10);

        for _ in 0..3 {
            assert!(limiter.is_allowed("k1", T0));
        }
        assert_eq!(limiter.remaining_requests("k1", T0 + 1), 7);
        assert_eq!(limiter.reset_time("k1", T0 + 1), T0 + 60);
    }

    #[test]
    fn test_window_rollover_starts_fresh() {
        let limiter = FixedWindowRateLimiter::new(2).unwrap();
        assert!(limiter.is_allowed("k1", T0));
        assert!(limiter.is_allowed("k1", T0 + 1));
        assert!(!limiter.is_allowed("k1", T0 + 59));

        // Window boundary reached: first call of the new window.
        let status = limiter.check("k1", T0 + 75);
        assert!(status.allowed);
        assert_eq!(status.remaining, 1);
        // New window starts at the request time, not retroactively.
        assert_eq!(status.reset_at, T0 + 75 + WINDOW_SECONDS);
    }

    #[test]
    fn test_expired_window_reports_full_quota() {
        let limiter = FixedWindowRateLimiter::new(3).unwrap();
        limiter.check("k1", T0);
        assert_eq!(limiter.remaining_requests("k1", T0 + 60), 3);
        assert_eq!(limiter.reset_time("k1", T0 + 60), T0 + 120);
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = FixedWindowRateLimiter::new(1).unwrap();
        assert!(limiter.is_allowed("k1", T0));
        assert!(!limiter.is_allowed("k1", T0));
        assert!(limiter.is_allowed("k2", T0));
        assert_eq!(limiter.tracked_keys(), 2);
    }

    #[test]
    fn test_purge_idle_removes_old_windows() {
        let limiter = FixedWindowRateLimiter::new(5).unwrap();
        limiter.check("old", T0);
        limiter.check("fresh", T0 + 100);

        let purged = limiter.purge_idle(T0 + 130, 120);
        assert_eq!(purged, 1);
        assert_eq!(limiter.tracked_keys(), 1);
        assert_eq!(limiter.remaining_requests("old", T0 + 130), 5);
        assert_eq!(limiter.remaining_requests("fresh", T0 + 130), 4);
    }

    #[test]
    fn test_purge_keeps_live_windows_even_with_short_ttl() {
        let limiter = FixedWindowRateLimiter::new(2).unwrap();
        assert!(limiter.is_allowed("k1", T0));
        assert!(limiter.is_allowed("k1", T0));
        assert!(!limiter.is_allowed("k1", T0));

        assert_eq!(limiter.purge_idle(T0 + 11, 10), 0);
        assert_eq!(limiter.purge_idle(T0 + 11, 0), 0);
        assert!(!limiter.is_allowed("k1", T0 + 11));

        // Once the window has expired the short TTL applies.
        assert_eq!(limiter.purge_idle(T0 + WINDOW_SECONDS, 10), 1);
        assert!(limiter.is_allowed("k1", T0 + WINDOW_SECONDS));
    }

    #[test]
    fn test_concurrent_checks_never_exceed_limit() {
        let limiter = Arc::new(FixedWindowRateLimiter::new(50).unwrap());
        let admitted = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                let admitted = admitted.clone();
                std::thread::spawn(move || {
                    for _ in 0..40 {
                        if limiter.is_allowed("shared", T0) {
                            admitted.fetch_add(1, Ordering::SeqCst);
                        }
                        limiter.is_allowed("other", T0);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(admitted.load(Ordering::SeqCst), 50);
        assert_eq!(limiter.remaining_requests("shared", T0), 0);
        assert_eq!(limiter.remaining_requests("other", T0), 0);
    }

    #[test]
    fn test_apply_headers() {
        let status = RateLimitStatus {
            allowed: true,
            limit: 5,
            remaining: 4,
            reset_at: T0 + 60,
        };
        let mut headers = HeaderMap::new();
        status.apply_headers(&mut headers);

        assert_eq!(headers[RATE_LIMIT_LIMIT_HEADER], "5");
        assert_eq!(headers[RATE_LIMIT_REMAINING_HEADER], "4");
        assert_eq!(headers[RATE_LIMIT_RESET_HEADER], (T0 + 60).to_string());
    }
}
