//! Wall-clock abstraction for the gateway.
//!
//! The rate limiter and the replay guard both reason in whole epoch seconds.
//! Reading time through the [`Clock`] trait lets tests move time forward
//! across window boundaries without sleeping.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

/// The system clock reported a time before the Unix epoch.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("system clock is set before the Unix epoch")]
pub struct ClockError;

/// Source of the current time in epoch seconds.
pub trait Clock: Send + Sync {
    /// Current time as whole seconds since the Unix epoch.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError`] if the underlying clock cannot produce a valid
    /// epoch timestamp.
    fn now_epoch_seconds(&self) -> Result<i64, ClockError>;
}

/// Clock backed by [`SystemTime`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_seconds(&self) -> Result<i64, ClockError> {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| ClockError)?;
        i64::try_from(elapsed.as_secs()).map_err(|_| ClockError)
    }
}

/// Manually driven clock for tests and simulations.
///
/// Cloning shares the underlying instant, so a handle kept by a test can
/// advance the time seen by a gateway that owns another clone.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    /// Create a clock frozen at `epoch_seconds`.
    pub fn new(epoch_seconds: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(epoch_seconds)),
        }
    }

    /// Set the current time.
    pub fn set(&self, epoch_seconds: i64) {
        self.now.store(epoch_seconds, Ordering::SeqCst);
    }

    /// Move the clock forward (or backward, for negative values).
    pub fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_epoch_seconds(&self) -> Result<i64, ClockError> {
        Ok(self.now.load(Ordering::SeqCst))
    }
}
