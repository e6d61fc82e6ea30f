//! Timestamp-window replay protection.
//!
//! Every signed request carries `X-Timestamp` (epoch seconds), which is also
//! part of the signed canonical string. A request is only accepted while that
//! timestamp is within `validity_seconds` of the server clock, in either
//! direction, so a captured request cannot be replayed once the window has
//! passed and cannot be pre-dated to extend its lifetime.

/// Header carrying the caller's epoch-seconds timestamp.
pub const TIMESTAMP_HEADER: &str = "x-timestamp";

/// Why a timestamp was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampRejection {
    /// Not a base-10 integer.
    Malformed,
    /// Older than the validity window.
    TooOld,
    /// Further in the future than the validity window.
    TooNew,
}

/// Validates request timestamps against a fixed tolerance.
#[derive(Debug, Clone, Copy)]
pub struct ReplayGuard {
    validity_seconds: u64,
}

impl ReplayGuard {
    /// Create a guard accepting timestamps within `validity_seconds` of now.
    pub fn new(validity_seconds: u64) -> Self {
        Self { validity_seconds }
    }

    /// Check `header_value` against `now`, explaining any rejection.
    pub fn check(&self, header_value: &str, now: i64) -> Result<i64, TimestampRejection> {
        let timestamp: i64 = header_value
            .parse()
            .map_err(|_| TimestampRejection::Malformed)?;

        if now.abs_diff(timestamp) <= self.validity_seconds {
            Ok(timestamp)
        } else if timestamp < now {
            Err(TimestampRejection::TooOld)
        } else {
            Err(TimestampRejection::TooNew)
        }
    }

    /// Whether `header_value` is a timestamp within the validity window.
    pub fn is_valid(&self, header_value: &str, now: i64) -> bool {
        self.check(header_value, now).is_ok()
    }
}
