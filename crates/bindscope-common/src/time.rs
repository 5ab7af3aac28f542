//! Epoch-millisecond helpers.
//!
//! Records carry their timestamp as epoch milliseconds so the persisted value
//! is independent of the host time zone.

use chrono::{DateTime, TimeZone, Utc};

/// Current wall-clock time as epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert epoch milliseconds into a UTC datetime.
///
/// Out-of-range values clamp to the Unix epoch.
pub fn millis_to_utc(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::UNIX_EPOCH)
}
