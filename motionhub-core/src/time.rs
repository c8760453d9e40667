//! Timestamp and interval conventions
//!
//! The device stamps every timestamped record with a monotonic nanosecond
//! counter; all decimation arithmetic happens in that domain. Host-facing
//! configuration uses `core::time::Duration`, converted once at the edges:
//! - nanoseconds for gate threshold math,
//! - microseconds for engine rate writes (the device control encoding),
//! - milliseconds for the batch timeout path.

use core::time::Duration;

/// Monotonic device timestamp in nanoseconds
///
/// Zero is reserved for "no timestamp" (status and marker records, and the
/// never-emitted state of a sensor).
pub type Timestamp = u64;

/// Nanoseconds per microsecond
pub const NS_PER_US: u64 = 1_000;

/// Nanoseconds per millisecond
pub const NS_PER_MS: u64 = 1_000_000;

/// Nanoseconds per second
pub const NS_PER_SEC: u64 = 1_000_000_000;

/// Interval as nanoseconds, saturating at `u64::MAX`
pub fn interval_ns(interval: Duration) -> u64 {
    u64::try_from(interval.as_nanos()).unwrap_or(u64::MAX)
}

/// Interval as whole microseconds, the device rate encoding
pub fn interval_us(interval: Duration) -> u64 {
    u64::try_from(interval.as_micros()).unwrap_or(u64::MAX)
}

/// Timeout as whole milliseconds, the device batch-timeout encoding
pub fn timeout_ms(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

/// Interval expressed as a whole rate in hertz
///
/// Sub-hertz intervals report 0; the registry's rate ladder only matches
/// exact supported rates, so the rounding here is deliberate truncation.
pub fn interval_hz(interval: Duration) -> u64 {
    let us = interval_us(interval);
    if us == 0 {
        return 0;
    }
    1_000_000 / us
}
