//! FILETIME conversion utilities.
//!
//! The host expresses timestamps as the number of 100-nanosecond intervals
//! since January 1, 1601 UTC.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds between 1601-01-01 and 1970-01-01.
const FILETIME_UNIX_DIFF_SECS: u64 = 11_644_473_600;
const INTERVALS_PER_SEC: u64 = 10_000_000;

/// Convert SystemTime to a FILETIME tick count.
///
/// Times before the Unix epoch clamp to the epoch.
///
/// # Arguments
/// * `time` - System time to convert
pub fn systemtime_to_filetime(time: SystemTime) -> i64 {
    let duration: Duration = time.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);

    let intervals: u64 = duration.as_secs() * INTERVALS_PER_SEC
        + duration.subsec_nanos() as u64 / 100
        + FILETIME_UNIX_DIFF_SECS * INTERVALS_PER_SEC;

    intervals as i64
}
