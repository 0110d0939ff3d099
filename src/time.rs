//! Time normalization for schedule entries.
//!
//! Schedule rows store eligibility as epoch seconds (`f64`, microsecond
//! precision) no matter how the caller expressed the point in time.

use crate::error::{Error, Result};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};

/// Milliseconds since the Unix epoch, used for insertion and write times.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Epoch seconds for an absolute instant.
pub fn epoch_seconds(ts: DateTime<Utc>) -> f64 {
    ts.timestamp_micros() as f64 / 1_000_000.0
}

/// Convert a wall-clock time to epoch seconds.
///
/// With `utc` set the value is read as UTC, otherwise as the host's local
/// time. An ambiguous local time (clocks turned back) resolves to the
/// earlier instant; a local time skipped by a DST jump is rejected.
pub fn to_timestamp(ts: NaiveDateTime, utc: bool) -> Result<f64> {
    if utc {
        return Ok(epoch_seconds(ts.and_utc()));
    }
    Local
        .from_local_datetime(&ts)
        .earliest()
        .map(|local| epoch_seconds(local.with_timezone(&Utc)))
        .ok_or_else(|| Error::InvalidTimestamp(format!("{ts} does not exist in local time")))
}
