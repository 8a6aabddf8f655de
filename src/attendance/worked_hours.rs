use chrono::{DateTime, Duration, Utc};

use crate::models::AttendanceRecord;

/// Time worked across a day's punches, in order.
///
/// Entry and BreakEnd open an interval; BreakStart and Exit close it. A close
/// without an open interval adds nothing. An interval still open after the last
/// punch runs until `now`.
pub fn worked_duration(records: &[AttendanceRecord], now: DateTime<Utc>) -> Duration {
    let mut total = Duration::zero();
    let mut open_since: Option<DateTime<Utc>> = None;

    for record in records {
        if record.record_type.opens_interval() {
            open_since = Some(record.timestamp);
        } else if let Some(start) = open_since.take() {
            total += record.timestamp - start;
        }
    }

    if let Some(start) = open_since {
        total += now - start;
    }

    total
}

pub fn worked_hours(records: &[AttendanceRecord], now: DateTime<Utc>) -> f64 {
    worked_duration(records, now).num_milliseconds() as f64 / 3_600_000.0
}
