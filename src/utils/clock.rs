use chrono::{DateTime, Local, NaiveDate, Utc};

/// Source of "now". Punch timestamps and the worked-hours calculation read time
/// through this so the daily rules can be exercised at fixed instants.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Calendar day of `now` on the device's local timezone.
    fn today(&self) -> NaiveDate {
        local_day(self.now())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// The local calendar day an instant falls on.
pub fn local_day(instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(&Local).date_naive()
}
