use std::sync::Arc;

use log::{debug, info, warn};

use crate::db::AttendanceStore;
use crate::error::PunchError;
use crate::models::{AttendanceRecord, RecordType};
use crate::utils::Clock;

use super::worked_hours::worked_hours;

pub const DEFAULT_MIN_WORK_HOURS: f64 = 8.0;

/// Derives which punch an employee is allowed to make next.
pub struct RecordTypeResolver {
    store: Arc<dyn AttendanceStore>,
    clock: Arc<dyn Clock>,
    min_work_hours: f64,
}

impl RecordTypeResolver {
    pub fn new(store: Arc<dyn AttendanceStore>, clock: Arc<dyn Clock>, min_work_hours: f64) -> Self {
        Self {
            store,
            clock,
            min_work_hours,
        }
    }

    pub async fn next_type(&self, employee_id: &str) -> Result<RecordType, PunchError> {
        let today = self.clock.today();
        let records = self.store.records_for_day(employee_id, today).await?;
        debug!(
            "resolving next punch for {employee_id}: {} record(s) on {today}",
            records.len()
        );

        if let Some(anomaly) = sequence_anomaly(&records) {
            warn!("punch history of {employee_id} on {today} is irregular: {anomaly}");
        }

        let Some(last) = records.last() else {
            return Ok(RecordType::Entry);
        };

        match last.record_type {
            RecordType::Exit => Ok(RecordType::Entry),
            RecordType::Entry => Ok(RecordType::BreakStart),
            RecordType::BreakStart => Ok(RecordType::BreakEnd),
            RecordType::BreakEnd => self.validate_exit(employee_id, &records),
        }
    }

    fn validate_exit(
        &self,
        employee_id: &str,
        records: &[AttendanceRecord],
    ) -> Result<RecordType, PunchError> {
        let worked = worked_hours(records, self.clock.now());

        if worked < self.min_work_hours {
            warn!(
                "workday check failed for {employee_id}: minimum {}h, worked {worked:.2}h",
                self.min_work_hours
            );
            return Err(PunchError::BusinessRuleViolation(format!(
                "Minimum workday of {:.1} hours not reached. Total worked: {worked:.2} hours.",
                self.min_work_hours
            )));
        }

        info!("{employee_id} worked {worked:.2}h today; exit allowed");
        Ok(RecordType::Exit)
    }
}

/// Describes the first place a day's punches leave the Entry, BreakStart,
/// BreakEnd, Exit cycle or fail to move forward in time.
///
/// Only a diagnostic: the next punch is decided from the last record alone, so
/// a device clock stepping backwards does not lock the employee out.
fn sequence_anomaly(records: &[AttendanceRecord]) -> Option<String> {
    let mut expected = RecordType::Entry;
    let mut previous: Option<&AttendanceRecord> = None;

    for record in records {
        if record.record_type != expected {
            return Some(format!(
                "record {} is {} but {} was expected",
                record.id,
                record.record_type.as_str(),
                expected.as_str()
            ));
        }
        if let Some(prev) = previous {
            if record.timestamp <= prev.timestamp {
                return Some(format!(
                    "record {} is not later than record {}",
                    record.id, prev.id
                ));
            }
        }
        expected = record.record_type.successor();
        previous = Some(record);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::MemoryStore;
    use crate::models::SyncStatus;
    use crate::utils::clock::testing::FixedClock;
    use chrono::{DateTime, Duration, Local, TimeZone, Utc};

    fn evening() -> DateTime<Utc> {
        Local
            .with_ymd_and_hms(2026, 3, 10, 18, 0, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn punch(id: &str, at: DateTime<Utc>, record_type: RecordType) -> AttendanceRecord {
        AttendanceRecord {
            id: id.into(),
            employee_id: "e1".into(),
            timestamp: at,
            record_type,
            location: "Main Office".into(),
            photo_ref: String::new(),
            sync_status: SyncStatus::Pending,
        }
    }

    fn resolver_with(records: Vec<AttendanceRecord>) -> RecordTypeResolver {
        let store = Arc::new(MemoryStore::with_records(records));
        let clock = Arc::new(FixedClock::at(evening()));
        RecordTypeResolver::new(store, clock, DEFAULT_MIN_WORK_HOURS)
    }

    #[tokio::test]
    async fn first_punch_of_the_day_is_entry() {
        let resolver = resolver_with(vec![]);
        assert_eq!(resolver.next_type("e1").await.unwrap(), RecordType::Entry);
    }

    #[tokio::test]
    async fn entry_then_break_start_then_break_end() {
        let now = evening();
        let resolver = resolver_with(vec![punch("a", now - Duration::hours(3), RecordType::Entry)]);
        assert_eq!(resolver.next_type("e1").await.unwrap(), RecordType::BreakStart);

        let resolver = resolver_with(vec![
            punch("a", now - Duration::hours(3), RecordType::Entry),
            punch("b", now - Duration::hours(1), RecordType::BreakStart),
        ]);
        assert_eq!(resolver.next_type("e1").await.unwrap(), RecordType::BreakEnd);
    }

    #[tokio::test]
    async fn exit_allowed_after_nine_hours() {
        let now = evening();
        let resolver = resolver_with(vec![
            punch("a", now - Duration::hours(9), RecordType::Entry),
            punch("b", now - Duration::hours(5), RecordType::BreakStart),
            punch("c", now - Duration::hours(4), RecordType::BreakEnd),
        ]);
        assert_eq!(resolver.next_type("e1").await.unwrap(), RecordType::Exit);
    }

    #[tokio::test]
    async fn exactly_eight_hours_passes() {
        let now = evening();
        let resolver = resolver_with(vec![
            punch("a", now - Duration::hours(10), RecordType::Entry),
            punch("b", now - Duration::hours(6), RecordType::BreakStart),
            punch("c", now - Duration::hours(4), RecordType::BreakEnd),
        ]);
        // 4h before the break plus 4h since it ended.
        assert_eq!(resolver.next_type("e1").await.unwrap(), RecordType::Exit);
    }

    #[tokio::test]
    async fn short_day_blocks_exit_with_totals_in_message() {
        let now = evening();
        let resolver = resolver_with(vec![
            punch("a", now - Duration::hours(7), RecordType::Entry),
            punch("b", now - Duration::hours(3), RecordType::BreakStart),
            punch("c", now - Duration::hours(2), RecordType::BreakEnd),
        ]);

        match resolver.next_type("e1").await {
            Err(PunchError::BusinessRuleViolation(message)) => {
                assert!(message.contains("8.0"), "{message}");
                assert!(message.contains("6.00"), "{message}");
            }
            other => panic!("expected business rule violation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn after_exit_a_new_cycle_starts() {
        let now = evening();
        let resolver = resolver_with(vec![
            punch("a", now - Duration::hours(10), RecordType::Entry),
            punch("b", now - Duration::hours(6), RecordType::BreakStart),
            punch("c", now - Duration::hours(5), RecordType::BreakEnd),
            punch("d", now - Duration::hours(1), RecordType::Exit),
        ]);
        assert_eq!(resolver.next_type("e1").await.unwrap(), RecordType::Entry);
    }

    #[tokio::test]
    async fn clock_stepping_back_does_not_block_the_next_punch() {
        let now = evening();
        let resolver = resolver_with(vec![
            punch("a", now - Duration::hours(2), RecordType::Entry),
            punch(
                "b",
                now - Duration::hours(2) - Duration::minutes(1),
                RecordType::BreakStart,
            ),
        ]);
        // Ordered by time the entry is now the latest punch.
        assert_eq!(resolver.next_type("e1").await.unwrap(), RecordType::BreakStart);
    }

    #[tokio::test]
    async fn irregular_history_is_resolved_from_the_last_punch() {
        let now = evening();
        let resolver = resolver_with(vec![
            punch("a", now - Duration::hours(3), RecordType::Entry),
            punch("b", now - Duration::hours(2), RecordType::Entry),
        ]);
        assert_eq!(resolver.next_type("e1").await.unwrap(), RecordType::BreakStart);

        let resolver = resolver_with(vec![punch("a", now - Duration::hours(1), RecordType::BreakEnd)]);
        assert!(matches!(
            resolver.next_type("e1").await,
            Err(PunchError::BusinessRuleViolation(_))
        ));
    }

    #[test]
    fn anomalies_are_described() {
        let now = evening();
        assert_eq!(
            sequence_anomaly(&[
                punch("a", now - Duration::hours(3), RecordType::Entry),
                punch("b", now - Duration::hours(2), RecordType::BreakStart),
            ]),
            None
        );

        let out_of_cycle = sequence_anomaly(&[punch("a", now, RecordType::BreakStart)]).unwrap();
        assert!(out_of_cycle.contains("Entry was expected"), "{out_of_cycle}");

        let backwards = sequence_anomaly(&[
            punch("a", now, RecordType::Entry),
            punch("b", now - Duration::minutes(1), RecordType::BreakStart),
        ])
        .unwrap();
        assert!(backwards.contains("not later than"), "{backwards}");
    }

    #[tokio::test]
    async fn other_employees_do_not_affect_the_cycle() {
        let now = evening();
        let mut other = punch("x", now - Duration::hours(2), RecordType::Entry);
        other.employee_id = "e2".into();
        let resolver = resolver_with(vec![other]);
        assert_eq!(resolver.next_type("e1").await.unwrap(), RecordType::Entry);
        assert_eq!(resolver.next_type("e2").await.unwrap(), RecordType::BreakStart);
    }

    #[tokio::test]
    async fn store_failure_surfaces_as_persistence_error() {
        let store = Arc::new(MemoryStore::default());
        store.fail_reads(true);
        let resolver = RecordTypeResolver::new(
            store,
            Arc::new(FixedClock::at(evening())),
            DEFAULT_MIN_WORK_HOURS,
        );
        assert!(matches!(
            resolver.next_type("e1").await,
            Err(PunchError::Persistence(_))
        ));
    }
}
