use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::PersistenceError;
use crate::models::{AttendanceRecord, SyncStatus};

use super::connection::Database;

/// The ledger contract the punch flow and the reconciliation loop depend on.
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    /// Durably writes a new record. Returns only once the row is committed.
    async fn append(&self, record: &AttendanceRecord) -> Result<(), PersistenceError>;

    /// Every Pending record, oldest timestamp first.
    async fn pending(&self) -> Result<Vec<AttendanceRecord>, PersistenceError>;

    /// Idempotent forward-only status change.
    async fn update_status(&self, record_id: &str, status: SyncStatus)
        -> Result<(), PersistenceError>;

    /// One employee's punches for a local calendar day, ascending.
    async fn records_for_day(
        &self,
        employee_id: &str,
        day: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, PersistenceError>;

    /// Current status, or `None` for an unknown id.
    async fn status_of(&self, record_id: &str) -> Result<Option<SyncStatus>, PersistenceError>;
}

#[async_trait]
impl AttendanceStore for Database {
    async fn append(&self, record: &AttendanceRecord) -> Result<(), PersistenceError> {
        Ok(self.insert_record(record).await?)
    }

    async fn pending(&self) -> Result<Vec<AttendanceRecord>, PersistenceError> {
        Ok(self.get_pending_records().await?)
    }

    async fn update_status(
        &self,
        record_id: &str,
        status: SyncStatus,
    ) -> Result<(), PersistenceError> {
        if !self.update_sync_status(record_id, status).await? {
            log::debug!("status of {record_id} already at or past {}", status.as_str());
        }
        Ok(())
    }

    async fn records_for_day(
        &self,
        employee_id: &str,
        day: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, PersistenceError> {
        Ok(self.get_records_for_day(employee_id, day).await?)
    }

    async fn status_of(&self, record_id: &str) -> Result<Option<SyncStatus>, PersistenceError> {
        Ok(self
            .get_record(record_id)
            .await?
            .map(|record| record.sync_status))
    }
}
