use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{format_timestamp, parse_datetime, parse_record_type, parse_sync_status},
};
use crate::models::{AttendanceRecord, SyncStatus};
use crate::utils::clock::local_day;

const RECORD_COLUMNS: &str =
    "id, employee_id, timestamp, record_type, location, photo_ref, sync_status";

fn row_to_record(row: &Row) -> Result<AttendanceRecord> {
    let timestamp: String = row.get("timestamp")?;
    let record_type: String = row.get("record_type")?;
    let sync_status: String = row.get("sync_status")?;

    Ok(AttendanceRecord {
        id: row.get("id")?,
        employee_id: row.get("employee_id")?,
        timestamp: parse_datetime(&timestamp, "timestamp")?,
        record_type: parse_record_type(&record_type)?,
        location: row.get("location")?,
        photo_ref: row.get("photo_ref")?,
        sync_status: parse_sync_status(&sync_status)?,
    })
}

impl Database {
    pub async fn insert_record(&self, record: &AttendanceRecord) -> Result<()> {
        let record = record.clone();
        self.write(move |tx| {
            tx.execute(
                "INSERT INTO attendance_records (
                    id, employee_id, timestamp, work_date, record_type,
                    location, photo_ref, sync_status, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.id,
                    record.employee_id,
                    format_timestamp(&record.timestamp),
                    local_day(record.timestamp).to_string(),
                    record.record_type.as_str(),
                    record.location,
                    record.photo_ref,
                    record.sync_status.as_str(),
                    format_timestamp(&Utc::now()),
                ],
            )
            .with_context(|| format!("failed to insert attendance record {}", record.id))?;
            Ok(())
        })
        .await
    }

    pub async fn get_pending_records(&self) -> Result<Vec<AttendanceRecord>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {RECORD_COLUMNS}
                 FROM attendance_records
                 WHERE sync_status = 'Pending'
                 ORDER BY timestamp ASC, rowid ASC"
            ))?;

            let mut rows = stmt.query([])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(row_to_record(row)?);
            }
            Ok(records)
        })
        .await
    }

    pub async fn get_records_for_day(
        &self,
        employee_id: &str,
        day: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>> {
        let employee_id = employee_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {RECORD_COLUMNS}
                 FROM attendance_records
                 WHERE employee_id = ?1 AND work_date = ?2
                 ORDER BY timestamp ASC, rowid ASC"
            ))?;

            let mut rows = stmt.query(params![employee_id, day.to_string()])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(row_to_record(row)?);
            }
            Ok(records)
        })
        .await
    }

    pub async fn get_record(&self, record_id: &str) -> Result<Option<AttendanceRecord>> {
        let record_id = record_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {RECORD_COLUMNS} FROM attendance_records WHERE id = ?1"
            ))?;
            let mut rows = stmt.query(params![record_id])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_record(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    /// Moves a record forward to `status`. Returns whether a row changed.
    ///
    /// Re-applying the current status and asking a Synced record to go back to
    /// Pending both leave the row untouched.
    pub async fn update_sync_status(&self, record_id: &str, status: SyncStatus) -> Result<bool> {
        let record_id = record_id.to_string();
        self.write(move |tx| {
            let current: Option<String> = tx
                .query_row(
                    "SELECT sync_status FROM attendance_records WHERE id = ?1",
                    params![record_id],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(current) = current else {
                return Ok(false);
            };
            let current = parse_sync_status(&current)?;
            if current == status || current == SyncStatus::Synced {
                return Ok(false);
            }

            let synced_at = match status {
                SyncStatus::Synced => Some(format_timestamp(&Utc::now())),
                SyncStatus::Pending => None,
            };
            let changed = tx
                .execute(
                    "UPDATE attendance_records
                     SET sync_status = ?1,
                         synced_at = ?2
                     WHERE id = ?3",
                    params![status.as_str(), synced_at, record_id],
                )
                .with_context(|| format!("failed to update sync status of {record_id}"))?;
            Ok(changed > 0)
        })
        .await
    }
}
