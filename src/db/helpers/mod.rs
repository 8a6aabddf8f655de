use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};

use crate::models::{RecordType, SyncStatus};

/// Fixed-width UTC form so that `ORDER BY timestamp` sorts chronologically.
pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_record_type(value: &str) -> Result<RecordType> {
    match value {
        "Entry" => Ok(RecordType::Entry),
        "BreakStart" => Ok(RecordType::BreakStart),
        "BreakEnd" => Ok(RecordType::BreakEnd),
        "Exit" => Ok(RecordType::Exit),
        other => Err(anyhow!("unknown record type {other}")),
    }
}

pub fn parse_sync_status(value: &str) -> Result<SyncStatus> {
    match value {
        "Pending" => Ok(SyncStatus::Pending),
        "Synced" => Ok(SyncStatus::Synced),
        other => Err(anyhow!("unknown sync status {other}")),
    }
}
