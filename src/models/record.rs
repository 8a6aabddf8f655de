use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum RecordType {
    Entry,
    BreakStart,
    BreakEnd,
    Exit,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Entry => "Entry",
            RecordType::BreakStart => "BreakStart",
            RecordType::BreakEnd => "BreakEnd",
            RecordType::Exit => "Exit",
        }
    }

    /// Lowercase form used on the wire: `entry`, `breakstart`, `breakend`, `exit`.
    pub fn wire_name(&self) -> &'static str {
        match self {
            RecordType::Entry => "entry",
            RecordType::BreakStart => "breakstart",
            RecordType::BreakEnd => "breakend",
            RecordType::Exit => "exit",
        }
    }

    /// The only punch type allowed to follow `self` within a day.
    pub fn successor(&self) -> RecordType {
        match self {
            RecordType::Entry => RecordType::BreakStart,
            RecordType::BreakStart => RecordType::BreakEnd,
            RecordType::BreakEnd => RecordType::Exit,
            RecordType::Exit => RecordType::Entry,
        }
    }

    /// Entry and BreakEnd start a worked interval.
    pub fn opens_interval(&self) -> bool {
        matches!(self, RecordType::Entry | RecordType::BreakEnd)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SyncStatus {
    Pending,
    Synced,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "Pending",
            SyncStatus::Synced => "Synced",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    pub employee_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub location: String,
    pub photo_ref: String,
    pub sync_status: SyncStatus,
}
