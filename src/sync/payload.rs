use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::models::AttendanceRecord;

/// Body posted to the timesheet service. Field names are part of the remote contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PunchPayload {
    pub employee_id: String,
    pub timestamp: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub location: String,
    pub photo: String,
    pub device_id: String,
}

impl PunchPayload {
    /// Builds the wire form of `record`, embedding the archived photo.
    ///
    /// A photo that cannot be read will not become readable by retrying, so it
    /// is reported as a serialization failure.
    pub async fn from_record(
        record: &AttendanceRecord,
        device_id: &str,
    ) -> Result<Self, SyncError> {
        let photo = tokio::fs::read(&record.photo_ref)
            .await
            .map_err(|err| SyncError::Serialization {
                record_id: record.id.clone(),
                reason: format!("photo {} unreadable: {err}", record.photo_ref),
            })?;

        Ok(Self::with_photo(record, device_id, &photo))
    }

    pub fn with_photo(record: &AttendanceRecord, device_id: &str, photo: &[u8]) -> Self {
        Self {
            employee_id: record.employee_id.clone(),
            timestamp: record.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            record_type: record.record_type.wire_name().to_string(),
            location: record.location.clone(),
            photo: STANDARD.encode(photo),
            device_id: device_id.to_string(),
        }
    }
}

/// Acknowledgement returned by the timesheet service on success.
/// Only its shape is checked; the values are logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub id: String,
    pub status: String,
    pub server_timestamp: String,
    #[serde(default)]
    pub message: String,
}
