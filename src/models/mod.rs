mod record;

pub use record::{AttendanceRecord, RecordType, SyncStatus};
