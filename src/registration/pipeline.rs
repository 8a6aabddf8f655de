use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::attendance::RecordTypeResolver;
use crate::camera::{FrameSource, ImageQualityGate, PhotoStore, QualityThresholds};
use crate::db::AttendanceStore;
use crate::error::{HardwareError, PersistenceError, PunchError};
use crate::events::{self, EventSender, PunchEvent};
use crate::models::{AttendanceRecord, RecordType, SyncStatus};
use crate::settings::Settings;
use crate::sync::{Delivery, Outbox};
use crate::utils::Clock;

/// What the terminal shows after a punch attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResult {
    pub success: bool,
    pub created_type: Option<RecordType>,
    pub error_message: Option<String>,
}

impl RegistrationResult {
    fn registered(record_type: RecordType) -> Self {
        Self {
            success: true,
            created_type: Some(record_type),
            error_message: None,
        }
    }

    fn refused(message: String) -> Self {
        Self {
            success: false,
            created_type: None,
            error_message: Some(message),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub location: String,
    pub min_work_hours: f64,
    pub quality: QualityThresholds,
    pub photo_dir: PathBuf,
}

impl PipelineConfig {
    pub fn from_settings(settings: &Settings, data_dir: &Path) -> Self {
        Self {
            location: settings.location.clone(),
            min_work_hours: settings.min_work_hours,
            quality: settings.quality,
            photo_dir: settings.photo_dir_in(data_dir),
        }
    }
}

/// Runs one punch end to end: decide the type, capture and check a photo,
/// record it locally, then try to deliver it once.
///
/// Nothing is written unless every check passes. Once the record is appended
/// the punch has succeeded, whatever happens to the delivery attempt.
pub struct RegistrationPipeline {
    resolver: RecordTypeResolver,
    camera: Arc<dyn FrameSource>,
    gate: ImageQualityGate,
    photos: PhotoStore,
    store: Arc<dyn AttendanceStore>,
    outbox: Arc<Outbox>,
    clock: Arc<dyn Clock>,
    location: String,
    events: EventSender,
    // One punch at a time per device.
    turn: Mutex<()>,
}

impl RegistrationPipeline {
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn AttendanceStore>,
        outbox: Arc<Outbox>,
        camera: Arc<dyn FrameSource>,
        clock: Arc<dyn Clock>,
        events: EventSender,
    ) -> Self {
        Self {
            resolver: RecordTypeResolver::new(store.clone(), clock.clone(), config.min_work_hours),
            camera,
            gate: ImageQualityGate::new(config.quality),
            photos: PhotoStore::new(config.photo_dir),
            store,
            outbox,
            clock,
            location: config.location,
            events,
            turn: Mutex::new(()),
        }
    }

    pub async fn register(&self, employee_id: &str) -> RegistrationResult {
        let _turn = self.turn.lock().await;
        let employee_id = employee_id.trim();

        match self.try_register(employee_id).await {
            Ok(record) => RegistrationResult::registered(record.record_type),
            Err(err) => {
                match &err {
                    PunchError::Persistence(cause) => {
                        error!("punch for {employee_id} could not be stored: {cause}")
                    }
                    other => warn!("punch for {employee_id} refused: {other}"),
                }
                let message = err.user_message();
                events::emit(
                    &self.events,
                    PunchEvent::Rejected {
                        employee_id: employee_id.to_string(),
                        message: message.clone(),
                        at: self.clock.now(),
                    },
                );
                RegistrationResult::refused(message)
            }
        }
    }

    /// The punch flow with its typed failure. Returns the stored record.
    pub async fn try_register(&self, employee_id: &str) -> Result<AttendanceRecord, PunchError> {
        if employee_id.is_empty() {
            return Err(PunchError::BusinessRuleViolation(
                "An employee id is required to register a punch.".into(),
            ));
        }

        let record_type = self.resolver.next_type(employee_id).await?;
        let frame = self.capture_validated_frame().await?;

        let id = Uuid::new_v4().to_string();
        let timestamp = self.clock.now();
        let photo_path = self.archive_photo(employee_id, &id, timestamp, frame).await?;

        let mut record = AttendanceRecord {
            id,
            employee_id: employee_id.to_string(),
            timestamp,
            record_type,
            location: self.location.clone(),
            photo_ref: photo_path.display().to_string(),
            sync_status: SyncStatus::Pending,
        };

        if let Err(err) = self.store.append(&record).await {
            if let Err(cleanup) = tokio::fs::remove_file(&photo_path).await {
                debug!("could not remove orphaned photo {}: {cleanup}", photo_path.display());
            }
            return Err(err.into());
        }
        info!(
            "registered {} for {employee_id} (record {})",
            record_type.as_str(),
            record.id
        );
        // Announced before the first delivery so Synced never precedes it.
        events::emit(
            &self.events,
            PunchEvent::Registered {
                record_id: record.id.clone(),
                employee_id: record.employee_id.clone(),
                record_type,
                at: record.timestamp,
            },
        );

        match self.outbox.deliver(&record).await {
            Ok(Delivery::Synced) => record.sync_status = SyncStatus::Synced,
            Ok(_) => debug!("record {} left for reconciliation", record.id),
            Err(err) => warn!(
                "record {} stored but its delivery could not be tracked: {err}",
                record.id
            ),
        }

        Ok(record)
    }

    async fn capture_validated_frame(&self) -> Result<Vec<u8>, PunchError> {
        if !self.camera.is_available() {
            return Err(HardwareError::NotAvailable.into());
        }

        let camera = self.camera.clone();
        let gate = self.gate;
        let (frame, stats) = tokio::task::spawn_blocking(move || {
            let frame = camera.capture_frame()?;
            let stats = gate.validate(&frame).map_err(PunchError::ImageQuality)?;
            Ok::<_, PunchError>((frame, stats))
        })
        .await
        .map_err(|err| HardwareError::CaptureFailed(format!("capture task failed: {err}")))??;

        debug!(
            "frame accepted: brightness {:.1}, focus {:.1}",
            stats.mean_brightness, stats.focus
        );
        Ok(frame)
    }

    async fn archive_photo(
        &self,
        employee_id: &str,
        record_id: &str,
        taken_at: chrono::DateTime<chrono::Utc>,
        frame: Vec<u8>,
    ) -> Result<PathBuf, PersistenceError> {
        let photos = self.photos.clone();
        let employee_id = employee_id.to_string();
        let record_id = record_id.to_string();
        tokio::task::spawn_blocking(move || photos.save(&employee_id, &record_id, taken_at, &frame))
            .await
            .map_err(|err| anyhow!("photo archiving task failed: {err}"))?
            .map_err(PersistenceError)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Local, TimeZone, Utc};
    use tempfile::TempDir;

    use super::*;
    use crate::camera::testing::{uniform_frame, ScriptedCamera};
    use crate::db::testing::MemoryStore;
    use crate::settings::ResilienceSettings;
    use crate::sync::client::testing::FakeTransport;
    use crate::sync::SyncClient;
    use crate::utils::clock::testing::FixedClock;

    struct Rig {
        dir: TempDir,
        store: Arc<MemoryStore>,
        transport: Arc<FakeTransport>,
        camera: Arc<ScriptedCamera>,
        clock: Arc<FixedClock>,
        events: EventSender,
        pipeline: RegistrationPipeline,
    }

    fn morning() -> DateTime<Utc> {
        Local
            .with_ymd_and_hms(2026, 3, 10, 8, 0, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn rig_with(camera: ScriptedCamera, transport: FakeTransport) -> Rig {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        let transport = Arc::new(transport);
        let camera = Arc::new(camera);
        let clock = Arc::new(FixedClock::at(morning()));
        let (events, _) = events::channel();

        let client = SyncClient::from_settings(
            transport.clone(),
            &ResilienceSettings::default(),
            "DEVICE_001",
        );
        let outbox = Arc::new(Outbox::new(store.clone(), Arc::new(client), events.clone()));
        let config = PipelineConfig {
            location: "Main Office".into(),
            min_work_hours: 8.0,
            quality: QualityThresholds::default(),
            photo_dir: dir.path().join("photos"),
        };
        let pipeline = RegistrationPipeline::new(
            config,
            store.clone(),
            outbox,
            camera.clone(),
            clock.clone(),
            events.clone(),
        );

        Rig {
            dir,
            store,
            transport,
            camera,
            clock,
            events,
            pipeline,
        }
    }

    fn rig() -> Rig {
        rig_with(ScriptedCamera::default(), FakeTransport::always_ok())
    }

    #[tokio::test]
    async fn successful_punch_is_stored_and_synced() {
        let rig = rig();
        let mut events = rig.events.subscribe();

        let result = rig.pipeline.register("E1").await;
        assert_eq!(result, RegistrationResult::registered(RecordType::Entry));

        let records = rig.store.snapshot();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.sync_status, SyncStatus::Synced);
        assert_eq!(record.location, "Main Office");
        assert_eq!(record.timestamp, morning());
        assert!(Path::new(&record.photo_ref).starts_with(rig.dir.path().join("photos")));
        assert!(Path::new(&record.photo_ref).is_file());

        let payloads = rig.transport.payloads();
        assert_eq!(payloads[0].record_type, "entry");
        assert_eq!(payloads[0].device_id, "DEVICE_001");

        let mut saw_registered = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, PunchEvent::Registered { .. }) {
                saw_registered = true;
            }
        }
        assert!(saw_registered);
    }

    #[tokio::test]
    async fn registered_is_announced_before_synced() {
        let rig = rig();
        let mut events = rig.events.subscribe();

        assert!(rig.pipeline.register("E1").await.success);

        assert!(matches!(events.try_recv(), Ok(PunchEvent::Registered { .. })));
        assert!(matches!(events.try_recv(), Ok(PunchEvent::Synced { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn offline_punch_still_succeeds_and_stays_pending() {
        let rig = rig_with(ScriptedCamera::default(), FakeTransport::always_down());

        let result = rig.pipeline.register("E1").await;
        assert!(result.success);
        assert_eq!(result.created_type, Some(RecordType::Entry));
        assert_eq!(rig.store.snapshot()[0].sync_status, SyncStatus::Pending);
        assert_eq!(rig.transport.calls(), 4);
    }

    #[tokio::test]
    async fn punches_follow_the_daily_cycle() {
        let rig = rig();

        assert_eq!(rig.pipeline.register("E1").await.created_type, Some(RecordType::Entry));
        rig.clock.advance(Duration::hours(4));
        assert_eq!(
            rig.pipeline.register("E1").await.created_type,
            Some(RecordType::BreakStart)
        );
        rig.clock.advance(Duration::hours(1));
        assert_eq!(
            rig.pipeline.register("E1").await.created_type,
            Some(RecordType::BreakEnd)
        );
        rig.clock.advance(Duration::hours(5));
        assert_eq!(rig.pipeline.register("E1").await.created_type, Some(RecordType::Exit));
    }

    #[tokio::test]
    async fn short_day_exit_is_refused_without_writing() {
        let rig = rig();
        rig.pipeline.register("E1").await;
        rig.clock.advance(Duration::hours(3));
        rig.pipeline.register("E1").await;
        rig.clock.advance(Duration::hours(1));
        rig.pipeline.register("E1").await;
        rig.clock.advance(Duration::hours(2));

        let result = rig.pipeline.register("E1").await;
        assert!(!result.success);
        assert!(result.error_message.unwrap().contains("5.00"));
        assert_eq!(rig.store.snapshot().len(), 3);
    }

    #[tokio::test]
    async fn poor_frames_are_refused_without_writing() {
        let rig = rig();
        rig.camera.queue(uniform_frame(10));
        rig.camera.queue(uniform_frame(220));
        rig.camera.queue(uniform_frame(100));

        let dark = rig.pipeline.register("E1").await;
        assert_eq!(
            dark.error_message.as_deref(),
            Some(crate::error::QualityIssue::TooDark.user_message())
        );
        assert!(!rig.pipeline.register("E1").await.success);
        assert!(!rig.pipeline.register("E1").await.success);

        assert!(rig.store.snapshot().is_empty());
        assert_eq!(rig.transport.calls(), 0);
        assert!(!rig.dir.path().join("photos").exists());
    }

    #[tokio::test]
    async fn missing_camera_is_reported() {
        let rig = rig_with(ScriptedCamera::unplugged(), FakeTransport::always_ok());
        let result = rig.pipeline.register("E1").await;
        assert!(!result.success);
        assert!(result.error_message.unwrap().contains("Camera not available"));
        assert!(rig.store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn storage_failure_is_an_unexpected_failure() {
        let rig = rig();
        rig.store.fail_appends(true);
        let mut events = rig.events.subscribe();

        let result = rig.pipeline.register("E1").await;
        assert!(!result.success);
        assert!(result.error_message.unwrap().contains("unexpected failure"));
        assert_eq!(rig.transport.calls(), 0);
        assert!(matches!(events.try_recv(), Ok(PunchEvent::Rejected { .. })));

        // The photo of a punch that was never recorded is not kept.
        let leftover = std::fs::read_dir(rig.dir.path().join("photos"))
            .map(|entries| entries.count())
            .unwrap_or(0);
        assert_eq!(leftover, 0);
    }

    #[tokio::test]
    async fn blank_employee_id_is_refused() {
        let rig = rig();
        assert!(!rig.pipeline.register("   ").await.success);
        assert!(rig.store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn employees_have_independent_cycles() {
        let rig = rig();
        rig.pipeline.register("E1").await;
        rig.clock.advance(Duration::minutes(1));
        assert_eq!(rig.pipeline.register("E2").await.created_type, Some(RecordType::Entry));
    }
}
