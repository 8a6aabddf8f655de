pub mod attendance;
pub mod camera;
pub mod db;
pub mod error;
pub mod events;
pub mod models;
pub mod registration;
pub mod settings;
pub mod sync;
pub mod utils;

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};

use camera::{FrameSource, StillImageFrameSource};
use db::{AttendanceStore, Database};
use models::RecordType;
use registration::{PipelineConfig, RegistrationPipeline, RegistrationResult};
use settings::SettingsStore;
use sync::{Outbox, ReconciliationController, SyncClient, TransportFactory};
use utils::SystemClock;

/// Runs the punch terminal: employee ids are read from stdin, one per line,
/// until EOF or Ctrl-C. Pending records keep syncing in the background.
pub async fn run() -> Result<()> {
    utils::logging::init();
    info!("timeclock starting up...");

    let data_dir = settings::data_dir()?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

    let settings_store = SettingsStore::new(data_dir.join("settings.json"))?;
    let settings = settings_store.current();

    let database = Database::open(data_dir.join("timeclock.sqlite3"))?;
    let store: Arc<dyn AttendanceStore> = Arc::new(database);

    let transport = TransportFactory::new(settings.api.clone()).timesheet()?;
    let client = SyncClient::from_settings(
        Arc::new(transport),
        &settings.resilience,
        settings.device_id.clone(),
    );
    let (events, _) = events::channel();
    let outbox = Arc::new(Outbox::new(store.clone(), Arc::new(client), events.clone()));

    let mut reconciliation = ReconciliationController::new();
    reconciliation.start(outbox.clone(), settings.reconcile_interval())?;

    let camera = Arc::new(StillImageFrameSource::new(settings.camera_image.clone()));
    if !camera.is_available() {
        warn!(
            "no camera image configured in {}; punches will be refused",
            settings_store.path().display()
        );
    }

    let pipeline = RegistrationPipeline::new(
        PipelineConfig::from_settings(&settings, &data_dir),
        store,
        outbox,
        camera,
        Arc::new(SystemClock),
        events,
    );

    let outcome = punch_terminal(&pipeline).await;
    reconciliation.stop().await?;
    info!("timeclock stopped");
    outcome
}

async fn punch_terminal(pipeline: &RegistrationPipeline) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    println!("Enter an employee id to register a punch (Ctrl-D to quit).");
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read from stdin")? else {
                    break;
                };
                let employee_id = line.trim();
                if employee_id.is_empty() {
                    continue;
                }
                let result = pipeline.register(employee_id).await;
                println!("{}", describe(employee_id, &result));
            }
            _ = &mut interrupt => {
                info!("interrupt received, shutting down");
                break;
            }
        }
    }
    Ok(())
}

fn describe(employee_id: &str, result: &RegistrationResult) -> String {
    match (result.created_type, &result.error_message) {
        (Some(record_type), _) if result.success => {
            format!("{employee_id}: {} registered", label(record_type))
        }
        (_, Some(message)) => format!("{employee_id}: {message}"),
        _ => format!("{employee_id}: punch not registered"),
    }
}

fn label(record_type: RecordType) -> &'static str {
    match record_type {
        RecordType::Entry => "entry",
        RecordType::BreakStart => "break start",
        RecordType::BreakEnd => "break end",
        RecordType::Exit => "exit",
    }
}
