use std::{
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::attendance::DEFAULT_MIN_WORK_HOURS;
use crate::camera::QualityThresholds;

const DATA_DIR_ENV: &str = "TIMECLOCK_DATA_DIR";
const DEBUG_ENV: &str = "TIMECLOCK_DEBUG";
const DEBUG_RECONCILE_INTERVAL_SECS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiSettings {
    pub base_url: String,
    pub auth_token: String,
    pub register_path: String,
    pub request_timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/".into(),
            auth_token: String::new(),
            register_path: "api/timesheet/register".into(),
            request_timeout_secs: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResilienceSettings {
    pub retry_count: u32,
    pub retry_base_delay_secs: u64,
    pub breaker_failure_threshold: u32,
    pub breaker_open_secs: u64,
}

impl Default for ResilienceSettings {
    fn default() -> Self {
        Self {
            retry_count: 3,
            retry_base_delay_secs: 2,
            breaker_failure_threshold: 5,
            breaker_open_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub api: ApiSettings,
    pub device_id: String,
    pub location: String,
    pub min_work_hours: f64,
    pub quality: QualityThresholds,
    pub resilience: ResilienceSettings,
    pub reconcile_interval_secs: u64,
    /// Defaults to `<data dir>/photos` when unset.
    pub photo_dir: Option<PathBuf>,
    /// Still image served by the simulated camera.
    pub camera_image: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api: ApiSettings::default(),
            device_id: "DEVICE_001".into(),
            location: "Main Office (Simulated)".into(),
            min_work_hours: DEFAULT_MIN_WORK_HOURS,
            quality: QualityThresholds::default(),
            resilience: ResilienceSettings::default(),
            reconcile_interval_secs: 60,
            photo_dir: None,
            camera_image: None,
        }
    }
}

impl Settings {
    pub fn reconcile_interval(&self) -> Duration {
        let debug_mode = std::env::var(DEBUG_ENV)
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if debug_mode {
            Duration::from_secs(DEBUG_RECONCILE_INTERVAL_SECS)
        } else {
            Duration::from_secs(self.reconcile_interval_secs.max(1))
        }
    }

    pub fn photo_dir_in(&self, data_dir: &Path) -> PathBuf {
        self.photo_dir
            .clone()
            .unwrap_or_else(|| data_dir.join("photos"))
    }

    fn validate(&self) -> Result<()> {
        if self.quality.min_brightness > self.quality.max_brightness {
            return Err(anyhow!(
                "quality.minBrightness ({}) exceeds quality.maxBrightness ({})",
                self.quality.min_brightness,
                self.quality.max_brightness
            ));
        }
        if self.min_work_hours.is_nan() || self.min_work_hours < 0.0 {
            return Err(anyhow!("minWorkHours must be a non-negative number"));
        }
        if self.resilience.breaker_failure_threshold == 0 {
            return Err(anyhow!("resilience.breakerFailureThreshold must be at least 1"));
        }
        reqwest::Url::parse(&self.api.base_url)
            .with_context(|| format!("api.baseUrl '{}' is not a valid URL", self.api.base_url))?;
        Ok(())
    }
}

/// Directory holding the ledger, settings and photos.
pub fn data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    dirs::data_local_dir()
        .map(|dir| dir.join("timeclock"))
        .ok_or_else(|| anyhow!("could not determine a data directory; set {DATA_DIR_ENV}"))
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Settings>,
}

impl SettingsStore {
    /// Loads `path`, writing the defaults there first if the file does not exist.
    pub fn new(path: PathBuf) -> Result<Self> {
        let data: Settings = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse settings in {}", path.display()))?
        } else {
            let defaults = Settings::default();
            persist(&path, &defaults)?;
            defaults
        };
        data.validate()
            .with_context(|| format!("Invalid settings in {}", path.display()))?;

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current(&self) -> Settings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update(&self, settings: Settings) -> Result<()> {
        settings.validate()?;
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        persist(&self.path, &settings)?;
        *guard = settings;
        Ok(())
    }
}

fn persist(path: &Path, data: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create settings directory {}", parent.display()))?;
    }
    let serialized = serde_json::to_string_pretty(data)?;
    fs::write(path, serialized)
        .with_context(|| format!("Failed to write settings to {}", path.display()))
}
