use anyhow::{anyhow, bail, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::activity::ActivityThresholds;
use crate::frame::FrameDimensions;
use crate::history::MAX_HISTORY_ENTRIES;
use crate::ingest::CameraConfig;
use crate::pipeline::{PipelineSettings, DEFAULT_DETECT_TIMEOUT, DEFAULT_TICK};

const DEFAULT_CAMERA_URL: &str = "stub://camera";
const DEFAULT_CAMERA_FPS: u32 = 30;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_BACKEND: &str = "stub";
const DEFAULT_MIN_SCORE: f32 = 0.5;
const DEFAULT_MAX_DETECTIONS: usize = 20;
const DEFAULT_LOG_ADDR: &str = "127.0.0.1:5000";
const DEFAULT_LOG_DIR: &str = "logs";

#[derive(Debug, Deserialize, Default)]
struct AppConfigFile {
    camera: Option<CameraConfigFile>,
    detector: Option<DetectorConfigFile>,
    activity: Option<ThresholdsConfigFile>,
    overlay: Option<OverlayConfigFile>,
    history: Option<HistoryConfigFile>,
    log_server: Option<LogServerConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    timeout_ms: Option<u64>,
    min_score: Option<f32>,
    max_detections: Option<usize>,
    tick_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ThresholdsConfigFile {
    walking_movement: Option<f32>,
    still_movement: Option<f32>,
    low_y: Option<f32>,
    close_height: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct OverlayConfigFile {
    visible: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct HistoryConfigFile {
    capacity: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct LogServerConfigFile {
    addr: Option<String>,
    dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub camera: CameraConfig,
    pub detector: DetectorSettings,
    /// Explicit thresholds from the config file, if any.
    pub thresholds: Option<ActivityThresholds>,
    pub show_overlay: bool,
    pub history_capacity: usize,
    pub log_server: LogServerSettings,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    /// Registry name of the backend (`stub`, `tract`).
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub timeout: Duration,
    pub min_score: f32,
    pub max_detections: usize,
    /// Pacing of the detection loop.
    pub tick: Duration,
}

#[derive(Debug, Clone)]
pub struct LogServerSettings {
    pub addr: String,
    pub dir: PathBuf,
}

impl AppConfig {
    /// File named by `AR_DETECT_CONFIG`, then environment overrides, then validation.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("AR_DETECT_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AppConfigFile) -> Self {
        let camera_file = file.camera.unwrap_or_default();
        let camera = CameraConfig {
            url: camera_file
                .url
                .unwrap_or_else(|| DEFAULT_CAMERA_URL.to_string()),
            target_fps: camera_file.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
            width: camera_file.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
            height: camera_file.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
        };

        let detector_file = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            backend: detector_file
                .backend
                .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
            model_path: detector_file.model_path,
            timeout: detector_file
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_DETECT_TIMEOUT),
            min_score: detector_file.min_score.unwrap_or(DEFAULT_MIN_SCORE),
            max_detections: detector_file
                .max_detections
                .unwrap_or(DEFAULT_MAX_DETECTIONS),
            tick: detector_file
                .tick_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_TICK),
        };

        // Partial threshold tables fill the gaps from the 640x480 calibration.
        let thresholds = file.activity.map(|t| {
            let base = ActivityThresholds::CALIBRATED_640X480;
            ActivityThresholds {
                walking_movement: t.walking_movement.unwrap_or(base.walking_movement),
                still_movement: t.still_movement.unwrap_or(base.still_movement),
                low_y: t.low_y.unwrap_or(base.low_y),
                close_height: t.close_height.unwrap_or(base.close_height),
            }
        });

        let log_file = file.log_server.unwrap_or_default();
        let log_server = LogServerSettings {
            addr: log_file
                .addr
                .unwrap_or_else(|| DEFAULT_LOG_ADDR.to_string()),
            dir: log_file
                .dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR)),
        };

        Self {
            camera,
            detector,
            thresholds,
            show_overlay: file.overlay.and_then(|o| o.visible).unwrap_or(true),
            history_capacity: file
                .history
                .and_then(|h| h.capacity)
                .unwrap_or(MAX_HISTORY_ENTRIES),
            log_server,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(url) = non_empty_env("AR_DETECT_CAMERA_URL") {
            self.camera.url = url;
        }
        if let Some(backend) = non_empty_env("AR_DETECT_BACKEND") {
            self.detector.backend = backend;
        }
        if let Some(path) = non_empty_env("AR_DETECT_MODEL_PATH") {
            self.detector.model_path = Some(PathBuf::from(path));
        }
        if let Some(timeout) = non_empty_env("AR_DETECT_TIMEOUT_MS") {
            let millis: u64 = timeout.parse().map_err(|_| {
                anyhow!("AR_DETECT_TIMEOUT_MS must be an integer number of milliseconds")
            })?;
            self.detector.timeout = Duration::from_millis(millis);
        }
        if let Some(show) = non_empty_env("AR_DETECT_SHOW_OVERLAY") {
            self.show_overlay = parse_bool(&show)
                .ok_or_else(|| anyhow!("AR_DETECT_SHOW_OVERLAY must be true or false"))?;
        }
        if let Some(dir) = non_empty_env("AR_DETECT_LOG_DIR") {
            self.log_server.dir = PathBuf::from(dir);
        }
        if let Some(addr) = non_empty_env("AR_DETECT_LOG_ADDR") {
            self.log_server.addr = addr;
        }
        if let Some(capacity) = non_empty_env("AR_DETECT_HISTORY_CAPACITY") {
            self.history_capacity = capacity
                .parse()
                .map_err(|_| anyhow!("AR_DETECT_HISTORY_CAPACITY must be an integer"))?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.camera.width == 0 || self.camera.height == 0 {
            bail!(
                "camera resolution must be non-zero (got {}x{})",
                self.camera.width,
                self.camera.height
            );
        }
        if self.thresholds.is_none()
            && !ActivityThresholds::is_calibrated_for(self.camera.width, self.camera.height)
        {
            bail!(
                "activity thresholds are calibrated for {}x{}; set [activity] thresholds for {}x{}",
                ActivityThresholds::CALIBRATION_WIDTH,
                ActivityThresholds::CALIBRATION_HEIGHT,
                self.camera.width,
                self.camera.height
            );
        }
        if let Some(t) = &self.thresholds {
            let values = [t.walking_movement, t.still_movement, t.low_y, t.close_height];
            if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
                bail!("activity thresholds must be finite and non-negative");
            }
        }
        if self.detector.timeout.is_zero() {
            bail!("detector timeout must be greater than zero");
        }
        if !(0.0..=1.0).contains(&self.detector.min_score) {
            bail!(
                "detector min_score must be within 0..=1 (got {})",
                self.detector.min_score
            );
        }
        if self.detector.max_detections == 0 {
            bail!("detector max_detections must be greater than zero");
        }
        if self.history_capacity == 0 {
            bail!("history capacity must be greater than zero");
        }
        self.detector.backend = self.detector.backend.trim().to_lowercase();
        if self.detector.backend == "tract" && self.detector.model_path.is_none() {
            bail!("the tract backend needs a model path (AR_DETECT_MODEL_PATH)");
        }
        Ok(())
    }

    /// Thresholds in effect: explicit ones or the 640x480 calibration.
    pub fn effective_thresholds(&self) -> ActivityThresholds {
        self.thresholds
            .unwrap_or(ActivityThresholds::CALIBRATED_640X480)
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            thresholds: self.effective_thresholds(),
            resolution: FrameDimensions::new(self.camera.width, self.camera.height),
            detect_timeout: self.detector.timeout,
            history_capacity: self.history_capacity,
            overlay_visible: self.show_overlay,
            ..PipelineSettings::default()
        }
    }
}

fn read_config_file(path: &Path) -> Result<AppConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
