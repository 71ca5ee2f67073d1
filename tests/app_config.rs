use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use ar_detect::config::AppConfig;
use ar_detect::{ActivityThresholds, FrameDimensions};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "AR_DETECT_CONFIG",
        "AR_DETECT_CAMERA_URL",
        "AR_DETECT_BACKEND",
        "AR_DETECT_MODEL_PATH",
        "AR_DETECT_TIMEOUT_MS",
        "AR_DETECT_SHOW_OVERLAY",
        "AR_DETECT_LOG_DIR",
        "AR_DETECT_LOG_ADDR",
        "AR_DETECT_HISTORY_CAPACITY",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(suffix: &str, contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp config");
    std::io::Write::write_all(&mut file, contents.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = AppConfig::load().expect("load config");
    assert_eq!(cfg.camera.url, "stub://camera");
    assert_eq!((cfg.camera.width, cfg.camera.height), (640, 480));
    assert_eq!(cfg.detector.backend, "stub");
    assert_eq!(cfg.detector.timeout, Duration::from_secs(5));
    assert_eq!(cfg.detector.tick, Duration::from_millis(16));
    assert!(cfg.show_overlay);
    assert_eq!(cfg.history_capacity, 21);
    assert_eq!(cfg.log_server.addr, "127.0.0.1:5000");
    assert!(cfg.thresholds.is_none());
}

#[test]
fn loads_json_config_with_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        ".json",
        r#"{
            "camera": { "url": "stub://lobby", "target_fps": 15 },
            "detector": { "timeout_ms": 2500, "min_score": 0.4, "tick_ms": 33 },
            "overlay": { "visible": true },
            "history": { "capacity": 10 },
            "log_server": { "addr": "127.0.0.1:5050", "dir": "/tmp/ar-logs" }
        }"#,
    );

    std::env::set_var("AR_DETECT_CONFIG", file.path());
    std::env::set_var("AR_DETECT_SHOW_OVERLAY", "false");
    std::env::set_var("AR_DETECT_HISTORY_CAPACITY", "5");
    std::env::set_var("AR_DETECT_CAMERA_URL", "stub://garage");

    let cfg = AppConfig::load().expect("load config");
    assert_eq!(cfg.camera.url, "stub://garage");
    assert_eq!(cfg.camera.target_fps, 15);
    assert_eq!(cfg.detector.timeout, Duration::from_millis(2500));
    assert_eq!(cfg.detector.min_score, 0.4);
    assert_eq!(cfg.detector.tick, Duration::from_millis(33));
    assert!(!cfg.show_overlay);
    assert_eq!(cfg.history_capacity, 5);
    assert_eq!(cfg.log_server.addr, "127.0.0.1:5050");
    assert_eq!(cfg.log_server.dir, std::path::PathBuf::from("/tmp/ar-logs"));

    let settings = cfg.pipeline_settings();
    assert_eq!(settings.history_capacity, 5);
    assert!(!settings.overlay_visible);
    assert_eq!(settings.resolution, FrameDimensions::new(640, 480));

    clear_env();
}

#[test]
fn toml_config_with_thresholds_allows_other_resolutions() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        ".toml",
        r#"
[camera]
width = 1280
height = 720

[activity]
walking_movement = 40.0
still_movement = 10.0
low_y = 420.0
close_height = 450.0
"#,
    );
    std::env::set_var("AR_DETECT_CONFIG", file.path());

    let cfg = AppConfig::load().expect("load config");
    assert_eq!((cfg.camera.width, cfg.camera.height), (1280, 720));
    assert_eq!(
        cfg.effective_thresholds(),
        ActivityThresholds {
            walking_movement: 40.0,
            still_movement: 10.0,
            low_y: 420.0,
            close_height: 450.0,
        }
    );
    assert_eq!(
        cfg.pipeline_settings().resolution,
        FrameDimensions::new(1280, 720)
    );

    clear_env();
}

#[test]
fn other_resolution_without_thresholds_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(".json", r#"{ "camera": { "width": 1280, "height": 720 } }"#);
    std::env::set_var("AR_DETECT_CONFIG", file.path());

    let err = AppConfig::load().unwrap_err();
    assert!(err.to_string().contains("calibrated for 640x480"));

    clear_env();
}

#[test]
fn invalid_values_are_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("AR_DETECT_HISTORY_CAPACITY", "0");
    assert!(AppConfig::load().is_err());
    clear_env();

    std::env::set_var("AR_DETECT_TIMEOUT_MS", "0");
    assert!(AppConfig::load().is_err());
    clear_env();

    std::env::set_var("AR_DETECT_TIMEOUT_MS", "soon");
    let err = AppConfig::load().unwrap_err();
    assert!(err.to_string().contains("AR_DETECT_TIMEOUT_MS"));
    clear_env();

    std::env::set_var("AR_DETECT_SHOW_OVERLAY", "sometimes");
    assert!(AppConfig::load().is_err());
    clear_env();

    let file = write_config(".json", r#"{ "detector": { "min_score": 1.5 } }"#);
    std::env::set_var("AR_DETECT_CONFIG", file.path());
    assert!(AppConfig::load().is_err());
    clear_env();

    let file = write_config(".json", r#"{ "camera": { "width": 0 } }"#);
    std::env::set_var("AR_DETECT_CONFIG", file.path());
    assert!(AppConfig::load().is_err());
    clear_env();

    std::env::set_var("AR_DETECT_BACKEND", "tract");
    let err = AppConfig::load().unwrap_err();
    assert!(err.to_string().contains("model path"));
    clear_env();
}

#[test]
fn unreadable_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("AR_DETECT_CONFIG", "/nonexistent/ar_detect.json");
    let err = AppConfig::load().unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));

    let file = write_config(".json", "{ not json");
    std::env::set_var("AR_DETECT_CONFIG", file.path());
    let err = AppConfig::load().unwrap_err();
    assert!(err.to_string().contains("invalid config file"));

    clear_env();
}
