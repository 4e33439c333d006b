use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use rescue_detect::config::{ConfigOverrides, DetectConfig};
use rescue_detect::error::classify;
use rescue_detect::FailurePolicy;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "DETECT_CONFIG",
        "DETECT_MODEL",
        "DETECT_BACKEND",
        "DETECT_CONFIDENCE",
        "DETECT_IOU",
        "DETECT_IMAGE_SIZE",
        "DETECT_DEVICE",
        "DETECT_ON_ERROR",
    ] {
        std::env::remove_var(key);
    }
}

fn config_file(toml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(toml.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    if !cfg!(feature = "backend-tract") {
        let err = DetectConfig::load().unwrap_err();
        assert!(err.to_string().contains("argument --backend"));
        return;
    }
    let cfg = DetectConfig::load().expect("load config");
    assert_eq!(cfg.model_path, PathBuf::from("yolov8x.onnx"));
    assert_eq!(cfg.detector.confidence, 0.1);
    assert_eq!(cfg.detector.iou, 0.1);
    assert_eq!(cfg.detector.image_size, 1280);
    assert_eq!(cfg.detector.device, None);
    assert_eq!(cfg.failure_policy, FailurePolicy::FailFast);
    assert_eq!(cfg.backend, "tract");
}

#[test]
fn stub_backend_is_only_used_when_requested() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = DetectConfig::load().map(|cfg| cfg.backend).unwrap_or_default();
    assert_ne!(cfg, "stub");

    std::env::set_var("DETECT_BACKEND", "stub");
    let cfg = DetectConfig::load().expect("load config");
    assert_eq!(cfg.backend, "stub");

    clear_env();
}

#[test]
fn env_parse_errors_name_the_variable() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("DETECT_BACKEND", "stub");
    std::env::set_var("DETECT_IMAGE_SIZE", "large");
    let err = DetectConfig::load().unwrap_err();
    assert_eq!(classify(&err).map(|e| e.code()), Some("CONFIGURATION_ERROR"));
    assert!(err.to_string().contains("argument DETECT_IMAGE_SIZE"));

    clear_env();
}

#[test]
fn file_then_env_then_cli_precedence() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = config_file(
        r#"
model_path = "weights/person.onnx"
on_error = "skip"

[detector]
backend = "stub"
confidence = 0.25
iou = 0.45
image_size = 640
device = "cpu"
"#,
    );
    std::env::set_var("DETECT_CONFIG", file.path());
    std::env::set_var("DETECT_IOU", "0.6");
    std::env::set_var("DETECT_IMAGE_SIZE", "960");

    let overrides = ConfigOverrides {
        image_size: Some(1024),
        ..ConfigOverrides::default()
    };
    let cfg = DetectConfig::load_with(None, &overrides).expect("load config");

    assert_eq!(cfg.model_path, PathBuf::from("weights/person.onnx"));
    assert_eq!(cfg.backend, "stub");
    assert_eq!(cfg.detector.confidence, 0.25);
    assert_eq!(cfg.detector.iou, 0.6);
    assert_eq!(cfg.detector.image_size, 1024);
    assert_eq!(cfg.detector.device.as_deref(), Some("cpu"));
    assert_eq!(cfg.failure_policy, FailurePolicy::SkipAndContinue);

    clear_env();
}

#[test]
fn explicit_path_wins_over_env_path() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let env_file = config_file("[detector]\nbackend = \"stub\"\nconfidence = 0.3\n");
    let cli_file = config_file("[detector]\nbackend = \"stub\"\nconfidence = 0.7\n");
    std::env::set_var("DETECT_CONFIG", env_file.path());

    let cfg = DetectConfig::load_with(Some(cli_file.path()), &ConfigOverrides::default())
        .expect("load config");
    assert_eq!(cfg.detector.confidence, 0.7);

    clear_env();
}

#[test]
fn rejects_out_of_range_confidence() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("DETECT_BACKEND", "stub");
    std::env::set_var("DETECT_CONFIDENCE", "1.5");
    let err = DetectConfig::load().unwrap_err();
    assert_eq!(classify(&err).map(|e| e.code()), Some("CONFIGURATION_ERROR"));
    assert!(err.to_string().contains("argument --confidence"));

    clear_env();
}

#[test]
fn rejects_missing_absolute_model_path() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempfile::tempdir().unwrap();
    let overrides = ConfigOverrides {
        model_path: Some(dir.path().join("missing.onnx")),
        backend: Some("stub".to_string()),
        ..ConfigOverrides::default()
    };
    let err = DetectConfig::load_with(None, &overrides).unwrap_err();
    assert!(err.to_string().contains("argument --model"));
}

#[test]
fn rejects_unknown_backend_and_keys() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("DETECT_BACKEND", "opencv");
    let err = DetectConfig::load().unwrap_err();
    assert!(err.to_string().contains("unknown backend"));
    clear_env();

    let file = config_file("[detector]\nthreshold = 0.2\n");
    assert!(DetectConfig::load_with(Some(file.path()), &ConfigOverrides::default()).is_err());
}

#[test]
fn rejects_bad_failure_policy() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let overrides = ConfigOverrides {
        backend: Some("stub".to_string()),
        on_error: Some("retry".to_string()),
        ..ConfigOverrides::default()
    };
    let err = DetectConfig::load_with(None, &overrides).unwrap_err();
    assert!(err.to_string().contains("argument --on-error"));
}
