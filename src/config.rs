use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::detect::{BackendRegistry, DetectionParams};
use crate::error::PipelineError;
use crate::pipeline::FailurePolicy;

const DEFAULT_MODEL_PATH: &str = "yolov8x.onnx";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectConfigFile {
    model_path: Option<PathBuf>,
    on_error: Option<String>,
    detector: Option<DetectorConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectorConfigFile {
    backend: Option<String>,
    confidence: Option<f64>,
    iou: Option<f64>,
    image_size: Option<u32>,
    device: Option<String>,
}

/// Values given explicitly on the command line. They win over env and file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub model_path: Option<PathBuf>,
    pub backend: Option<String>,
    pub confidence: Option<f64>,
    pub iou: Option<f64>,
    pub image_size: Option<u32>,
    pub device: Option<String>,
    pub on_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DetectConfig {
    pub model_path: PathBuf,
    /// Resolved backend name. Never `stub` unless asked for explicitly.
    pub backend: String,
    pub detector: DetectionParams,
    pub failure_policy: FailurePolicy,
}

impl DetectConfig {
    /// Defaults, then the file named by `DETECT_CONFIG`, then `DETECT_*` env.
    pub fn load() -> Result<Self> {
        Self::load_with(None, &ConfigOverrides::default())
    }

    /// Layered load: defaults < config file < env < `overrides`.
    ///
    /// `config_path` takes precedence over `DETECT_CONFIG`.
    pub fn load_with(config_path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let env_path = std::env::var("DETECT_CONFIG")
            .ok()
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);
        let file_cfg = match config_path.map(Path::to_path_buf).or(env_path) {
            Some(path) => read_config_file(&path)?,
            None => DetectConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.apply_overrides(overrides)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: DetectConfigFile) -> Result<Self> {
        let defaults = DetectionParams::default();
        let detector_file = file.detector.unwrap_or_default();
        let detector = DetectionParams {
            confidence: detector_file.confidence.unwrap_or(defaults.confidence),
            iou: detector_file.iou.unwrap_or(defaults.iou),
            image_size: detector_file.image_size.unwrap_or(defaults.image_size),
            device: detector_file.device.or(defaults.device),
            classes: defaults.classes,
        };
        let failure_policy = match file.on_error {
            Some(value) => parse_policy("on_error", &value)?,
            None => FailurePolicy::default(),
        };
        Ok(Self {
            model_path: file
                .model_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
            // Empty until validation resolves the registry default.
            backend: detector_file.backend.unwrap_or_default(),
            detector,
            failure_policy,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(path) = env_value("DETECT_MODEL") {
            self.model_path = PathBuf::from(path);
        }
        if let Some(backend) = env_value("DETECT_BACKEND") {
            self.backend = backend;
        }
        if let Some(confidence) = env_value("DETECT_CONFIDENCE") {
            self.detector.confidence = parse_env("DETECT_CONFIDENCE", &confidence, "a number")?;
        }
        if let Some(iou) = env_value("DETECT_IOU") {
            self.detector.iou = parse_env("DETECT_IOU", &iou, "a number")?;
        }
        if let Some(size) = env_value("DETECT_IMAGE_SIZE") {
            self.detector.image_size =
                parse_env("DETECT_IMAGE_SIZE", &size, "a positive integer")?;
        }
        if let Some(device) = env_value("DETECT_DEVICE") {
            self.detector.device = Some(device);
        }
        if let Some(policy) = env_value("DETECT_ON_ERROR") {
            self.failure_policy = parse_policy("DETECT_ON_ERROR", &policy)?;
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: &ConfigOverrides) -> Result<()> {
        if let Some(path) = &overrides.model_path {
            self.model_path = path.clone();
        }
        if let Some(backend) = &overrides.backend {
            self.backend = backend.clone();
        }
        if let Some(confidence) = overrides.confidence {
            self.detector.confidence = confidence;
        }
        if let Some(iou) = overrides.iou {
            self.detector.iou = iou;
        }
        if let Some(size) = overrides.image_size {
            self.detector.image_size = size;
        }
        if let Some(device) = &overrides.device {
            self.detector.device = Some(device.clone());
        }
        if let Some(policy) = &overrides.on_error {
            self.failure_policy = parse_policy("--on-error", policy)?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        let registry = BackendRegistry::with_builtin();
        self.backend = self.backend.trim().to_lowercase();
        if self.backend.is_empty() {
            self.backend = registry
                .default_name()
                .ok_or_else(|| {
                    PipelineError::configuration(
                        "--backend",
                        "no model backend compiled in (build with feature backend-tract), \
                         pass --backend stub for a dry run without a model",
                    )
                })?
                .to_string();
        }
        if !registry.contains(&self.backend) {
            return Err(PipelineError::configuration(
                "--backend",
                format!(
                    "unknown backend \"{}\" (available: {})",
                    self.backend,
                    registry.list().join(", ")
                ),
            )
            .into());
        }
        self.detector.validate()?;
        if self.model_path.is_absolute() && !self.model_path.exists() {
            return Err(PipelineError::configuration(
                "--model",
                format!("path \"{}\" not found", self.model_path.display()),
            )
            .into());
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str, expected: &str) -> Result<T> {
    value.parse().map_err(|_| {
        PipelineError::configuration(key, format!("must be {} (got \"{}\")", expected, value))
            .into()
    })
}

fn parse_policy(argument: &str, value: &str) -> Result<FailurePolicy> {
    value
        .parse()
        .map_err(|e: anyhow::Error| PipelineError::configuration(argument, e.to_string()).into())
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn read_config_file(path: &Path) -> Result<DetectConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
