use std::sync::OnceLock;

use anyhow::{anyhow, Result};

use crate::detect::result::{BoxDetection, PERSON_CLASS_ID};
use crate::error::PipelineError;
use crate::frame::InferenceView;

/// Fixed per-run scoring configuration handed to the backend on every call.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionParams {
    /// Minimum class score kept by the backend.
    pub confidence: f64,
    /// NMS overlap cutoff.
    pub iou: f64,
    /// Square input size the model resizes images to. Backends round up to their stride.
    pub image_size: u32,
    /// Compute device selector ("cpu", "cuda", "0,1", ...). `None` = backend default.
    pub device: Option<String>,
    /// Class ids the backend may emit. Everything else is dropped before NMS.
    pub classes: Vec<u32>,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            confidence: 0.1,
            iou: 0.1,
            image_size: 1280,
            device: None,
            classes: vec![PERSON_CLASS_ID],
        }
    }
}

impl DetectionParams {
    pub fn allows_class(&self, class_id: u32) -> bool {
        self.classes.contains(&class_id)
    }

    /// Check ranges. Errors name the command-line option that sets the field.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(PipelineError::configuration(
                "--confidence",
                format!("must be within [0, 1] (got {})", self.confidence),
            )
            .into());
        }
        if !(0.0..=1.0).contains(&self.iou) {
            return Err(PipelineError::configuration(
                "--iou",
                format!("must be within [0, 1] (got {})", self.iou),
            )
            .into());
        }
        if self.image_size == 0 {
            return Err(
                PipelineError::configuration("--image-size", "must be greater than zero").into(),
            );
        }
        if self.classes.is_empty() {
            return Err(anyhow!("at least one class must be requested"));
        }
        if let Some(device) = &self.device {
            parse_device(device)
                .map_err(|e| PipelineError::configuration("--device", e.to_string()))?;
        }
        Ok(())
    }
}

/// Parsed compute device selector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Mps,
    /// CUDA devices by index. Empty means "any".
    Cuda(Vec<u32>),
}

/// Parse a device selector: `cpu`, `mps`, `cuda`, `cuda:0`, `0`, or `0,1,2`.
pub fn parse_device(selector: &str) -> Result<Device> {
    static DEVICE_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = DEVICE_RE.get_or_init(|| {
        regex::Regex::new(r"^(cpu|mps|cuda|cuda:\d+|\d+(,\d+)*)$").expect("device selector regex")
    });

    let selector = selector.trim().to_lowercase();
    if !re.is_match(&selector) {
        return Err(anyhow!(
            "device must be one of cpu, mps, cuda, cuda:N or a GPU index list like 0,1 (got \"{}\")",
            selector
        ));
    }
    let device = match selector.as_str() {
        "cpu" => Device::Cpu,
        "mps" => Device::Mps,
        "cuda" => Device::Cuda(Vec::new()),
        other => {
            let indices = other.strip_prefix("cuda:").unwrap_or(other);
            let parsed = indices
                .split(',')
                .map(|idx| idx.parse::<u32>())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| anyhow!("invalid device index in \"{}\": {}", selector, e))?;
            Device::Cuda(parsed)
        }
    };
    Ok(device)
}

/// Detector backend trait.
///
/// A backend is constructed once per run (model loading happens in its
/// constructor) and then called once per image, in manifest order.
/// Implementations must not retain the pixel slice beyond the `detect` call.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Devices this backend can actually execute on.
    fn supports_device(&self, device: &Device) -> bool {
        matches!(device, Device::Cpu)
    }

    /// Score one image.
    ///
    /// Returned boxes are normalized to the view's dimensions and already
    /// restricted to `params.classes`, thresholded and suppressed.
    fn detect(&mut self, view: &InferenceView<'_>, params: &DetectionParams)
        -> Result<Vec<BoxDetection>>;

    /// False for backends that score without reading the model file.
    fn loads_model(&self) -> bool {
        true
    }

    /// Optional warm-up hook.
    fn warm_up(&mut self, _params: &DetectionParams) -> Result<()> {
        Ok(())
    }
}
