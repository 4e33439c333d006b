use std::path::Path;

use anyhow::Result;

use super::backend::{parse_device, DetectionParams, DetectorBackend};
use super::registry::{BackendRegistry, BackendSpec};
use super::result::Detection;
use crate::error::PipelineError;
use crate::frame::DecodedImage;
use crate::ingest::ImageRef;

/// The single detector instance of a run.
///
/// Constructed once (which loads the model), then passed by `&mut` to the
/// pipeline for every image. Owns the backend and the fixed scoring
/// parameters; holds no other state between calls.
pub struct DetectorAdapter {
    backend: Box<dyn DetectorBackend>,
    params: DetectionParams,
}

impl DetectorAdapter {
    /// Wrap an already constructed backend.
    ///
    /// Validates the parameters and runs the backend warm-up hook. Failures
    /// here are model-load errors: no image may be processed without a ready
    /// detector.
    pub fn new(mut backend: Box<dyn DetectorBackend>, params: DetectionParams) -> Result<Self> {
        params.validate()?;
        if !backend.loads_model() {
            log::warn!(
                "{} backend loads no model; detections are synthetic and not yolo8 output",
                backend.name()
            );
        }

        if let Some(selector) = &params.device {
            let device = parse_device(selector)?;
            if !backend.supports_device(&device) {
                log::warn!(
                    "backend {} cannot run on device \"{}\", falling back to cpu",
                    backend.name(),
                    selector
                );
            }
        }

        backend.warm_up(&params).map_err(|e| PipelineError::ModelLoad {
            model: backend.name().to_string(),
            message: format!("warm-up failed: {:#}", e),
        })?;

        Ok(Self { backend, params })
    }

    /// Build the named backend from `registry` and wrap it.
    pub fn load(
        registry: &BackendRegistry,
        backend_name: &str,
        model_path: &Path,
        params: DetectionParams,
    ) -> Result<Self> {
        let spec = BackendSpec {
            model_path: model_path.to_path_buf(),
            image_size: params.image_size,
        };
        log::info!(
            "loading {} backend (model {})",
            backend_name,
            model_path.display()
        );
        let backend = registry
            .build(backend_name, &spec)
            .map_err(|e| PipelineError::model_load(model_path, format!("{:#}", e)))?;
        Self::new(backend, params)
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// False when the backend produces synthetic detections (dry runs).
    pub fn loads_model(&self) -> bool {
        self.backend.loads_model()
    }

    pub fn params(&self) -> &DetectionParams {
        &self.params
    }

    /// Decode `image` and score it.
    ///
    /// Every returned row carries the image's relative path. Decode and
    /// backend failures are reported as inference errors naming the image.
    pub fn detect(&mut self, image: &ImageRef) -> Result<Vec<Detection>> {
        let decoded = DecodedImage::open(image.path())
            .map_err(|e| PipelineError::inference(image.relative(), format!("{:#}", e)))?;
        let boxes = self
            .backend
            .detect(&decoded.inference_view(), &self.params)
            .map_err(|e| PipelineError::inference(image.relative(), format!("{:#}", e)))?;

        let detections: Vec<Detection> = boxes
            .iter()
            .map(|b| Detection::from_box(image.relative(), b))
            .collect();
        for d in &detections {
            log::debug!(
                "Detected: box=[{:.4}, {:.4}, {:.4}, {:.4}] conf={:.4}",
                d.xc,
                d.yc,
                d.w,
                d.h,
                d.score
            );
        }
        Ok(detections)
    }
}
