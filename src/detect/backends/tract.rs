#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use tract_onnx::prelude::*;

use crate::detect::backend::{DetectionParams, DetectorBackend};
use crate::detect::postprocess::{clamp_unit, non_max_suppression};
use crate::detect::result::BoxDetection;
use crate::frame::InferenceView;

/// YOLOv8 downsampling stride; input sizes are rounded up to a multiple of it.
const MODEL_STRIDE: u32 = 32;
/// Letterbox padding value (ultralytics gray).
const PAD_VALUE: f32 = 114.0 / 255.0;
const MAX_DETECTIONS: usize = 300;

/// Tract-based backend for YOLOv8 ONNX exports.
///
/// This backend loads a local model file once and performs letterboxed
/// inference on RGB images. Output layout is `[1, 4 + classes, anchors]` with
/// box centers and sizes in input pixels followed by per-class scores.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
}

/// Letterbox geometry mapping model input pixels back to the source image.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Letterbox {
    scale: f64,
    pad_x: f64,
    pad_y: f64,
    width: u32,
    height: u32,
}

impl Letterbox {
    fn new(src_width: u32, src_height: u32, input_size: u32) -> Self {
        let scale = (input_size as f64 / src_width as f64).min(input_size as f64 / src_height as f64);
        let width = ((src_width as f64 * scale).round() as u32).clamp(1, input_size);
        let height = ((src_height as f64 * scale).round() as u32).clamp(1, input_size);
        Self {
            scale,
            pad_x: ((input_size - width) / 2) as f64,
            pad_y: ((input_size - height) / 2) as f64,
            width,
            height,
        }
    }

    /// Map a center-format box in input pixels to coordinates normalized to the source.
    fn to_source(&self, b: BoxDetection, src_width: u32, src_height: u32) -> BoxDetection {
        BoxDetection {
            xc: (b.xc - self.pad_x) / self.scale / src_width as f64,
            yc: (b.yc - self.pad_y) / self.scale / src_height as f64,
            w: b.w / self.scale / src_width as f64,
            h: b.h / self.scale / src_height as f64,
            ..b
        }
    }
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for square inputs of `image_size`.
    pub fn new<P: AsRef<Path>>(model_path: P, image_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let input_size = round_to_stride(image_size);
        if input_size != image_size {
            log::warn!(
                "image size {} is not a multiple of {}, using {}",
                image_size,
                MODEL_STRIDE,
                input_size
            );
        }
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self { model, input_size })
    }

    fn build_input(&self, view: &InferenceView<'_>) -> Result<(Tensor, Letterbox)> {
        let letterbox = Letterbox::new(view.width(), view.height(), self.input_size);
        let source = image::RgbImage::from_raw(view.width(), view.height(), view.pixels().to_vec())
            .ok_or_else(|| anyhow!("pixel buffer does not match {}x{}", view.width(), view.height()))?;
        let resized = image::imageops::resize(
            &source,
            letterbox.width,
            letterbox.height,
            FilterType::Triangle,
        );

        let side = self.input_size as usize;
        let x0 = letterbox.pad_x as usize;
        let y0 = letterbox.pad_y as usize;
        let (rw, rh) = (letterbox.width as usize, letterbox.height as usize);
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
            if x < x0 || y < y0 || x >= x0 + rw || y >= y0 + rh {
                return PAD_VALUE;
            }
            resized.get_pixel((x - x0) as u32, (y - y0) as u32)[c] as f32 / 255.0
        });
        Ok((input.into_tensor(), letterbox))
    }

    fn decode(&self, outputs: TVec<TValue>, params: &DetectionParams) -> Result<Vec<BoxDetection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let preds = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = preds.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 || shape[1] < 5 {
            return Err(anyhow!(
                "unexpected YOLOv8 output shape {:?}, expected [1, 4 + classes, anchors]",
                shape
            ));
        }
        let preds = preds
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("model output is not three-dimensional")?;
        let num_classes = shape[1] - 4;
        let anchors = shape[2];

        let mut candidates = Vec::new();
        for i in 0..anchors {
            let mut best_class = 0usize;
            let mut best_score = f32::NEG_INFINITY;
            for c in 0..num_classes {
                let score = preds[[0, 4 + c, i]];
                if score > best_score {
                    best_score = score;
                    best_class = c;
                }
            }
            let score = best_score as f64;
            if score <= params.confidence || !params.allows_class(best_class as u32) {
                continue;
            }
            candidates.push(BoxDetection {
                class_id: best_class as u32,
                xc: preds[[0, 0, i]] as f64,
                yc: preds[[0, 1, i]] as f64,
                w: preds[[0, 2, i]] as f64,
                h: preds[[0, 3, i]] as f64,
                score,
            });
        }
        Ok(non_max_suppression(candidates, params.iou, MAX_DETECTIONS))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(
        &mut self,
        view: &InferenceView<'_>,
        params: &DetectionParams,
    ) -> Result<Vec<BoxDetection>> {
        let (input, letterbox) = self.build_input(view)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let boxes = self.decode(outputs, params)?;
        Ok(boxes
            .into_iter()
            .map(|b| letterbox.to_source(b, view.width(), view.height()))
            .filter_map(|b| clamp_unit(&b))
            .collect())
    }
}

fn round_to_stride(size: u32) -> u32 {
    size.div_ceil(MODEL_STRIDE) * MODEL_STRIDE
}
