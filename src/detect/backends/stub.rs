use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::detect::backend::{DetectionParams, DetectorBackend};
use crate::detect::postprocess::{clamp_unit, non_max_suppression};
use crate::detect::result::BoxDetection;
use crate::frame::InferenceView;

/// Candidate boxes derived from one digest (32 bytes / 8 bytes per box).
const CANDIDATES_PER_IMAGE: usize = 4;
/// Number of pseudo classes candidates are spread over.
const STUB_CLASS_COUNT: u8 = 3;

/// Stub backend for dry runs and testing. Needs no model file.
///
/// Boxes are derived from a SHA-256 digest of the pixels, so identical images
/// always produce identical detections. Class restriction, thresholding and
/// suppression follow the same rules as a real backend.
pub struct StubBackend {
    max_detections: usize,
}

impl StubBackend {
    pub fn new() -> Self {
        Self { max_detections: 300 }
    }

    fn candidates(pixels: &[u8]) -> Vec<BoxDetection> {
        let digest: [u8; 32] = Sha256::digest(pixels).into();
        digest
            .chunks_exact(32 / CANDIDATES_PER_IMAGE)
            .map(|chunk| {
                let unit = |b: u8| b as f64 / 255.0;
                BoxDetection {
                    class_id: (chunk[0] % STUB_CLASS_COUNT) as u32,
                    xc: unit(chunk[1]),
                    yc: unit(chunk[2]),
                    w: 0.05 + unit(chunk[3]) * 0.3,
                    h: 0.05 + unit(chunk[4]) * 0.3,
                    score: unit(chunk[5]),
                }
            })
            .collect()
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn loads_model(&self) -> bool {
        false
    }

    fn detect(
        &mut self,
        view: &InferenceView<'_>,
        params: &DetectionParams,
    ) -> Result<Vec<BoxDetection>> {
        let filtered = Self::candidates(view.pixels())
            .into_iter()
            .filter(|b| params.allows_class(b.class_id))
            .filter(|b| b.score > params.confidence)
            .filter_map(|b| clamp_unit(&b))
            .collect();
        Ok(non_max_suppression(
            filtered,
            params.iou,
            self.max_detections,
        ))
    }
}
