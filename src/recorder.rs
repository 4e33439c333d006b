use crate::detect::{Detection, Timing};

/// An image that could not be processed and was skipped.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageFailure {
    pub image: String,
    pub reason: String,
}

/// Append-only per-run accumulation of detections and timings.
///
/// Rows are kept in insertion order, which the pipeline guarantees is
/// manifest order. Nothing is deduplicated or reordered.
#[derive(Clone, Debug, Default)]
pub struct RunRecorder {
    detections: Vec<Detection>,
    timings: Vec<Timing>,
    failures: Vec<ImageFailure>,
}

impl RunRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one successfully processed image.
    pub fn record(&mut self, image: &str, elapsed_seconds: f64, detections: Vec<Detection>) {
        self.timings.push(Timing {
            image: image.to_string(),
            total: elapsed_seconds.max(0.0),
        });
        self.detections.extend(detections);
    }

    /// Record an image that was skipped after a failure. It gets no timing row.
    pub fn record_failure(&mut self, image: &str, reason: &str) {
        self.failures.push(ImageFailure {
            image: image.to_string(),
            reason: reason.to_string(),
        });
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn timings(&self) -> &[Timing] {
        &self.timings
    }

    pub fn failures(&self) -> &[ImageFailure] {
        &self.failures
    }

    /// Number of images recorded so far.
    pub fn processed(&self) -> usize {
        self.timings.len()
    }

    pub fn detection_count(&self) -> usize {
        self.detections.len()
    }
}
