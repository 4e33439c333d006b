//! Batch detection orchestrator.
//!
//! Sequence:
//! 1. Enumerate images under the input directory (sorted)
//! 2. Write the manifest (`images.txt`)
//! 3. Write the run metadata (`experiment.json`)
//! 4. For each image: detect, record, report progress
//! 5. Write the detections table (`labels.csv`)
//! 6. Write the timings table (`times.csv`)
//!
//! Steps 1-3 happen before the first image is touched, so an interrupted run
//! still documents its intended workload and configuration. When a run stops
//! early (fail-fast error or cancellation) the tables are flushed with the rows
//! of the images completed so far, and never contain a row for the image that
//! failed or any image after it.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::artifacts::{ArtifactWriter, RunMetadata, LABELS_FILE, MANIFEST_FILE, METADATA_FILE, TIMES_FILE};
use crate::detect::{DetectionParams, DetectorAdapter, Detection};
use crate::error::PipelineError;
use crate::ingest::{enumerate_images, ImageRef};
use crate::progress::{Clock, MonotonicClock, ProgressObserver, ProgressUpdate, Stopwatch};
use crate::recorder::RunRecorder;

/// What the orchestrator does when one image fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop the run at the first failing image.
    #[default]
    FailFast,
    /// Log the failure, record it in `failures.csv`, continue with the next image.
    SkipAndContinue,
}

impl FromStr for FailurePolicy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "abort" | "fail-fast" => Ok(Self::FailFast),
            "skip" | "continue" => Ok(Self::SkipAndContinue),
            other => Err(anyhow!(
                "unknown failure policy \"{}\" (expected abort or skip)",
                other
            )),
        }
    }
}

/// Where a run currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStage {
    Idle,
    Enumerating,
    ManifestWritten,
    MetadataWritten,
    Processing { index: usize, total: usize },
    DetectionsWritten,
    TimingsWritten,
    Done,
    /// Stopped early by a fail-fast error or cancellation; partial tables flushed.
    Aborted { processed: usize, total: usize },
}

/// Result of scoring one image.
pub enum ImageOutcome {
    Detected {
        detections: Vec<Detection>,
        elapsed_seconds: f64,
    },
    Failed(anyhow::Error),
}

/// Cooperative cancellation, checked before each image.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub images_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Recorded in the metadata; the adapter has already loaded it.
    pub model_path: PathBuf,
    pub failure_policy: FailurePolicy,
}

/// Totals of a completed run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    pub total_images: usize,
    pub processed: usize,
    pub detections: usize,
    pub skipped: usize,
    pub elapsed: Duration,
}

pub struct Pipeline {
    config: PipelineConfig,
    writer: ArtifactWriter,
    clock: Arc<dyn Clock>,
    cancel: CancelFlag,
    stage: PipelineStage,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let writer = ArtifactWriter::new(config.output_dir.clone());
        Self {
            config,
            writer,
            clock: Arc::new(MonotonicClock::new()),
            cancel: CancelFlag::new(),
            stage: PipelineStage::Idle,
        }
    }

    /// Replace the time source used for per-image timings and progress.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Full run with an already loaded detector.
    pub fn run(
        &mut self,
        adapter: &mut DetectorAdapter,
        observer: &mut dyn ProgressObserver,
    ) -> Result<RunSummary> {
        let params = adapter.params().clone();
        let images = self.prepare(&params)?;
        self.process(&images, adapter, observer)
    }

    /// Prepare, then build the detector with `load`, then process.
    ///
    /// The manifest and metadata exist before `load` runs, so a model that
    /// fails to load still leaves the documented workload and no tables.
    pub fn run_with_loader<F>(
        &mut self,
        params: &DetectionParams,
        load: F,
        observer: &mut dyn ProgressObserver,
    ) -> Result<RunSummary>
    where
        F: FnOnce() -> Result<DetectorAdapter>,
    {
        let images = self.prepare(params)?;
        let mut adapter = load()?;
        self.process(&images, &mut adapter, observer)
    }

    /// Enumerate the workload and write manifest + metadata.
    pub fn prepare(&mut self, params: &DetectionParams) -> Result<Vec<ImageRef>> {
        self.transition(PipelineStage::Enumerating);
        log::info!("Enumerate images...");
        let images = enumerate_images(&self.config.images_dir)?;
        log::info!("Image count: {}", images.len());

        self.writer.ensure_dir()?;
        log::info!("Save image names to \"{}\"...", MANIFEST_FILE);
        self.writer.write_manifest(&images)?;
        self.transition(PipelineStage::ManifestWritten);

        let metadata = RunMetadata::new(
            &self.config.model_path,
            &self.config.images_dir,
            &self.config.output_dir,
            params,
        );
        log::info!("Save metadata to \"{}\"...", METADATA_FILE);
        self.writer.write_metadata(&metadata)?;
        self.transition(PipelineStage::MetadataWritten);
        Ok(images)
    }

    /// Score every image in order, then write the tables.
    pub fn process(
        &mut self,
        images: &[ImageRef],
        adapter: &mut DetectorAdapter,
        observer: &mut dyn ProgressObserver,
    ) -> Result<RunSummary> {
        let result = self.process_inner(images, adapter, observer);
        observer.on_finish();
        result
    }

    fn process_inner(
        &mut self,
        images: &[ImageRef],
        adapter: &mut DetectorAdapter,
        observer: &mut dyn ProgressObserver,
    ) -> Result<RunSummary> {
        let total = images.len();
        let run_stopwatch = Stopwatch::start(self.clock.clone());
        let mut recorder = RunRecorder::new();

        for (index, image) in images.iter().enumerate() {
            if self.cancel.is_cancelled() {
                log::warn!(
                    "run cancelled after {} of {} images; flushing partial tables",
                    index,
                    total
                );
                self.flush_partial(&recorder, index, total);
                return Err(PipelineError::Cancelled {
                    processed: index,
                    total,
                }
                .into());
            }

            self.transition(PipelineStage::Processing { index, total });
            log::info!("Process image: {}", image.path().display());

            match self.detect_one(adapter, image) {
                ImageOutcome::Detected {
                    detections,
                    elapsed_seconds,
                } => recorder.record(image.relative(), elapsed_seconds, detections),
                ImageOutcome::Failed(err) => match self.config.failure_policy {
                    FailurePolicy::FailFast => {
                        log::error!("{:#}", err);
                        log::error!(
                            "aborting run at image {} of {}; flushing partial tables",
                            index + 1,
                            total
                        );
                        self.flush_partial(&recorder, index, total);
                        return Err(err);
                    }
                    FailurePolicy::SkipAndContinue => {
                        log::warn!("skipping image {}: {:#}", image.relative(), err);
                        recorder.record_failure(image.relative(), &format!("{:#}", err));
                    }
                },
            }

            let update = ProgressUpdate::compute(
                run_stopwatch.elapsed(),
                index + 1,
                total,
                recorder.detection_count(),
            )?;
            observer.on_progress(&update);
        }

        self.write_tables(&recorder)?;
        self.transition(PipelineStage::Done);

        let summary = RunSummary {
            total_images: total,
            processed: recorder.processed(),
            detections: recorder.detection_count(),
            skipped: recorder.failures().len(),
            elapsed: run_stopwatch.elapsed(),
        };
        log::info!(
            "done: {} images, {} detections, {} skipped",
            summary.processed,
            summary.detections,
            summary.skipped
        );
        Ok(summary)
    }

    fn detect_one(&self, adapter: &mut DetectorAdapter, image: &ImageRef) -> ImageOutcome {
        let stopwatch = Stopwatch::start(self.clock.clone());
        let result = adapter.detect(image);
        let elapsed_seconds = stopwatch.elapsed_seconds();
        match result {
            Ok(detections) => ImageOutcome::Detected {
                detections,
                elapsed_seconds,
            },
            Err(err) => ImageOutcome::Failed(err),
        }
    }

    fn write_tables(&mut self, recorder: &RunRecorder) -> Result<()> {
        log::info!("Save labels to \"{}\"...", LABELS_FILE);
        self.writer.write_detections(recorder.detections())?;
        self.transition(PipelineStage::DetectionsWritten);

        log::info!("Save processing times to \"{}\"...", TIMES_FILE);
        self.writer.write_timings(recorder.timings())?;
        self.transition(PipelineStage::TimingsWritten);

        if self.config.failure_policy == FailurePolicy::SkipAndContinue {
            self.writer.write_failures(recorder.failures())?;
        }
        Ok(())
    }

    /// Best effort: the error that stopped the run wins over a flush error.
    fn flush_partial(&mut self, recorder: &RunRecorder, index: usize, total: usize) {
        let flushed = self
            .writer
            .write_detections(recorder.detections())
            .and_then(|_| self.writer.write_timings(recorder.timings()))
            .and_then(|path| match self.config.failure_policy {
                FailurePolicy::SkipAndContinue => self.writer.write_failures(recorder.failures()),
                FailurePolicy::FailFast => Ok(path),
            });
        if let Err(e) = flushed {
            log::error!("failed to flush partial tables: {:#}", e);
        }
        self.transition(PipelineStage::Aborted {
            processed: index,
            total,
        });
    }

    fn transition(&mut self, next: PipelineStage) {
        log::debug!("pipeline stage {:?} -> {:?}", self.stage, next);
        self.stage = next;
    }
}
