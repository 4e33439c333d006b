//! Batch person detection over image directories.
//!
//! A run enumerates every image under an input directory, scores each one
//! with a single detector instance, and writes a self-describing set of
//! artifacts into an output directory:
//!
//! - `images.txt`: the manifest, one relative POSIX path per line
//! - `experiment.json`: model, directories and detector parameters
//! - `labels.csv`: one row per detected person box
//! - `times.csv`: one row per processed image with its wall time
//! - `detect.log`: debug-level run log
//!
//! # Module Structure
//!
//! - `ingest`: image discovery and ordering
//! - `frame`: decoded pixels and the read-only view handed to backends
//! - `detect`: backend trait, registry, built-in backends, adapter
//! - `recorder`: per-run accumulation of detections and timings
//! - `progress`: clocks, stopwatches, progress math and observers
//! - `artifacts`: output file formats
//! - `pipeline`: the orchestrator
//! - `config`, `logging`, `ui`: ambient plumbing for the binary

pub mod artifacts;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod logging;
pub mod pipeline;
pub mod progress;
pub mod recorder;
pub mod ui;

pub use artifacts::{ArtifactWriter, RunMetadata};
pub use config::{ConfigOverrides, DetectConfig};
pub use detect::{
    BackendRegistry, BoxDetection, Detection, DetectionParams, DetectorAdapter, DetectorBackend,
    Timing,
};
pub use error::PipelineError;
pub use frame::{DecodedImage, InferenceView};
pub use ingest::{enumerate_images, ImageRef};
pub use pipeline::{CancelFlag, FailurePolicy, Pipeline, PipelineConfig, PipelineStage, RunSummary};
pub use progress::{Clock, MonotonicClock, ProgressObserver, ProgressUpdate, SteppingClock};
pub use recorder::RunRecorder;
