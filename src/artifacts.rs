//! Output artifacts of a detection run.
//!
//! | file              | written            | content                                   |
//! |-------------------|--------------------|-------------------------------------------|
//! | `images.txt`      | before processing  | relative POSIX paths, `\n`-joined         |
//! | `experiment.json` | before processing  | `RunMetadata`, 4-space indented JSON      |
//! | `labels.csv`      | after processing   | `image,label,xc,yc,w,h,score`             |
//! | `times.csv`       | after processing   | `image,total`                             |
//! | `failures.csv`    | after processing   | `image,error` (skip-and-continue only)    |
//!
//! Every artifact is a separate whole-file write. Tables with no rows still
//! get their header line.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;

use crate::detect::{DetectionParams, Detection, Timing};
use crate::error::PipelineError;
use crate::ingest::ImageRef;
use crate::recorder::ImageFailure;

pub const MANIFEST_FILE: &str = "images.txt";
pub const METADATA_FILE: &str = "experiment.json";
pub const LABELS_FILE: &str = "labels.csv";
pub const TIMES_FILE: &str = "times.csv";
pub const FAILURES_FILE: &str = "failures.csv";
pub const LOG_FILE: &str = "detect.log";

const LABELS_HEADER: [&str; 7] = ["image", "label", "xc", "yc", "w", "h", "score"];
const TIMES_HEADER: [&str; 2] = ["image", "total"];
const FAILURES_HEADER: [&str; 2] = ["image", "error"];

/// Model family recorded in `experiment.json`.
pub const MODEL_FAMILY: &str = "yolo8";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ModelParameters {
    pub confidence: f64,
    pub iou: f64,
    pub image_size: u32,
}

/// Run description written before any image is processed.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunMetadata {
    pub task: String,
    pub mode: String,
    pub model: String,
    pub model_path: String,
    pub images_dir: String,
    pub output_dir: String,
    pub model_parameters: ModelParameters,
    pub device: Option<String>,
}

impl RunMetadata {
    pub fn new(
        model_path: &Path,
        images_dir: &Path,
        output_dir: &Path,
        params: &DetectionParams,
    ) -> Self {
        Self {
            task: "detect".to_string(),
            mode: "predict".to_string(),
            model: MODEL_FAMILY.to_string(),
            model_path: model_path.display().to_string(),
            images_dir: images_dir.display().to_string(),
            output_dir: output_dir.display().to_string(),
            model_parameters: ModelParameters {
                confidence: params.confidence,
                iou: params.iou,
                image_size: params.image_size,
            },
            device: params.device.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser)?;
        Ok(String::from_utf8(buf)?)
    }
}

/// Writes the run artifacts into one output directory.
pub struct ArtifactWriter {
    output_dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Create the output directory (and parents) if absent.
    pub fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.output_dir)
            .map_err(|e| PipelineError::io(&self.output_dir, &e))?;
        Ok(())
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.output_dir.join(file)
    }

    pub fn write_manifest(&self, images: &[ImageRef]) -> Result<PathBuf> {
        let content = images
            .iter()
            .map(|image| image.relative())
            .collect::<Vec<_>>()
            .join("\n");
        self.write(MANIFEST_FILE, &content)
    }

    pub fn write_metadata(&self, metadata: &RunMetadata) -> Result<PathBuf> {
        self.write(METADATA_FILE, &metadata.to_json()?)
    }

    pub fn write_detections(&self, detections: &[Detection]) -> Result<PathBuf> {
        let rows = detections.iter().map(|d| {
            vec![
                d.image.clone(),
                d.label.to_string(),
                format_float(d.xc),
                format_float(d.yc),
                format_float(d.w),
                format_float(d.h),
                format_float(d.score),
            ]
        });
        self.write(LABELS_FILE, &render_csv(&LABELS_HEADER, rows))
    }

    pub fn write_timings(&self, timings: &[Timing]) -> Result<PathBuf> {
        let rows = timings
            .iter()
            .map(|t| vec![t.image.clone(), format_float(t.total)]);
        self.write(TIMES_FILE, &render_csv(&TIMES_HEADER, rows))
    }

    pub fn write_failures(&self, failures: &[ImageFailure]) -> Result<PathBuf> {
        let rows = failures
            .iter()
            .map(|f| vec![f.image.clone(), f.reason.clone()]);
        self.write(FAILURES_FILE, &render_csv(&FAILURES_HEADER, rows))
    }

    fn write(&self, file: &str, content: &str) -> Result<PathBuf> {
        let path = self.path(file);
        std::fs::write(&path, content).map_err(|e| PipelineError::io(&path, &e))?;
        Ok(path)
    }
}

fn render_csv<I>(header: &[&str], rows: I) -> String
where
    I: Iterator<Item = Vec<String>>,
{
    let mut out = header.join(",");
    out.push('\n');
    for row in rows {
        let fields: Vec<String> = row.iter().map(|f| quote_field(f)).collect();
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

fn quote_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Shortest round-trip float text: `1.0`, `0.83`, `1e-05`, `1e+16`.
pub fn format_float(value: f64) -> String {
    if !value.is_finite() {
        return if value.is_nan() {
            "nan".to_string()
        } else if value > 0.0 {
            "inf".to_string()
        } else {
            "-inf".to_string()
        };
    }
    let text = format!("{:?}", value);
    match text.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exp),
            };
            let mantissa = mantissa.strip_suffix(".0").unwrap_or(mantissa);
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => text,
    }
}
