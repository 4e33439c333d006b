use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};

use rescue_detect::detect::StubBackend;
use rescue_detect::error::classify;
use rescue_detect::progress::NoProgress;
use rescue_detect::{
    BoxDetection, CancelFlag, DetectionParams, DetectorAdapter, DetectorBackend, FailurePolicy,
    InferenceView, Pipeline, PipelineConfig, PipelineError, PipelineStage, ProgressUpdate,
    SteppingClock,
};

/// Answers by image width: 10 px wide gets one person box, 20 px gets
/// nothing, 30 px fails.
struct ScriptedBackend;

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(
        &mut self,
        view: &InferenceView<'_>,
        _params: &DetectionParams,
    ) -> Result<Vec<BoxDetection>> {
        match view.width() {
            10 => Ok(vec![BoxDetection {
                class_id: 0,
                xc: 0.5,
                yc: 0.5,
                w: 0.2,
                h: 0.3,
                score: 0.9,
            }]),
            30 => Err(anyhow!("tensor shape mismatch")),
            _ => Ok(Vec::new()),
        }
    }
}

fn write_image(root: &Path, rel: &str, width: u32) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    image::RgbImage::from_pixel(width, 8, image::Rgb([120, 60, 30]))
        .save(&path)
        .unwrap();
}

fn pipeline(images: &Path, output: &Path, policy: FailurePolicy) -> Pipeline {
    Pipeline::new(PipelineConfig {
        images_dir: images.to_path_buf(),
        output_dir: output.to_path_buf(),
        model_path: "yolov8x.onnx".into(),
        failure_policy: policy,
    })
    .with_clock(Arc::new(SteppingClock::new(Duration::from_millis(250))))
}

fn scripted_adapter() -> DetectorAdapter {
    DetectorAdapter::new(Box::new(ScriptedBackend), DetectionParams::default()).unwrap()
}

fn read(dir: &Path, file: &str) -> String {
    fs::read_to_string(dir.join(file)).unwrap()
}

#[test]
fn two_image_run_writes_all_artifacts() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_image(input.path(), "b.png", 20);
    write_image(input.path(), "a.jpg", 10);
    fs::write(input.path().join("notes.txt"), b"not an image").unwrap();

    let mut pipeline = pipeline(input.path(), output.path(), FailurePolicy::FailFast);
    let summary = pipeline
        .run(&mut scripted_adapter(), &mut NoProgress)
        .unwrap();

    assert_eq!(summary.total_images, 2);
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.detections, 1);
    assert_eq!(pipeline.stage(), PipelineStage::Done);

    assert_eq!(read(output.path(), "images.txt"), "a.jpg\nb.png");
    assert_eq!(
        read(output.path(), "labels.csv"),
        "image,label,xc,yc,w,h,score\na.jpg,0,0.5,0.5,0.2,0.3,0.9\n"
    );
    assert_eq!(
        read(output.path(), "times.csv"),
        "image,total\na.jpg,0.25\nb.png,0.25\n"
    );
    let meta: serde_json::Value =
        serde_json::from_str(&read(output.path(), "experiment.json")).unwrap();
    assert_eq!(meta["model"], "yolo8");
    assert_eq!(meta["model_path"], "yolov8x.onnx");
    assert_eq!(meta["model_parameters"]["image_size"], 1280);
    assert!(!output.path().join("failures.csv").exists());
}

#[test]
fn nested_images_are_named_by_relative_posix_path() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_image(input.path(), "site2/drone/IMG_2.PNG", 10);
    write_image(input.path(), "site1/IMG_1.jpg", 20);

    pipeline(input.path(), output.path(), FailurePolicy::FailFast)
        .run(&mut scripted_adapter(), &mut NoProgress)
        .unwrap();

    assert_eq!(
        read(output.path(), "images.txt"),
        "site1/IMG_1.jpg\nsite2/drone/IMG_2.PNG"
    );
    let labels = read(output.path(), "labels.csv");
    assert!(labels.contains("\nsite2/drone/IMG_2.PNG,0,"));
}

#[test]
fn empty_directory_yields_header_only_tables() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let mut calls = 0;
    let mut observer = |_: &ProgressUpdate| calls += 1;

    let summary = pipeline(input.path(), output.path(), FailurePolicy::FailFast)
        .run(&mut scripted_adapter(), &mut observer)
        .unwrap();

    assert_eq!(summary.total_images, 0);
    assert_eq!(calls, 0);
    assert_eq!(read(output.path(), "images.txt"), "");
    assert_eq!(read(output.path(), "labels.csv"), "image,label,xc,yc,w,h,score\n");
    assert_eq!(read(output.path(), "times.csv"), "image,total\n");
}

#[test]
fn repeated_runs_are_byte_identical() {
    let input = tempfile::tempdir().unwrap();
    for (i, name) in ["c.jpg", "a.png", "sub/b.png", "sub/d.jpg"].iter().enumerate() {
        let path = input.path().join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        image::RgbImage::from_fn(32, 24, |x, y| {
            image::Rgb([(x * 7 + i as u32) as u8, (y * 11) as u8, (x ^ y) as u8])
        })
        .save(&path)
        .unwrap();
    }

    let params = DetectionParams {
        confidence: 0.0,
        ..DetectionParams::default()
    };
    let mut outputs = Vec::new();
    for _ in 0..2 {
        let output = tempfile::tempdir().unwrap();
        let mut adapter = DetectorAdapter::new(Box::new(StubBackend::new()), params.clone()).unwrap();
        pipeline(input.path(), output.path(), FailurePolicy::FailFast)
            .run(&mut adapter, &mut NoProgress)
            .unwrap();
        outputs.push(output);
    }

    for file in ["images.txt", "labels.csv", "times.csv"] {
        assert_eq!(
            fs::read(outputs[0].path().join(file)).unwrap(),
            fs::read(outputs[1].path().join(file)).unwrap(),
            "{file} differs between runs"
        );
    }
}

#[test]
fn row_counts_match_images_and_detections() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_image(input.path(), "1.png", 10);
    write_image(input.path(), "2.png", 20);
    write_image(input.path(), "3.png", 10);

    let summary = pipeline(input.path(), output.path(), FailurePolicy::FailFast)
        .run(&mut scripted_adapter(), &mut NoProgress)
        .unwrap();

    let manifest = read(output.path(), "images.txt");
    let times = read(output.path(), "times.csv");
    let labels = read(output.path(), "labels.csv");
    assert_eq!(manifest.lines().count(), 3);
    assert_eq!(times.lines().count() - 1, manifest.lines().count());
    assert_eq!(labels.lines().count() - 1, summary.detections);
    assert_eq!(summary.detections, 2);
}

#[test]
fn fail_fast_stops_at_second_of_three_images() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_image(input.path(), "a.png", 10);
    write_image(input.path(), "b.png", 30);
    write_image(input.path(), "c.png", 10);

    let mut pipeline = pipeline(input.path(), output.path(), FailurePolicy::FailFast);
    let err = pipeline
        .run(&mut scripted_adapter(), &mut NoProgress)
        .unwrap_err();
    assert_eq!(
        pipeline.stage(),
        PipelineStage::Aborted {
            processed: 1,
            total: 3
        }
    );

    match classify(&err) {
        Some(PipelineError::Inference { image, message }) => {
            assert_eq!(image, "b.png");
            assert!(message.contains("tensor shape mismatch"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(read(output.path(), "images.txt"), "a.png\nb.png\nc.png");
    assert!(output.path().join("experiment.json").exists());
    assert_eq!(
        read(output.path(), "labels.csv"),
        "image,label,xc,yc,w,h,score\na.png,0,0.5,0.5,0.2,0.3,0.9\n"
    );
    assert_eq!(read(output.path(), "times.csv"), "image,total\na.png,0.25\n");
}

#[test]
fn skip_policy_continues_and_records_failures() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_image(input.path(), "a.png", 10);
    write_image(input.path(), "b.png", 30);
    write_image(input.path(), "c.png", 10);
    fs::write(input.path().join("d.jpg"), b"not really a jpeg").unwrap();

    let summary = pipeline(input.path(), output.path(), FailurePolicy::SkipAndContinue)
        .run(&mut scripted_adapter(), &mut NoProgress)
        .unwrap();

    assert_eq!(summary.total_images, 4);
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.skipped, 2);
    assert_eq!(
        read(output.path(), "times.csv"),
        "image,total\na.png,0.25\nc.png,0.25\n"
    );
    let failures = read(output.path(), "failures.csv");
    let mut lines = failures.lines();
    assert_eq!(lines.next(), Some("image,error"));
    assert!(lines.next().unwrap().starts_with("b.png,"));
    assert!(lines.next().unwrap().starts_with("d.jpg,"));
    assert_eq!(lines.next(), None);
}

#[test]
fn cancellation_flushes_completed_rows_only() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_image(input.path(), "a.png", 10);
    write_image(input.path(), "b.png", 10);
    write_image(input.path(), "c.png", 10);

    let cancel = CancelFlag::new();
    let trigger = cancel.clone();
    let mut observer = move |_: &ProgressUpdate| trigger.cancel();

    let err = pipeline(input.path(), output.path(), FailurePolicy::FailFast)
        .with_cancel_flag(cancel)
        .run(&mut scripted_adapter(), &mut observer)
        .unwrap_err();

    assert_eq!(
        classify(&err),
        Some(&PipelineError::Cancelled {
            processed: 1,
            total: 3
        })
    );
    assert_eq!(read(output.path(), "times.csv"), "image,total\na.png,0.25\n");
    assert_eq!(read(output.path(), "labels.csv").lines().count(), 2);
}

#[test]
fn observer_sees_every_image_in_order() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_image(input.path(), "a.png", 10);
    write_image(input.path(), "b.png", 20);
    write_image(input.path(), "c.png", 10);

    let mut seen = Vec::new();
    let mut observer = |u: &ProgressUpdate| seen.push((u.processed, u.total, u.detected));
    pipeline(input.path(), output.path(), FailurePolicy::FailFast)
        .run(&mut scripted_adapter(), &mut observer)
        .unwrap();

    assert_eq!(seen, vec![(1, 3, 1), (2, 3, 1), (3, 3, 2)]);
}

#[test]
fn missing_input_directory_is_configuration_error() {
    let output = tempfile::tempdir().unwrap();
    let missing = output.path().join("does-not-exist");
    let err = pipeline(&missing, output.path(), FailurePolicy::FailFast)
        .run(&mut scripted_adapter(), &mut NoProgress)
        .unwrap_err();
    assert_eq!(classify(&err).map(|e| e.code()), Some("CONFIGURATION_ERROR"));
    assert!(!output.path().join("images.txt").exists());
}

#[test]
fn model_load_failure_leaves_manifest_and_metadata_only() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_image(input.path(), "a.png", 10);

    let mut pipeline = pipeline(input.path(), output.path(), FailurePolicy::FailFast);
    let err = pipeline
        .run_with_loader(
            &DetectionParams::default(),
            || {
                Err(PipelineError::model_load(
                    Path::new("yolov8x.onnx"),
                    "weights unreadable",
                )
                .into())
            },
            &mut NoProgress,
        )
        .unwrap_err();

    assert_eq!(classify(&err).map(|e| e.code()), Some("MODEL_LOAD_ERROR"));
    assert_eq!(pipeline.stage(), PipelineStage::MetadataWritten);
    assert_eq!(read(output.path(), "images.txt"), "a.png");
    assert!(output.path().join("experiment.json").exists());
    assert!(!output.path().join("labels.csv").exists());
    assert!(!output.path().join("times.csv").exists());
}
