//! detect_yolo8 - score every image under a directory for persons and write
//! the run artifacts (manifest, metadata, labels, times, log) to an output
//! directory.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use rescue_detect::error::{classify, PipelineError};
use rescue_detect::ui::Ui;
use rescue_detect::{
    logging, BackendRegistry, CancelFlag, ConfigOverrides, DetectConfig, DetectorAdapter,
    Pipeline, PipelineConfig,
};

#[derive(Parser, Debug)]
#[command(
    name = "detect_yolo8",
    version,
    about = "Detect persons in every image of a directory"
)]
struct Args {
    /// Directory searched recursively for .jpg/.png images
    images_dir: PathBuf,

    /// Directory receiving images.txt, experiment.json, labels.csv, times.csv
    output_dir: PathBuf,

    /// Model weights (ONNX)
    #[arg(long, value_name = "PATH")]
    model: Option<PathBuf>,

    /// Minimum confidence of a kept box
    #[arg(long, value_name = "FLOAT")]
    confidence: Option<f64>,

    /// NMS IoU threshold
    #[arg(long, value_name = "FLOAT")]
    iou: Option<f64>,

    /// Square model input size
    #[arg(long, value_name = "PIXELS")]
    image_size: Option<u32>,

    /// Compute device (cpu, mps, cuda, cuda:N, 0,1,...)
    #[arg(long)]
    device: Option<String>,

    /// Detector backend
    #[arg(long)]
    backend: Option<String>,

    /// Per-image failure policy (abort|skip)
    #[arg(long, value_name = "POLICY")]
    on_error: Option<String>,

    /// TOML config file
    #[arg(long, env = "DETECT_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if !args.images_dir.is_dir() {
        return Err(PipelineError::configuration(
            "images_dir",
            format!("path \"{}\" not found", args.images_dir.display()),
        )
        .into());
    }
    let overrides = ConfigOverrides {
        model_path: args.model.clone(),
        backend: args.backend.clone(),
        confidence: args.confidence,
        iou: args.iou,
        image_size: args.image_size,
        device: args.device.clone(),
        on_error: args.on_error.clone(),
    };
    let cfg = DetectConfig::load_with(args.config.as_deref(), &overrides)?;

    std::fs::create_dir_all(&args.output_dir)
        .map_err(|e| PipelineError::io(&args.output_dir, &e))?;
    logging::init(Some(&args.output_dir))?;

    log::info!("Program options:");
    log::info!("  images_dir: {}", args.images_dir.display());
    log::info!("  output_dir: {}", args.output_dir.display());
    log::info!("  model: {}", cfg.model_path.display());
    log::info!("  backend: {}", cfg.backend);
    log::info!("  confidence: {}", cfg.detector.confidence);
    log::info!("  iou: {}", cfg.detector.iou);
    log::info!("  image_size: {}", cfg.detector.image_size);
    log::info!(
        "  device: {}",
        cfg.detector.device.as_deref().unwrap_or("default")
    );
    log::info!("  on_error: {:?}", cfg.failure_policy);

    let result = run(&args, &cfg);
    if let Err(err) = &result {
        match classify(err) {
            Some(PipelineError::Cancelled { .. }) => log::warn!("{}", err),
            _ => log::error!("{:#}", err),
        }
    }
    log::logger().flush();
    result
}

fn run(args: &Args, cfg: &DetectConfig) -> Result<()> {
    let ui = Ui::from_args(Some(&args.ui), std::io::stderr().is_terminal());

    let cancel = CancelFlag::new();
    let handler_flag = cancel.clone();
    ctrlc::set_handler(move || {
        log::warn!("interrupt received, stopping after the current image");
        handler_flag.cancel();
    })
    .context("error setting Ctrl-C handler")?;

    let mut pipeline = Pipeline::new(PipelineConfig {
        images_dir: args.images_dir.clone(),
        output_dir: args.output_dir.clone(),
        model_path: cfg.model_path.clone(),
        failure_policy: cfg.failure_policy,
    })
    .with_cancel_flag(cancel);

    let mut progress = ui.progress_line();
    let summary = pipeline.run_with_loader(
        &cfg.detector,
        || {
            let _stage = ui.stage("Load model");
            let registry = BackendRegistry::with_builtin();
            DetectorAdapter::load(
                &registry,
                &cfg.backend,
                &cfg.model_path,
                cfg.detector.clone(),
            )
        },
        &mut progress,
    )?;
    log::info!(
        "processed {} of {} images in {:.2}s ({} persons, {} skipped)",
        summary.processed,
        summary.total_images,
        summary.elapsed.as_secs_f64(),
        summary.detections,
        summary.skipped
    );
    Ok(())
}
