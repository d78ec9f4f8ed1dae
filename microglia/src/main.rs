//! microglia CLI: batch soma detection and cell-body quantification.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use strum::IntoEnumIterator;

use microglia::report::ensure_output_dir;
use microglia::{
    AnalysisConfig, CellposeCommand, Pipeline, ProcessingContext, ReportWriter, ThresholdMethod,
    find_images, run_batch,
};

const LOG_DIR: &str = "logs";

#[derive(Debug, Parser)]
#[command(name = "microglia")]
#[command(about = "Detect microglial somas and measure Iba1 cell bodies in 3D stacks")]
#[command(version)]
struct Cli {
    /// Directory containing the input stacks.
    ///
    /// Exclusion polygons are read from `<name>.rois.json` next to each
    /// stack. ImageJ `.roi`/`.zip` ROI sets are not read and must be exported
    /// to that JSON layout first.
    #[arg(required_unless_present = "list_threshold_methods")]
    image_dir: Option<PathBuf>,

    /// YAML or JSON analysis configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Index of the Iba1 channel.
    #[arg(long)]
    channel: Option<usize>,

    /// Automatic threshold method for cell bodies.
    #[arg(long)]
    threshold: Option<String>,

    /// Minimum cell component volume (µm³).
    #[arg(long)]
    min_cell_volume: Option<f64>,

    /// Minimum soma volume (µm³).
    #[arg(long)]
    min_soma_volume: Option<f64>,

    /// Maximum soma volume (µm³).
    #[arg(long)]
    max_soma_volume: Option<f64>,

    /// Pixel size in x and y (µm), overriding the file.
    #[arg(long)]
    xy_calibration: Option<f64>,

    /// Plane spacing (µm), overriding the file.
    #[arg(long)]
    z_calibration: Option<f64>,

    /// Soma detection model name.
    #[arg(long)]
    model: Option<String>,

    /// Directory containing the model.
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Expected soma diameter in pixels.
    #[arg(long)]
    diameter: Option<f32>,

    /// Minimum IoU linking detections on adjacent planes.
    #[arg(long)]
    stitch_threshold: Option<f32>,

    /// Run the soma detector on the CPU.
    #[arg(long)]
    no_gpu: bool,

    /// Cellpose executable.
    #[arg(long)]
    cellpose_exe: Option<PathBuf>,

    /// Output directory (default: `<IMAGE_DIR>/Results_<method>_<timestamp>`).
    /// A directory that already holds a `results.tsv` is rejected.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Base log level; `RUST_LOG` takes precedence.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print the available threshold methods and exit.
    #[arg(long)]
    list_threshold_methods: bool,
}

impl Cli {
    fn apply_to(&self, config: &mut AnalysisConfig) {
        if let Some(channel) = self.channel {
            config.channel = channel;
        }
        if let Some(method) = &self.threshold {
            config.segmentation.threshold_method = method.clone();
        }
        if let Some(v) = self.min_cell_volume {
            config.segmentation.min_cell_volume = v;
        }
        if let Some(v) = self.min_soma_volume {
            config.soma.min_volume = v;
        }
        if let Some(v) = self.max_soma_volume {
            config.soma.max_volume = v;
        }
        if let Some(v) = self.xy_calibration {
            config.calibration.xy = Some(v);
        }
        if let Some(v) = self.z_calibration {
            config.calibration.z = Some(v);
        }
        if let Some(model) = &self.model {
            config.soma.model = model.clone();
        }
        if let Some(dir) = &self.model_dir {
            config.soma.model_dir = Some(dir.clone());
        }
        if let Some(v) = self.diameter {
            config.soma.diameter = v;
        }
        if let Some(v) = self.stitch_threshold {
            config.soma.stitch_threshold = v;
        }
        if self.no_gpu {
            config.soma.use_gpu = false;
        }
        if let Some(exe) = &self.cellpose_exe {
            config.soma.backend.executable = exe.clone();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.list_threshold_methods {
        for method in ThresholdMethod::iter() {
            println!("{method}");
        }
        return Ok(());
    }

    common::log_setup::setup_logging(&cli.log_level, Path::new(LOG_DIR), "microglia")
        .context("Failed to set up logging")?;

    if let Err(e) = run(&cli) {
        tracing::error!("{e:#}");
        return Err(e);
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => AnalysisConfig::from_file(path)?,
        None => AnalysisConfig::default(),
    };
    cli.apply_to(&mut config);
    config.validate().context("Invalid configuration")?;

    let image_dir = cli
        .image_dir
        .as_deref()
        .context("An image directory is required")?;
    let (format, images) = find_images(image_dir)?;

    let output_dir = cli
        .output
        .clone()
        .unwrap_or_else(|| {
            let started = chrono::Local::now().naive_local();
            image_dir.join(config.output_dir_name(started))
        });
    ensure_output_dir(&output_dir)?;

    let ctx = ProcessingContext::new(config.threads).context("Failed to start worker pool")?;
    let backend = CellposeCommand::new(config.soma.backend.clone());
    let pipeline = Pipeline::new(&config, &ctx, &backend)?;
    tracing::info!(
        threshold = %config.segmentation.threshold_method,
        model = %config.soma.model,
        threads = ctx.num_threads(),
        output = %output_dir.display(),
        "Starting batch"
    );

    let mut report = ReportWriter::create(&output_dir)?;
    let summary = run_batch(&pipeline, &images, format, &output_dir, &mut report)?;

    for (path, reason) in &summary.failed {
        tracing::warn!(image = %path.display(), %reason, "Not fully processed");
    }
    tracing::info!(
        processed = summary.processed,
        failed = summary.failed.len(),
        report = %report.path().display(),
        "All done"
    );
    Ok(())
}
