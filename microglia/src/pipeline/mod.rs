//! Per-image processing cycle and the sequential batch driver.
//!
//! Images are processed one after another. Within an image the background
//! estimate and the cell-body segmentation run concurrently on the
//! context's pool; soma detection follows because its colocalization
//! filter needs the cell mask.


use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::background::estimate_background;
use crate::config::AnalysisConfig;
use crate::context::ProcessingContext;
use crate::discovery::{ChannelMetadata, ImageFormat};
use crate::error::{ConfigError, Error, InputError, Result};
use crate::measurement::MeasurementRecord;
use crate::population::LabeledObject;
use crate::region_mask::{ExclusionPlane, RegionMask, load_sidecar};
use crate::report::{ReportWriter, write_overlay};
use crate::segmentation::CellBodySegmenter;
use crate::soma::{SomaDetection, SomaDetectionBackend, SomaDetector};
use crate::volume::{Volume, load_tiff_volume};

/// Everything derived from one image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAnalysis {
    pub record: MeasurementRecord,
    pub cell_mask: LabeledObject,
    pub somas: SomaDetection,
}

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub processed: usize,
    /// Images skipped or only partially written, with the reason.
    pub failed: Vec<(PathBuf, String)>,
}

pub struct Pipeline<'a> {
    config: &'a AnalysisConfig,
    ctx: &'a ProcessingContext,
    backend: &'a dyn SomaDetectionBackend,
    segmenter: CellBodySegmenter,
    detector: SomaDetector,
}

impl<'a> Pipeline<'a> {
    /// Validate `config` and prepare the stages.
    pub fn new(
        config: &'a AnalysisConfig,
        ctx: &'a ProcessingContext,
        backend: &'a dyn SomaDetectionBackend,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            ctx,
            backend,
            segmenter: config.segmenter()?,
            detector: config.soma_detector()?,
        })
    }

    /// Load the configured channel of `path` with its resolved calibration.
    pub fn load_volume(&self, path: &Path, format: ImageFormat) -> Result<Volume> {
        if !format.is_readable() {
            return Err(InputError::UnsupportedFormat {
                path: path.to_path_buf(),
                extension: format.to_string(),
            }
            .into());
        }
        let stack = load_tiff_volume(path, self.config.channel)?;
        let metadata: Vec<ChannelMetadata> = stack
            .channel_labels
            .iter()
            .map(|label| ChannelMetadata {
                name: label.clone(),
                ..ChannelMetadata::default()
            })
            .collect();
        let names = format.channel_names(&metadata);
        let calibration = self.config.resolve_calibration(&stack);
        if !calibration.is_valid() {
            return Err(InputError::Decode {
                path: path.to_path_buf(),
                reason: format!("invalid voxel size {} x {} µm", calibration.xy, calibration.z),
            }
            .into());
        }
        tracing::info!(
            channels = ?names,
            channel = self.config.channel,
            xy = calibration.xy,
            z = calibration.z,
            "Opened channel"
        );
        Ok(Volume::new(stack.voxels, calibration))
    }

    /// Run every analysis stage on a loaded volume.
    pub fn analyze(&self, name: &str, volume: &Volume, masks: &[RegionMask]) -> Result<ImageAnalysis> {
        let exclusion = ExclusionPlane::new(masks, volume.width(), volume.height());

        let (ctx, segmenter) = (self.ctx, &self.segmenter);
        let (background, cell_mask) = ctx.install(|| {
            rayon::join(
                || estimate_background(volume),
                || segmenter.segment(ctx, volume, &exclusion),
            )
        });
        let cell_mask = cell_mask?;
        tracing::info!(background, "Background estimated");

        let somas = self
            .detector
            .detect(self.backend, volume, &exclusion, &cell_mask)?;

        let record = MeasurementRecord::measure(
            name,
            volume,
            &exclusion,
            background,
            &cell_mask,
            &somas.somas,
        )?;
        tracing::info!(
            somas = record.soma_count,
            soma_volume = record.soma_volume,
            cell_volume = record.cell_volume,
            "Image measured"
        );
        Ok(ImageAnalysis {
            record,
            cell_mask,
            somas,
        })
    }

    /// Load and analyze one image file.
    pub fn process_image(&self, path: &Path, format: ImageFormat) -> Result<(Volume, ImageAnalysis)> {
        let masks = load_sidecar(path)?;
        let volume = self.load_volume(path, format)?;
        let analysis = self.analyze(&image_name(path), &volume, &masks)?;
        Ok((volume, analysis))
    }
}

/// Base name of an image file, used for report rows and overlay names.
pub fn image_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Process `images` in order, appending one report row per image and
/// writing overlays to `output_dir`.
///
/// Input and service failures skip the image; configuration errors and
/// report write failures stop the batch.
pub fn run_batch<W: Write>(
    pipeline: &Pipeline<'_>,
    images: &[PathBuf],
    format: ImageFormat,
    output_dir: &Path,
    report: &mut ReportWriter<W>,
) -> Result<BatchSummary> {
    let mut summary = BatchSummary::default();

    for (i, path) in images.iter().enumerate() {
        let name = image_name(path);
        let span = tracing::info_span!("image", name = %name, index = i + 1, total = images.len());
        let _enter = span.enter();
        let started = Instant::now();

        let (volume, analysis) = match pipeline.process_image(path, format) {
            Ok(done) => done,
            Err(e) if e.is_fatal_for_batch() => return Err(e),
            Err(e) => {
                tracing::error!(error = %e, "Image skipped");
                summary.failed.push((path.clone(), e.to_string()));
                continue;
            }
        };

        report.write_record(&analysis.record)?;

        let overlay_path = output_dir.join(format!("{name}.tif"));
        if let Err(e) = write_overlay(&overlay_path, &volume, &analysis.cell_mask, &analysis.somas.somas) {
            let e = Error::from(e);
            if e.is_fatal_for_batch() {
                return Err(e);
            }
            tracing::warn!(error = %e, "Overlay not written");
            summary.failed.push((path.clone(), e.to_string()));
        }

        summary.processed += 1;
        tracing::info!(elapsed_ms = started.elapsed().as_millis() as u64, "Image done");
    }

    tracing::info!(
        processed = summary.processed,
        failed = summary.failed.len(),
        "Batch finished"
    );
    Ok(summary)
}
