//! Microglia - 3D microglial morphology quantification.
//!
//! For every stack of a batch directory this library:
//! - estimates the background level from the minimum-intensity projection
//! - segments cell bodies (slice-wise median, global auto-threshold,
//!   26-connected labeling, volume filter) into a single cell mask
//! - detects somas with a neural backend and keeps those spanning several
//!   planes, within volume bounds and colocalized with the cell mask
//! - writes one report row and one overlay image
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use microglia::{AnalysisConfig, CellposeCommand, ImageFormat, Pipeline, ProcessingContext};
//!
//! let config = AnalysisConfig::from_file("analysis.yaml".as_ref())?;
//! let ctx = ProcessingContext::new(config.threads)?;
//! let backend = CellposeCommand::new(config.soma.backend.clone());
//! let pipeline = Pipeline::new(&config, &ctx, &backend)?;
//!
//! let (_volume, analysis) = pipeline.process_image("stack.tif".as_ref(), ImageFormat::Tiff)?;
//! println!("{} somas", analysis.record.soma_count);
//! ```

pub mod background;
pub mod config;
pub mod constants;
pub mod context;
pub mod discovery;
pub mod error;
pub mod labeling;
pub(crate) mod math;
pub mod measurement;
pub(crate) mod median_filter;
pub mod pipeline;
pub mod population;
pub mod region_mask;
pub mod report;
pub mod segmentation;
pub mod soma;
pub mod threshold;
pub mod volume;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Errors and configuration
// ============================================================================

pub use config::{AnalysisConfig, CalibrationOverride, ConfigFormat};
pub use error::{ConfigError, Error, InputError, ReportError, Result, ServiceError};

// ============================================================================
// Data model
// ============================================================================

pub use population::{LabeledObject, ObjectPopulation};
pub use region_mask::{ExclusionPlane, RegionMask};
pub use volume::{Calibration, Volume};

// ============================================================================
// Processing stages
// ============================================================================

pub use background::estimate_background;
pub use context::{BackendLease, CpuBackend, FilterBackend, ProcessingContext};
pub use segmentation::CellBodySegmenter;
pub use soma::{
    CellposeCommand, CellposeSettings, DetectionParams, SliceDetector, SomaDetection,
    SomaDetectionBackend, SomaDetector, StitchingBackend,
};
pub use threshold::ThresholdMethod;

// ============================================================================
// Batch driver and output
// ============================================================================

pub use discovery::{ImageFormat, find_images};
pub use measurement::MeasurementRecord;
pub use pipeline::{BatchSummary, ImageAnalysis, Pipeline, run_batch};
pub use report::ReportWriter;
