//! Error types for the microglia analysis pipeline.
//!
//! Errors are grouped by how far they propagate: configuration and report
//! errors stop the whole batch, input and service errors only abort the
//! image being processed.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Invalid analysis parameters. Detected before any image is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown threshold method '{name}' (expected one of: {known})")]
    UnknownThresholdMethod { name: String, known: String },

    #[error("Model identifier is empty")]
    EmptyModel,

    #[error("Model '{model}' not found in '{dir}'")]
    ModelNotFound { model: String, dir: PathBuf },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("Soma volume bounds are inverted: min {min} > max {max}")]
    InvertedVolumeBounds { min: f64, max: f64 },

    #[error("Population has no calibration attached; volume filters need one")]
    MissingCalibration,

    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config file '{path}': {reason}")]
    Parse { path: PathBuf, reason: String },
}

/// Problems with the input data of a single image (or with the input
/// directory as a whole).
#[derive(Debug, Error)]
pub enum InputError {
    #[error("No images with a recognized extension in '{dir}'")]
    NoImages { dir: PathBuf },

    #[error("Failed to list directory '{dir}': {source}")]
    ListDirectory {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read image '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to decode image '{path}': {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("Unsupported image format '{extension}' for '{path}'")]
    UnsupportedFormat { path: PathBuf, extension: String },

    #[error("Image '{path}' has {available} channel(s), channel {requested} requested")]
    ChannelOutOfRange {
        path: PathBuf,
        requested: usize,
        available: usize,
    },

    #[error("Malformed region mask file '{path}': {reason}")]
    MalformedRegionMask { path: PathBuf, reason: String },

    #[error("ImageJ ROI set '{path}' cannot be read; export it to '{expected}'")]
    UnreadableRoiSet { path: PathBuf, expected: PathBuf },
}

/// Failures of a processing backend (filtering or neural detection).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Backend '{backend}' unavailable: {reason}")]
    Unavailable { backend: String, reason: String },

    #[error("Backend '{backend}' ran out of memory")]
    OutOfMemory { backend: String },

    #[error("Backend '{backend}' timed out after {timeout:?}")]
    Timeout { backend: String, timeout: Duration },

    #[error("Backend '{backend}' failed: {reason}")]
    Failed { backend: String, reason: String },

    #[error("Backend '{backend}' returned invalid output: {reason}")]
    InvalidOutput { backend: String, reason: String },
}

/// Failures writing results.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to create output directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Report '{path}' already exists; refusing to overwrite it")]
    ReportExists { path: PathBuf },

    #[error("Failed to write report '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write overlay '{path}': {reason}")]
    Overlay { path: PathBuf, reason: String },
}

impl ReportError {
    /// Overlay images are per-image output; only the shared report stream
    /// is fatal for the batch.
    pub fn is_shared_stream(&self) -> bool {
        !matches!(self, ReportError::Overlay { .. })
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Report(#[from] ReportError),
}

impl Error {
    /// Whether the batch must stop instead of moving on to the next image.
    pub fn is_fatal_for_batch(&self) -> bool {
        match self {
            Error::Config(_) => true,
            Error::Report(e) => e.is_shared_stream(),
            Error::Input(_) | Error::Service(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatality_policy() {
        assert!(Error::from(ConfigError::EmptyModel).is_fatal_for_batch());
        assert!(
            Error::from(ReportError::Write {
                path: PathBuf::from("results.tsv"),
                source: io::Error::other("disk full"),
            })
            .is_fatal_for_batch()
        );
        assert!(
            !Error::from(ReportError::Overlay {
                path: PathBuf::from("a.tif"),
                reason: "disk full".into(),
            })
            .is_fatal_for_batch()
        );
        assert!(
            !Error::from(InputError::Decode {
                path: PathBuf::from("a.tif"),
                reason: "truncated".into(),
            })
            .is_fatal_for_batch()
        );
        assert!(
            !Error::from(ServiceError::OutOfMemory {
                backend: "cellpose".into()
            })
            .is_fatal_for_batch()
        );
    }

    #[test]
    fn test_unknown_method_message() {
        let err = ConfigError::UnknownThresholdMethod {
            name: "Magic".into(),
            known: "Otsu, Li".into(),
        };
        assert_eq!(
            err.to_string(),
            "Unknown threshold method 'Magic' (expected one of: Otsu, Li)"
        );
    }
}
