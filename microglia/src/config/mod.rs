//! Analysis configuration.
//!
//! Loaded from a YAML or JSON file (every field optional), overridden from
//! the command line and validated once before any image is read.


use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_Z_CALIBRATION;
use crate::error::ConfigError;
use crate::segmentation::CellBodySegmenter;
use crate::soma::{CellposeSettings, DetectionParams, SomaDetector};
use crate::threshold::ThresholdMethod;
use crate::volume::{Calibration, LoadedStack};

/// Run timestamp appended to the default output directory.
const OUTPUT_STAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
}

impl ConfigFormat {
    /// Format by file extension; anything but `.json` is read as YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Yaml,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Name of a [`ThresholdMethod`], matched case-insensitively.
    pub threshold_method: String,
    /// µm³
    pub min_cell_volume: f64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            threshold_method: ThresholdMethod::default().to_string(),
            min_cell_volume: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SomaConfig {
    pub model: String,
    /// Directory holding trained models; `model` is looked up inside it.
    pub model_dir: Option<PathBuf>,
    /// Pixels.
    pub diameter: f32,
    pub stitch_threshold: f32,
    /// µm³
    pub min_volume: f64,
    /// µm³
    pub max_volume: f64,
    pub use_gpu: bool,
    pub backend: CellposeSettings,
}

impl Default for SomaConfig {
    fn default() -> Self {
        Self {
            model: "cyto2_Iba1_microglia".to_string(),
            model_dir: None,
            diameter: 60.0,
            stitch_threshold: 0.5,
            min_volume: 50.0,
            max_volume: 800.0,
            use_gpu: true,
            backend: CellposeSettings::default(),
        }
    }
}

/// Voxel size overrides in µm. Unset values come from the image file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationOverride {
    pub xy: Option<f64>,
    pub z: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Index of the Iba1 channel.
    pub channel: usize,
    pub segmentation: SegmentationConfig,
    pub soma: SomaConfig,
    pub calibration: CalibrationOverride,
    /// Worker threads; all cores when unset.
    pub threads: Option<usize>,
}

impl AnalysisConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::deserialize(ConfigFormat::from_path(path), &text).map_err(|reason| {
            ConfigError::Parse {
                path: path.to_path_buf(),
                reason,
            }
        })
    }

    pub fn deserialize(format: ConfigFormat, input: &str) -> Result<Self, String> {
        if input.trim().is_empty() {
            return Ok(Self::default());
        }
        match format {
            ConfigFormat::Json => serde_json::from_str(input).map_err(|e| e.to_string()),
            ConfigFormat::Yaml => serde_yml::from_str(input).map_err(|e| e.to_string()),
        }
    }

    pub fn serialize(&self, format: ConfigFormat) -> Result<String, String> {
        match format {
            ConfigFormat::Json => serde_json::to_string_pretty(self).map_err(|e| e.to_string()),
            ConfigFormat::Yaml => serde_yml::to_string(self).map_err(|e| e.to_string()),
        }
    }

    /// Check every parameter. Runs before any image is touched.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.threshold_method()?;
        self.model_reference()?;

        let seg = &self.segmentation;
        if !seg.min_cell_volume.is_finite() || seg.min_cell_volume < 0.0 {
            return Err(invalid(
                "segmentation.min_cell_volume",
                format!("{} is not a non-negative volume", seg.min_cell_volume),
            ));
        }

        let soma = &self.soma;
        if !soma.diameter.is_finite() || soma.diameter <= 0.0 {
            return Err(invalid(
                "soma.diameter",
                format!("{} is not a positive pixel count", soma.diameter),
            ));
        }
        if !(0.0..=1.0).contains(&soma.stitch_threshold) {
            return Err(invalid(
                "soma.stitch_threshold",
                format!("{} is outside [0, 1]", soma.stitch_threshold),
            ));
        }
        if !soma.min_volume.is_finite() || soma.min_volume < 0.0 {
            return Err(invalid(
                "soma.min_volume",
                format!("{} is not a non-negative volume", soma.min_volume),
            ));
        }
        if soma.max_volume.is_nan() {
            return Err(invalid("soma.max_volume", "not a number".to_string()));
        }
        if soma.min_volume > soma.max_volume {
            return Err(ConfigError::InvertedVolumeBounds {
                min: soma.min_volume,
                max: soma.max_volume,
            });
        }
        if soma.backend.timeout_secs == 0 {
            return Err(invalid(
                "soma.backend.timeout_secs",
                "must be at least one second".to_string(),
            ));
        }

        for (field, value) in [
            ("calibration.xy", self.calibration.xy),
            ("calibration.z", self.calibration.z),
        ] {
            if let Some(v) = value
                && !(v.is_finite() && v > 0.0)
            {
                return Err(invalid(field, format!("{v} is not a positive voxel size")));
            }
        }
        if self.threads == Some(0) {
            return Err(invalid("threads", "must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn threshold_method(&self) -> Result<ThresholdMethod, ConfigError> {
        ThresholdMethod::from_name(&self.segmentation.threshold_method)
    }

    /// Model identifier handed to the detection backend: the model path when
    /// a model directory is configured, the bare name otherwise.
    pub fn model_reference(&self) -> Result<String, ConfigError> {
        let model = self.soma.model.trim();
        if model.is_empty() {
            return Err(ConfigError::EmptyModel);
        }
        let Some(dir) = &self.soma.model_dir else {
            return Ok(model.to_string());
        };
        let path = dir.join(model);
        if !path.exists() {
            return Err(ConfigError::ModelNotFound {
                model: model.to_string(),
                dir: dir.clone(),
            });
        }
        Ok(path.display().to_string())
    }

    pub fn segmenter(&self) -> Result<CellBodySegmenter, ConfigError> {
        CellBodySegmenter::from_method_name(
            &self.segmentation.threshold_method,
            self.segmentation.min_cell_volume,
        )
    }

    pub fn soma_detector(&self) -> Result<SomaDetector, ConfigError> {
        let params = DetectionParams {
            model: self.model_reference()?,
            diameter: self.soma.diameter,
            stitch_threshold: self.soma.stitch_threshold,
            use_gpu: self.soma.use_gpu,
        };
        Ok(SomaDetector::new(
            params,
            self.soma.min_volume,
            self.soma.max_volume,
        ))
    }

    /// Calibration for a loaded stack: overrides first, then the file's
    /// own values. A missing xy size falls back to 1 µm with a warning; a
    /// missing z size falls back to [`DEFAULT_Z_CALIBRATION`].
    pub fn resolve_calibration(&self, stack: &LoadedStack) -> Calibration {
        let xy = self.calibration.xy.or(stack.xy_calibration).unwrap_or_else(|| {
            tracing::warn!("No xy calibration in file or config, assuming 1 µm per pixel");
            1.0
        });
        let z = self
            .calibration
            .z
            .or(stack.z_calibration)
            .unwrap_or(DEFAULT_Z_CALIBRATION);
        Calibration::new(xy, z)
    }

    /// Name of the output directory for a run started at `started`, e.g.
    /// `Results_Otsu_2026-03-14_09-05-07`.
    pub fn output_dir_name(&self, started: NaiveDateTime) -> String {
        let method = self
            .threshold_method()
            .map(|m| m.to_string())
            .unwrap_or_else(|_| self.segmentation.threshold_method.clone());
        format!("Results_{method}_{}", started.format(OUTPUT_STAMP_FORMAT))
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::InvalidValue { field, reason }
}
