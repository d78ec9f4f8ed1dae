//! Soma detection.
//!
//! A neural backend proposes 3D soma candidates; region masks are blanked
//! out of its label volume and the candidates then pass three filters in a
//! fixed order: plane span, physical volume and colocalization with the
//! cell mask.

mod backend;
pub mod cellpose;
mod stitch;

#[cfg(test)]
mod tests;

pub use backend::{DetectionParams, SliceDetector, SomaDetectionBackend, StitchingBackend};
pub use cellpose::{CellposeCommand, CellposeSettings};
pub use stitch::stitch_planes;

use crate::constants::{COLOCALIZATION_MIN_RATIO, MIN_PLANE_SPAN};
use crate::error::{Result, ServiceError};
use crate::population::filter::{
    filter_by_colocalization_ratio, filter_by_plane_count, filter_by_volume,
};
use crate::population::{LabeledObject, ObjectPopulation};
use crate::region_mask::ExclusionPlane;
use crate::volume::{Calibration, Volume};

/// Object counts after each post-processing stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SomaDiagnostics {
    pub detected: usize,
    pub after_plane_span: usize,
    pub after_volume: usize,
    pub after_colocalization: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SomaDetection {
    pub somas: ObjectPopulation,
    pub diagnostics: SomaDiagnostics,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SomaDetector {
    params: DetectionParams,
    min_volume: f64,
    max_volume: f64,
}

impl SomaDetector {
    /// `min_volume` and `max_volume` are inclusive bounds in µm³.
    pub fn new(params: DetectionParams, min_volume: f64, max_volume: f64) -> Self {
        Self {
            params,
            min_volume,
            max_volume,
        }
    }

    pub fn params(&self) -> &DetectionParams {
        &self.params
    }

    /// Run the backend on a private copy of `volume` and collect the
    /// candidates outside the excluded regions.
    pub fn detect_candidates(
        &self,
        backend: &dyn SomaDetectionBackend,
        volume: &Volume,
        exclusion: &ExclusionPlane,
    ) -> Result<ObjectPopulation> {
        let stack = volume.duplicate();
        let mut labels = backend.detect(&stack, &self.params)?;
        drop(stack);

        if !labels.same_shape(volume.voxels()) {
            return Err(ServiceError::InvalidOutput {
                backend: backend.name().to_string(),
                reason: format!(
                    "label volume is {}x{}x{}, expected {}x{}x{}",
                    labels.width(),
                    labels.height(),
                    labels.depth(),
                    volume.width(),
                    volume.height(),
                    volume.depth()
                ),
            }
            .into());
        }

        exclusion.blank(&mut labels);
        Ok(ObjectPopulation::from_label_volume(&labels))
    }

    /// Apply the plane-span, volume and colocalization filters.
    ///
    /// The colocalization reference is always `cell_mask` itself, never a
    /// previously filtered population.
    pub fn filter_candidates(
        &self,
        candidates: &ObjectPopulation,
        calibration: Calibration,
        cell_mask: &LabeledObject,
    ) -> Result<SomaDetection> {
        let spanning = filter_by_plane_count(candidates, MIN_PLANE_SPAN);
        let after_plane_span = spanning.len();
        let sized = filter_by_volume(
            &spanning.with_calibration(calibration),
            self.min_volume,
            self.max_volume,
        )?;
        let somas = filter_by_colocalization_ratio(&sized, cell_mask, COLOCALIZATION_MIN_RATIO);

        let diagnostics = SomaDiagnostics {
            detected: candidates.len(),
            after_plane_span,
            after_volume: sized.len(),
            after_colocalization: somas.len(),
        };
        tracing::info!(
            detected = diagnostics.detected,
            after_plane_span = diagnostics.after_plane_span,
            after_volume = diagnostics.after_volume,
            after_colocalization = diagnostics.after_colocalization,
            "Somas filtered"
        );
        Ok(SomaDetection { somas, diagnostics })
    }

    pub fn detect(
        &self,
        backend: &dyn SomaDetectionBackend,
        volume: &Volume,
        exclusion: &ExclusionPlane,
        cell_mask: &LabeledObject,
    ) -> Result<SomaDetection> {
        let candidates = self.detect_candidates(backend, volume, exclusion)?;
        tracing::debug!(
            backend = backend.name(),
            candidates = candidates.len(),
            "Soma candidates detected"
        );
        self.filter_candidates(&candidates, volume.calibration(), cell_mask)
    }
}
