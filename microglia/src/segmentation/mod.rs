//! Cell-body segmentation.
//!
//! Produces the cell mask: every sufficiently large bright component of
//! the median-filtered, globally thresholded volume, merged into one
//! object.

#[cfg(test)]
mod tests;

use crate::constants::{LABEL_BASE, MEDIAN_FILTER_RADIUS};
use crate::context::ProcessingContext;
use crate::error::{ConfigError, Result};
use crate::labeling::{Connectivity, LabelVolume};
use crate::population::filter::filter_by_volume;
use crate::population::{LabeledObject, ObjectPopulation};
use crate::region_mask::ExclusionPlane;
use crate::threshold::ThresholdMethod;
use crate::volume::Volume;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellBodySegmenter {
    method: ThresholdMethod,
    min_cell_volume: f64,
    connectivity: Connectivity,
}

impl CellBodySegmenter {
    pub fn new(method: ThresholdMethod, min_cell_volume: f64) -> Self {
        Self {
            method,
            min_cell_volume,
            connectivity: Connectivity::TwentySix,
        }
    }

    /// Resolve the method by name, failing before any processing when the
    /// name is unknown.
    pub fn from_method_name(
        name: &str,
        min_cell_volume: f64,
    ) -> std::result::Result<Self, ConfigError> {
        Ok(Self::new(ThresholdMethod::from_name(name)?, min_cell_volume))
    }

    pub fn method(&self) -> ThresholdMethod {
        self.method
    }

    pub fn min_cell_volume(&self) -> f64 {
        self.min_cell_volume
    }

    /// Segment `volume` into the cell mask.
    ///
    /// Intermediate rasters are dropped as soon as the next stage has
    /// consumed them. An empty mask is a valid result.
    pub fn segment(
        &self,
        ctx: &ProcessingContext,
        volume: &Volume,
        exclusion: &ExclusionPlane,
    ) -> Result<LabeledObject> {
        let filtered = ctx.median_filter_slice_wise(volume.voxels(), MEDIAN_FILTER_RADIUS)?;
        let mut mask = ctx.auto_threshold(&filtered, self.method)?;
        drop(filtered);

        exclusion.blank(&mut mask);

        let labeling = ctx.install(|| LabelVolume::from_mask(&mask, self.connectivity));
        drop(mask);
        let components =
            ObjectPopulation::from_labeling(&labeling).with_calibration(volume.calibration());
        drop(labeling);

        let kept = filter_by_volume(&components, self.min_cell_volume, f64::INFINITY)?;
        let cell_mask = kept.merge_all(LABEL_BASE);

        tracing::info!(
            method = %self.method,
            components = components.len(),
            kept = kept.len(),
            voxels = cell_mask.voxel_count(),
            volume = cell_mask.volume(&volume.calibration()),
            "Cell bodies segmented"
        );
        Ok(cell_mask)
    }
}
