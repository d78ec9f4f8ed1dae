//! Per-image measurement record.


use serde::Serialize;

use crate::error::ConfigError;
use crate::population::{LabeledObject, ObjectPopulation, intensity_stats};
use crate::region_mask::ExclusionPlane;
use crate::volume::Volume;

/// Aggregate results for one image. Volumes in µm³, intensities in raw
/// channel units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementRecord {
    pub image_name: String,
    pub image_volume: f64,
    /// Image volume minus the volume under region masks.
    pub analyzed_volume: f64,
    pub background: f64,
    pub soma_count: usize,
    pub soma_volume: f64,
    pub cell_volume: f64,
    /// Cell mask voxel count.
    pub cell_voxels: usize,
    pub cell_mean_corrected: f64,
    pub cell_integrated_corrected: f64,
}

impl MeasurementRecord {
    /// Measure the cell mask on the unfiltered `volume`.
    ///
    /// `somas` must carry a calibration. An empty cell mask yields zero
    /// corrected intensities.
    pub fn measure(
        image_name: &str,
        volume: &Volume,
        exclusion: &ExclusionPlane,
        background: f64,
        cell_mask: &LabeledObject,
        somas: &ObjectPopulation,
    ) -> Result<Self, ConfigError> {
        let calibration = volume.calibration();
        let image_volume = volume.physical_volume();
        let excluded = exclusion.excluded_volume(volume.depth(), &calibration);

        let cell_voxels = cell_mask.voxel_count();
        let (cell_mean_corrected, cell_integrated_corrected) = if cell_mask.is_empty() {
            (0.0, 0.0)
        } else {
            let (mean, sum) = intensity_stats(volume, cell_mask);
            (mean - background, sum - background * cell_voxels as f64)
        };

        Ok(Self {
            image_name: image_name.to_string(),
            image_volume,
            analyzed_volume: image_volume - excluded,
            background,
            soma_count: somas.len(),
            soma_volume: somas.total_volume()?,
            cell_volume: cell_mask.volume(&calibration),
            cell_voxels,
            cell_mean_corrected,
            cell_integrated_corrected,
        })
    }
}
