//! Population filters.
//!
//! Each filter is a pure function: the input population is left untouched
//! and a new population with contiguous IDs from [`LABEL_BASE`] is returned.
//!
//! [`LABEL_BASE`]: crate::constants::LABEL_BASE

use super::{LabeledObject, ObjectPopulation};
use crate::error::ConfigError;

/// Keep objects that occupy at least `min_planes` distinct z-planes.
pub fn filter_by_plane_count(population: &ObjectPopulation, min_planes: usize) -> ObjectPopulation {
    population.filtered(|obj| obj.plane_span() >= min_planes)
}

/// Keep objects whose physical volume lies in `[min, max]` µm³ (inclusive).
///
/// Fails when the population has no calibration attached.
pub fn filter_by_volume(
    population: &ObjectPopulation,
    min: f64,
    max: f64,
) -> Result<ObjectPopulation, ConfigError> {
    let calibration = population
        .calibration()
        .ok_or(ConfigError::MissingCalibration)?;
    Ok(population.filtered(|obj| {
        let volume = obj.volume(&calibration);
        volume >= min && volume <= max
    }))
}

/// Keep objects with at least `min_ratio` of their voxels inside
/// `reference`.
pub fn filter_by_colocalization_ratio(
    population: &ObjectPopulation,
    reference: &LabeledObject,
    min_ratio: f64,
) -> ObjectPopulation {
    population.filtered(|obj| obj.colocalization_ratio(reference) >= min_ratio)
}
