//! Background level of a volume.
//!
//! The minimum-intensity projection along z keeps, for every (x, y), the
//! darkest value the column ever reaches; bright structures occupy only a
//! few planes of a column, so the projection is dominated by the noise
//! floor. Its median is the background level.


use common::Buffer3;
use rayon::prelude::*;

use crate::math::median_f32_mut;
use crate::volume::Volume;

/// Pixels per parallel work item.
const PIXELS_PER_CHUNK: usize = 4096;

/// Per-pixel minimum over all z-planes.
pub fn min_projection(voxels: &Buffer3<f32>) -> Vec<f32> {
    if voxels.is_empty() {
        return Vec::new();
    }
    let mut projection = vec![f32::INFINITY; voxels.plane_len()];

    projection
        .par_chunks_mut(PIXELS_PER_CHUNK)
        .enumerate()
        .for_each(|(chunk_idx, out)| {
            let offset = chunk_idx * PIXELS_PER_CHUNK;
            for plane in voxels.planes() {
                let src = &plane[offset..offset + out.len()];
                for (m, &v) in out.iter_mut().zip(src) {
                    *m = m.min(v);
                }
            }
        });
    projection
}

/// Median of the minimum-intensity projection. Zero for an empty volume.
pub fn estimate_background(volume: &Volume) -> f64 {
    let mut projection = min_projection(volume.voxels());
    if projection.is_empty() {
        return 0.0;
    }
    let level = median_f32_mut(&mut projection) as f64;
    tracing::debug!(level, "Background estimated");
    level
}
