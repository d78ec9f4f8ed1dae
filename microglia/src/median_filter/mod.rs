//! Slice-wise 2D median filter with a circular kernel.
//!
//! Each z-plane is filtered independently; there is no mixing across depth.
//! Pixels outside the plane take the value of the nearest edge pixel.

#[cfg(test)]
mod tests;

use common::Buffer3;
use rayon::prelude::*;

/// Rows filtered per parallel work item.
const ROWS_PER_CHUNK: usize = 8;

/// Offsets `(dx, dy)` of a disk of the given radius, `dx² + dy² <= r²`.
pub fn disk_offsets(radius: f32) -> Vec<(isize, isize)> {
    let r = radius.max(0.0);
    let reach = r.floor() as isize;
    let r2 = r * r;
    let mut offsets = Vec::new();
    for dy in -reach..=reach {
        for dx in -reach..=reach {
            if (dx * dx + dy * dy) as f32 <= r2 {
                offsets.push((dx, dy));
            }
        }
    }
    offsets
}

/// Median-filter every z-plane of `volume` with a disk of `radius` pixels.
pub fn median_filter_slice_wise(volume: &Buffer3<f32>, radius: f32) -> Buffer3<f32> {
    let width = volume.width();
    let height = volume.height();
    let mut output = Buffer3::new_default(width, height, volume.depth());
    if volume.is_empty() {
        return output;
    }

    let offsets = disk_offsets(radius);
    let plane_len = volume.plane_len();

    output
        .voxels_mut()
        .par_chunks_mut(plane_len)
        .enumerate()
        .for_each(|(z, out_plane)| {
            let plane = volume.plane(z);
            out_plane
                .par_chunks_mut(width * ROWS_PER_CHUNK)
                .enumerate()
                .for_each_init(
                    || Vec::with_capacity(offsets.len()),
                    |window, (chunk_idx, chunk)| {
                        let y_start = chunk_idx * ROWS_PER_CHUNK;
                        for (local_y, row) in chunk.chunks_mut(width).enumerate() {
                            filter_row(plane, width, height, y_start + local_y, &offsets, window, row);
                        }
                    },
                );
        });

    output
}

#[inline]
fn filter_row(
    plane: &[f32],
    width: usize,
    height: usize,
    y: usize,
    offsets: &[(isize, isize)],
    window: &mut Vec<f32>,
    out_row: &mut [f32],
) {
    let max_x = width as isize - 1;
    let max_y = height as isize - 1;
    for (x, out) in out_row.iter_mut().enumerate() {
        window.clear();
        for &(dx, dy) in offsets {
            let sx = (x as isize + dx).clamp(0, max_x) as usize;
            let sy = (y as isize + dy).clamp(0, max_y) as usize;
            window.push(plane[sy * width + sx]);
        }
        *out = crate::math::median_f32_mut(window);
    }
}
