//! Composite overlay image: soma labels, cell mask and the source channel
//! as a 3-channel ImageJ hyperstack.

use std::path::Path;

use crate::constants::OVERLAY_MASK_VALUE;
use crate::error::ReportError;
use crate::population::{LabeledObject, ObjectPopulation};
use crate::volume::{self, Volume};

const OVERLAY_CHANNELS: usize = 3;

pub fn overlay_description(depth: usize, z_spacing: f64) -> String {
    format!(
        "ImageJ=1.54f\nimages={}\nchannels={OVERLAY_CHANNELS}\nslices={depth}\nhyperstack=true\nmode=composite\nunit=micron\nspacing={z_spacing}\nloop=false\n",
        depth * OVERLAY_CHANNELS
    )
}

/// Write the overlay for one image to `path`.
///
/// Channel 1 holds soma labels (saturating at `u16::MAX`), channel 2 the
/// cell mask at [`OVERLAY_MASK_VALUE`], channel 3 the source intensities
/// clamped to 16 bits.
pub fn write_overlay(
    path: &Path,
    volume: &Volume,
    cell_mask: &LabeledObject,
    somas: &ObjectPopulation,
) -> Result<(), ReportError> {
    let (width, height, depth) = (volume.width(), volume.height(), volume.depth());
    let plane_len = width * height;

    let soma_labels = somas.to_label_volume();
    let mut cell = vec![0u16; plane_len * depth];
    for &v in cell_mask.voxels() {
        cell[v] = OVERLAY_MASK_VALUE;
    }

    let source = volume.voxels();
    let pages = (0..depth).flat_map(|z| {
        let somas_page: Vec<u16> = soma_labels
            .plane(z)
            .iter()
            .map(|&l| l.min(u16::MAX as u32) as u16)
            .collect();
        let cell_page = cell[z * plane_len..(z + 1) * plane_len].to_vec();
        let source_page: Vec<u16> = source
            .plane(z)
            .iter()
            .map(|&v| v.round().clamp(0.0, u16::MAX as f32) as u16)
            .collect();
        [somas_page, cell_page, source_page]
    });

    let description = overlay_description(depth, volume.calibration().z);
    volume::write_u16_pages(path, width, height, pages, Some(&description)).map_err(|e| {
        ReportError::Overlay {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    })?;
    tracing::debug!(path = %path.display(), somas = somas.len(), "Overlay written");
    Ok(())
}
