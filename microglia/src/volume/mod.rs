//! Calibrated 3D grayscale volumes.

mod tiff_io;


use common::Buffer3;
use serde::{Deserialize, Serialize};

pub use tiff_io::{LoadedStack, load_tiff_volume, read_label_stack, write_f32_stack};

pub(crate) use tiff_io::write_u16_pages;

/// Physical voxel size in µm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub xy: f64,
    pub z: f64,
}

impl Calibration {
    pub fn new(xy: f64, z: f64) -> Self {
        Self { xy, z }
    }

    /// One voxel per µm on every axis.
    pub fn unit() -> Self {
        Self { xy: 1.0, z: 1.0 }
    }

    #[inline]
    pub fn pixel_area(&self) -> f64 {
        self.xy * self.xy
    }

    #[inline]
    pub fn voxel_volume(&self) -> f64 {
        self.pixel_area() * self.z
    }

    pub fn is_valid(&self) -> bool {
        self.xy.is_finite() && self.z.is_finite() && self.xy > 0.0 && self.z > 0.0
    }
}

/// Grayscale voxels of one channel together with their calibration.
///
/// A volume is read-only for the whole processing cycle of an image; stages
/// that need to modify data work on their own buffers or on a
/// [`Volume::duplicate`].
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    voxels: Buffer3<f32>,
    calibration: Calibration,
}

impl Volume {
    pub fn new(voxels: Buffer3<f32>, calibration: Calibration) -> Self {
        Self {
            voxels,
            calibration,
        }
    }

    #[inline]
    pub fn voxels(&self) -> &Buffer3<f32> {
        &self.voxels
    }

    #[inline]
    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.voxels.width()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.voxels.height()
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.voxels.depth()
    }

    /// Independent copy handed to stages that consume their input.
    pub fn duplicate(&self) -> Self {
        self.clone()
    }

    /// Replace the calibration, e.g. with user overrides.
    pub fn with_calibration(mut self, calibration: Calibration) -> Self {
        self.calibration = calibration;
        self
    }

    /// Physical volume of the whole raster in µm³.
    pub fn physical_volume(&self) -> f64 {
        self.voxels.len() as f64 * self.calibration.voxel_volume()
    }

    /// Sum of intensities over the given linear voxel indices.
    pub fn sum_over(&self, indices: &[usize]) -> f64 {
        let data = self.voxels.voxels();
        indices.iter().map(|&i| data[i] as f64).sum()
    }
}
