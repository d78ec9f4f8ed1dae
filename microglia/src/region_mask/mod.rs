//! Region masks: 2D exclusion polygons applied to every z-plane.
//!
//! Masks come from an optional JSON sidecar next to the image
//! (`<base>.rois.json`), holding an array of polygons:
//!
//! ```json
//! [{ "name": "vessel", "points": [[10, 10], [40, 12], [25, 60]] }]
//! ```
//!
//! A pixel is inside a polygon when its center is, by the even-odd rule.
//!
//! ImageJ ROI files (`<base>.roi`, `<base>.zip`) are not read. When one sits
//! next to an image without a JSON sidecar the image is rejected rather than
//! analyzed unmasked.

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};

use common::{BitBuffer3, Buffer3};
use serde::{Deserialize, Serialize};

use crate::error::InputError;
use crate::volume::Calibration;

/// Suffix replacing the image extension for the sidecar file.
pub const SIDECAR_SUFFIX: &str = "rois.json";

/// Extensions of ImageJ ROI Manager exports.
const IMAGEJ_ROI_EXTENSIONS: [&str; 2] = ["roi", "zip"];

/// One exclusion polygon in pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionMask {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub points: Vec<[f64; 2]>,
}

impl RegionMask {
    pub fn new(points: Vec<[f64; 2]>) -> Self {
        Self { name: None, points }
    }

    /// Axis-aligned rectangle covering pixels `[x0, x1) × [y0, y1)`.
    pub fn rectangle(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self::new(vec![[x0, y0], [x1, y0], [x1, y1], [x0, y1]])
    }

    /// Even-odd test for the point `(px, py)`.
    pub fn contains(&self, px: f64, py: f64) -> bool {
        let pts = &self.points;
        let n = pts.len();
        if n < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let [xi, yi] = pts[i];
            let [xj, yj] = pts[j];
            if (yi > py) != (yj > py) && px < (xj - xi) * (py - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    /// Mark the pixels of a `width × height` plane whose centers lie inside
    /// the polygon.
    pub fn rasterize_into(&self, width: usize, height: usize, plane: &mut [bool]) {
        assert_eq!(plane.len(), width * height);
        let n = self.points.len();
        if n < 3 {
            return;
        }

        let mut crossings: Vec<f64> = Vec::with_capacity(n);
        for y in 0..height {
            let cy = y as f64 + 0.5;
            crossings.clear();
            let mut j = n - 1;
            for i in 0..n {
                let [xi, yi] = self.points[i];
                let [xj, yj] = self.points[j];
                if (yi > cy) != (yj > cy) {
                    crossings.push((xj - xi) * (cy - yi) / (yj - yi) + xi);
                }
                j = i;
            }
            crossings.sort_unstable_by(f64::total_cmp);

            let row = &mut plane[y * width..(y + 1) * width];
            for span in crossings.chunks_exact(2) {
                // Pixel x is inside when span[0] <= x + 0.5 < span[1].
                let start = (span[0] - 0.5).ceil().max(0.0) as usize;
                let end = ((span[1] - 0.5).ceil().max(0.0) as usize).min(width);
                if start < end {
                    row[start..end].fill(true);
                }
            }
        }
    }

    pub fn rasterize(&self, width: usize, height: usize) -> Vec<bool> {
        let mut plane = vec![false; width * height];
        self.rasterize_into(width, height, &mut plane);
        plane
    }

    fn validate(&self, index: usize, path: &Path) -> Result<(), InputError> {
        let malformed = |reason: String| InputError::MalformedRegionMask {
            path: path.to_path_buf(),
            reason,
        };
        if self.points.len() < 3 {
            return Err(malformed(format!(
                "polygon {index} has {} point(s), at least 3 required",
                self.points.len()
            )));
        }
        if self.points.iter().flatten().any(|c| !c.is_finite()) {
            return Err(malformed(format!("polygon {index} has a non-finite coordinate")));
        }
        Ok(())
    }
}

/// Union of all region masks rasterized onto one plane.
#[derive(Debug, Clone, PartialEq)]
pub struct ExclusionPlane {
    pixels: Vec<bool>,
    width: usize,
    height: usize,
}

impl ExclusionPlane {
    pub fn new(masks: &[RegionMask], width: usize, height: usize) -> Self {
        let mut pixels = vec![false; width * height];
        for mask in masks {
            mask.rasterize_into(width, height, &mut pixels);
        }
        Self {
            pixels,
            width,
            height,
        }
    }

    #[inline]
    pub fn pixels(&self) -> &[bool] {
        &self.pixels
    }

    pub fn excluded_pixels(&self) -> usize {
        self.pixels.iter().filter(|&&p| p).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.pixels.contains(&true)
    }

    /// Physical volume removed from a stack of `depth` planes, in µm³.
    pub fn excluded_volume(&self, depth: usize, calibration: &Calibration) -> f64 {
        self.excluded_pixels() as f64 * calibration.pixel_area() * depth as f64 * calibration.z
    }

    /// Zero the excluded pixels on every plane of `target`.
    pub fn blank<T: Blankable + ?Sized>(&self, target: &mut T) {
        if self.is_empty() {
            return;
        }
        let (w, h) = target.plane_size();
        assert_eq!((w, h), (self.width, self.height), "plane size mismatch");
        target.blank_planes(&self.pixels);
    }
}

/// Rasters whose voxels can be zeroed plane by plane.
pub trait Blankable {
    fn plane_size(&self) -> (usize, usize);

    /// Zero every voxel whose (x, y) is set in `plane_mask`, on all planes.
    fn blank_planes(&mut self, plane_mask: &[bool]);
}

impl Blankable for BitBuffer3 {
    fn plane_size(&self) -> (usize, usize) {
        (self.width(), self.height())
    }

    fn blank_planes(&mut self, plane_mask: &[bool]) {
        for z in 0..self.depth() {
            self.clear_plane_where(z, plane_mask);
        }
    }
}

impl<T: Default + Copy> Blankable for Buffer3<T> {
    fn plane_size(&self) -> (usize, usize) {
        (self.width(), self.height())
    }

    fn blank_planes(&mut self, plane_mask: &[bool]) {
        for plane in self.planes_mut() {
            for (v, &excluded) in plane.iter_mut().zip(plane_mask) {
                if excluded {
                    *v = T::default();
                }
            }
        }
    }
}

/// Path of the region mask sidecar for an image.
pub fn sidecar_path(image_path: &Path) -> PathBuf {
    image_path.with_extension(SIDECAR_SUFFIX)
}

fn imagej_roi_set(image_path: &Path) -> Option<PathBuf> {
    IMAGEJ_ROI_EXTENSIONS
        .iter()
        .map(|ext| image_path.with_extension(ext))
        .find(|p| p.is_file())
}

/// Load the region masks for an image. A missing sidecar means no masks,
/// unless an ImageJ ROI set is present instead.
pub fn load_sidecar(image_path: &Path) -> Result<Vec<RegionMask>, InputError> {
    let path = sidecar_path(image_path);
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if let Some(roi_set) = imagej_roi_set(image_path) {
                return Err(InputError::UnreadableRoiSet {
                    path: roi_set,
                    expected: path,
                });
            }
            tracing::debug!(path = %path.display(), "No region mask file");
            return Ok(Vec::new());
        }
        Err(source) => return Err(InputError::Io { path, source }),
    };

    let masks: Vec<RegionMask> =
        serde_json::from_str(&text).map_err(|e| InputError::MalformedRegionMask {
            path: path.clone(),
            reason: e.to_string(),
        })?;
    for (i, mask) in masks.iter().enumerate() {
        mask.validate(i, &path)?;
    }

    tracing::info!(path = %path.display(), count = masks.len(), "Loaded region masks");
    Ok(masks)
}
