//! Shared constants for the segmentation and soma filtering stages.

/// Radius in pixels of the disk used by the slice-wise median filter.
pub const MEDIAN_FILTER_RADIUS: f32 = 2.0;

/// Somas must span at least this many z-planes.
pub const MIN_PLANE_SPAN: usize = 2;

/// Minimum fraction of a soma's voxels that must lie inside the cell mask.
pub const COLOCALIZATION_MIN_RATIO: f64 = 0.25;

/// First ID of a relabeled population.
pub const LABEL_BASE: u32 = 1;

/// Number of histogram bins used by the automatic threshold methods.
pub const HISTOGRAM_BINS: usize = 256;

/// Z voxel size in µm when the input file carries none.
pub const DEFAULT_Z_CALIBRATION: f64 = 1.0;

/// Value of cell mask voxels in the overlay image.
pub const OVERLAY_MASK_VALUE: u16 = 255;
