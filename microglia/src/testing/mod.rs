//! Test utilities: synthetic volumes and stand-in detection backends.

use common::{BitBuffer3, Buffer3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::ServiceError;
use crate::labeling::{Connectivity, LabelVolume};
use crate::soma::{DetectionParams, SliceDetector, SomaDetectionBackend};
use crate::volume::{Calibration, Volume};

/// Initialize tracing for tests. Safe to call repeatedly.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Uniform `floor` with single-voxel `peaks` given as `(x, y, z, value)`.
pub fn floor_with_peaks(
    width: usize,
    height: usize,
    depth: usize,
    floor: f32,
    peaks: &[(usize, usize, usize, f32)],
) -> Buffer3<f32> {
    let mut voxels = Buffer3::new_filled(width, height, depth, floor);
    for &(x, y, z, value) in peaks {
        *voxels.get_mut(x, y, z) = value;
    }
    voxels
}

/// Set the box `[x0, x0+w) × [y0, y0+h) × [z0, z0+d)` to `value`.
pub fn fill_box<T: Copy>(
    voxels: &mut Buffer3<T>,
    (x0, y0, z0): (usize, usize, usize),
    (w, h, d): (usize, usize, usize),
    value: T,
) {
    for z in z0..z0 + d {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                *voxels.get_mut(x, y, z) = value;
            }
        }
    }
}

/// Ellipsoidal blob of `value` centered at `center` with semi-axes `radii`.
pub fn fill_blob(
    voxels: &mut Buffer3<f32>,
    center: (f32, f32, f32),
    radii: (f32, f32, f32),
    value: f32,
) {
    let (cx, cy, cz) = center;
    let (rx, ry, rz) = radii;
    for z in 0..voxels.depth() {
        for y in 0..voxels.height() {
            for x in 0..voxels.width() {
                let dx = (x as f32 - cx) / rx;
                let dy = (y as f32 - cy) / ry;
                let dz = (z as f32 - cz) / rz;
                if dx * dx + dy * dy + dz * dz <= 1.0 {
                    *voxels.get_mut(x, y, z) = value;
                }
            }
        }
    }
}

/// Add uniform noise in `[-amplitude, amplitude)`.
pub fn add_noise(voxels: &mut Buffer3<f32>, seed: u64, amplitude: f32) {
    let mut rng = StdRng::seed_from_u64(seed);
    for v in voxels.voxels_mut() {
        *v += rng.random_range(-amplitude..amplitude);
    }
}

/// Dark volume with bright boxes given as `(origin, size)`.
pub fn volume_with_boxes(
    shape: (usize, usize, usize),
    calibration: Calibration,
    boxes: &[((usize, usize, usize), (usize, usize, usize))],
    background: f32,
    foreground: f32,
) -> Volume {
    let (w, h, d) = shape;
    let mut voxels = Buffer3::new_filled(w, h, d, background);
    for &(origin, size) in boxes {
        fill_box(&mut voxels, origin, size, foreground);
    }
    Volume::new(voxels, calibration)
}

pub fn default_params() -> DetectionParams {
    DetectionParams {
        model: "test-model".to_string(),
        diameter: 10.0,
        stitch_threshold: 0.5,
        use_gpu: false,
    }
}

/// Labels 4-connected components of pixels above `level` in each plane.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdSliceDetector {
    pub level: f32,
}

impl SliceDetector for ThresholdSliceDetector {
    fn name(&self) -> &str {
        "threshold-slices"
    }

    fn detect_plane(
        &self,
        plane: &[f32],
        width: usize,
        height: usize,
        _params: &DetectionParams,
    ) -> Result<Vec<u32>, ServiceError> {
        let mask = BitBuffer3::from_fn(width, height, 1, |i| plane[i] > self.level);
        Ok(LabelVolume::from_mask(&mask, Connectivity::Six)
            .into_labels()
            .into_voxels())
    }
}

/// Returns a fixed label volume regardless of input.
#[derive(Debug, Clone)]
pub struct FixedLabelsBackend {
    pub labels: Buffer3<u32>,
}

impl SomaDetectionBackend for FixedLabelsBackend {
    fn name(&self) -> &str {
        "fixed"
    }

    fn detect(
        &self,
        _stack: &Volume,
        _params: &DetectionParams,
    ) -> Result<Buffer3<u32>, ServiceError> {
        Ok(self.labels.clone())
    }
}

/// Always reports the backend as unavailable.
#[derive(Debug, Clone, Copy)]
pub struct UnavailableBackend;

impl SomaDetectionBackend for UnavailableBackend {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn detect(
        &self,
        _stack: &Volume,
        _params: &DetectionParams,
    ) -> Result<Buffer3<u32>, ServiceError> {
        Err(ServiceError::Unavailable {
            backend: "unavailable".to_string(),
            reason: "no device".to_string(),
        })
    }
}

/// Writer that accepts the first write (the report header) and fails every
/// later one.
#[derive(Debug, Default)]
pub struct FailAfterFirstWrite {
    writes: usize,
}

impl std::io::Write for FailAfterFirstWrite {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writes += 1;
        if self.writes > 1 {
            return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"));
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
