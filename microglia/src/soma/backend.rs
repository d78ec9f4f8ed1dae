//! Neural detection backends.

use std::fmt;

use common::Buffer3;

use super::stitch::stitch_planes;
use crate::error::ServiceError;
use crate::volume::Volume;

/// Parameters forwarded to the neural detector.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionParams {
    /// Model identifier (built-in name or path to a trained model).
    pub model: String,
    /// Expected object diameter in pixels.
    pub diameter: f32,
    /// Minimum 2D IoU for linking detections on adjacent planes.
    pub stitch_threshold: f32,
    pub use_gpu: bool,
}

/// Detects somas in a whole stack and returns a 3D label volume with the
/// same shape as the stack (0 = background).
pub trait SomaDetectionBackend: fmt::Debug {
    fn name(&self) -> &str;

    fn detect(&self, stack: &Volume, params: &DetectionParams)
    -> Result<Buffer3<u32>, ServiceError>;
}

/// Detects instances in a single 2D plane (0 = background, any other
/// value identifies one instance within the plane).
pub trait SliceDetector: fmt::Debug {
    fn name(&self) -> &str;

    fn detect_plane(
        &self,
        plane: &[f32],
        width: usize,
        height: usize,
        params: &DetectionParams,
    ) -> Result<Vec<u32>, ServiceError>;
}

/// Runs a [`SliceDetector`] on every plane and links the per-plane
/// instances across depth by overlap.
#[derive(Debug, Clone)]
pub struct StitchingBackend<D> {
    detector: D,
}

impl<D: SliceDetector> StitchingBackend<D> {
    pub fn new(detector: D) -> Self {
        Self { detector }
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }
}

impl<D: SliceDetector> SomaDetectionBackend for StitchingBackend<D> {
    fn name(&self) -> &str {
        self.detector.name()
    }

    fn detect(
        &self,
        stack: &Volume,
        params: &DetectionParams,
    ) -> Result<Buffer3<u32>, ServiceError> {
        let (width, height) = (stack.width(), stack.height());
        let mut planes = Vec::with_capacity(stack.depth());
        for (z, plane) in stack.voxels().planes().enumerate() {
            let labels = self.detector.detect_plane(plane, width, height, params)?;
            if labels.len() != plane.len() {
                return Err(ServiceError::InvalidOutput {
                    backend: self.detector.name().to_string(),
                    reason: format!(
                        "plane {z}: {} labels for {} pixels",
                        labels.len(),
                        plane.len()
                    ),
                });
            }
            planes.push(labels);
        }
        Ok(stitch_planes(planes, width, height, params.stitch_threshold))
    }
}
