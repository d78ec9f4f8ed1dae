//! Labeled objects and object populations.
//!
//! A population is an immutable collection of objects whose IDs are always
//! contiguous from [`LABEL_BASE`]. Filters never mutate a population; they
//! build a new, relabeled one (see [`filter`]).

pub mod filter;


use common::Buffer3;
use rayon::prelude::*;

use crate::constants::LABEL_BASE;
use crate::error::ConfigError;
use crate::labeling::LabelVolume;
use crate::volume::{Calibration, Volume};

/// Width, height and depth of the raster a population was extracted from.
pub type Shape = (usize, usize, usize);

/// One connected 3D object.
///
/// Voxels are stored as sorted linear indices `(z * height + y) * width + x`
/// of the source raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledObject {
    label: u32,
    voxels: Vec<usize>,
    /// `(z, count)` for every plane the object touches, ascending z.
    plane_counts: Vec<(usize, usize)>,
}

impl LabeledObject {
    /// Build an object from voxel indices. `plane_len` is `width * height`
    /// of the source raster.
    pub fn new(label: u32, mut voxels: Vec<usize>, plane_len: usize) -> Self {
        voxels.sort_unstable();
        voxels.dedup();
        let plane_counts = count_planes(&voxels, plane_len);
        Self {
            label,
            voxels,
            plane_counts,
        }
    }

    /// An object with no voxels.
    pub fn empty(label: u32) -> Self {
        Self {
            label,
            voxels: Vec::new(),
            plane_counts: Vec::new(),
        }
    }

    #[inline]
    pub fn label(&self) -> u32 {
        self.label
    }

    #[inline]
    pub fn voxels(&self) -> &[usize] {
        &self.voxels
    }

    #[inline]
    pub fn voxel_count(&self) -> usize {
        self.voxels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }

    #[inline]
    pub fn plane_counts(&self) -> &[(usize, usize)] {
        &self.plane_counts
    }

    /// Number of distinct z-planes the object occupies.
    #[inline]
    pub fn plane_span(&self) -> usize {
        self.plane_counts.len()
    }

    /// Physical volume in µm³.
    #[inline]
    pub fn volume(&self, calibration: &Calibration) -> f64 {
        self.voxels.len() as f64 * calibration.voxel_volume()
    }

    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        self.voxels.binary_search(&index).is_ok()
    }

    /// Number of voxels shared with `other`.
    pub fn overlap(&self, other: &LabeledObject) -> usize {
        let (small, large) = if self.voxels.len() <= other.voxels.len() {
            (self, other)
        } else {
            (other, self)
        };
        small.voxels.iter().filter(|&&v| large.contains(v)).count()
    }

    /// Fraction of this object's voxels that lie inside `reference`.
    /// Zero for an empty object.
    pub fn colocalization_ratio(&self, reference: &LabeledObject) -> f64 {
        if self.voxels.is_empty() {
            return 0.0;
        }
        self.overlap(reference) as f64 / self.voxels.len() as f64
    }

    fn with_label(mut self, label: u32) -> Self {
        self.label = label;
        self
    }
}

fn count_planes(sorted_voxels: &[usize], plane_len: usize) -> Vec<(usize, usize)> {
    let mut counts: Vec<(usize, usize)> = Vec::new();
    if plane_len == 0 {
        return counts;
    }
    for &v in sorted_voxels {
        let z = v / plane_len;
        match counts.last_mut() {
            Some((last_z, count)) if *last_z == z => *count += 1,
            _ => counts.push((z, 1)),
        }
    }
    counts
}

/// A collection of labeled objects extracted from one raster.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectPopulation {
    objects: Vec<LabeledObject>,
    shape: Shape,
    calibration: Option<Calibration>,
}

impl ObjectPopulation {
    /// Build a population from objects, relabeling them contiguously.
    pub fn new(objects: Vec<LabeledObject>, shape: Shape) -> Self {
        Self::relabeled(objects, shape, None)
    }

    pub fn empty(shape: Shape) -> Self {
        Self::new(Vec::new(), shape)
    }

    fn relabeled(objects: Vec<LabeledObject>, shape: Shape, calibration: Option<Calibration>) -> Self {
        let objects = objects
            .into_iter()
            .enumerate()
            .map(|(i, obj)| obj.with_label(LABEL_BASE + i as u32))
            .collect();
        Self {
            objects,
            shape,
            calibration,
        }
    }

    /// Group the non-zero voxels of a label raster by label value.
    ///
    /// Objects are ordered by their original label and renumbered from
    /// [`LABEL_BASE`]; gaps in the input numbering disappear.
    pub fn from_label_volume(labels: &Buffer3<u32>) -> Self {
        let shape = (labels.width(), labels.height(), labels.depth());
        let plane_len = labels.plane_len();
        let data = labels.voxels();

        let max_label = data.par_iter().copied().max().unwrap_or(0) as usize;
        if max_label == 0 {
            return Self::empty(shape);
        }

        let mut sizes = vec![0usize; max_label + 1];
        for &l in data {
            sizes[l as usize] += 1;
        }
        let mut members: Vec<Vec<usize>> = sizes.iter().map(|&n| Vec::with_capacity(n)).collect();
        for (idx, &l) in data.iter().enumerate() {
            if l != 0 {
                members[l as usize].push(idx);
            }
        }

        // Scan order keeps every member list sorted.
        let objects = members
            .into_iter()
            .enumerate()
            .skip(1)
            .filter(|(_, voxels)| !voxels.is_empty())
            .map(|(label, voxels)| {
                let plane_counts = count_planes(&voxels, plane_len);
                LabeledObject {
                    label: label as u32,
                    voxels,
                    plane_counts,
                }
            })
            .collect();

        Self::new(objects, shape)
    }

    pub fn from_labeling(labeling: &LabelVolume) -> Self {
        Self::from_label_volume(labeling.labels())
    }

    /// Attach voxel calibration; required before volume filtering.
    pub fn with_calibration(mut self, calibration: Calibration) -> Self {
        self.calibration = Some(calibration);
        self
    }

    #[inline]
    pub fn calibration(&self) -> Option<Calibration> {
        self.calibration
    }

    #[inline]
    pub fn shape(&self) -> Shape {
        self.shape
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    #[inline]
    pub fn objects(&self) -> &[LabeledObject] {
        &self.objects
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LabeledObject> {
        self.objects.iter()
    }

    pub fn labels(&self) -> Vec<u32> {
        self.objects.iter().map(|o| o.label).collect()
    }

    /// New population with the objects accepted by `keep`, relabeled.
    pub fn filtered(&self, keep: impl Fn(&LabeledObject) -> bool + Sync) -> Self {
        let kept: Vec<LabeledObject> = self
            .objects
            .par_iter()
            .filter(|obj| keep(*obj))
            .cloned()
            .collect();
        Self::relabeled(kept, self.shape, self.calibration)
    }

    /// Union of every object as one object labeled `label`.
    pub fn merge_all(&self, label: u32) -> LabeledObject {
        let mut voxels: Vec<usize> = self
            .objects
            .iter()
            .flat_map(|o| o.voxels.iter().copied())
            .collect();
        voxels.par_sort_unstable();
        voxels.dedup();
        let plane_counts = count_planes(&voxels, self.shape.0 * self.shape.1);
        LabeledObject {
            label,
            voxels,
            plane_counts,
        }
    }

    /// Sum of object volumes in µm³, accumulated in parallel.
    pub fn total_volume(&self) -> Result<f64, ConfigError> {
        let calibration = self.calibration.ok_or(ConfigError::MissingCalibration)?;
        Ok(self
            .objects
            .par_iter()
            .map(|o| o.volume(&calibration))
            .sum())
    }

    /// Render the population as a label raster.
    pub fn to_label_volume(&self) -> Buffer3<u32> {
        let (w, h, d) = self.shape;
        let mut labels = Buffer3::new_default(w, h, d);
        for obj in &self.objects {
            for &v in &obj.voxels {
                labels[v] = obj.label;
            }
        }
        labels
    }
}

impl<'a> IntoIterator for &'a ObjectPopulation {
    type Item = &'a LabeledObject;
    type IntoIter = std::slice::Iter<'a, LabeledObject>;

    fn into_iter(self) -> Self::IntoIter {
        self.objects.iter()
    }
}

/// Mean and sum of `volume` intensities over an object's voxels.
pub fn intensity_stats(volume: &Volume, object: &LabeledObject) -> (f64, f64) {
    if object.is_empty() {
        return (0.0, 0.0);
    }
    let sum = volume.sum_over(object.voxels());
    (sum / object.voxel_count() as f64, sum)
}
