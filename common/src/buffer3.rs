//! Dense 3D voxel buffer stored plane by plane.
//!
//! Voxel `(x, y, z)` lives at `(z * height + y) * width + x`, so every z-plane
//! is a contiguous `width * height` slice. Plane-wise processing (slice-wise
//! filters, per-plane blanking) works on those slices directly.

use std::ops::{Index, IndexMut};
use std::slice::{Chunks, ChunksMut};

#[derive(Debug, Clone, PartialEq)]
pub struct Buffer3<T> {
    voxels: Vec<T>,
    width: usize,
    height: usize,
    depth: usize,
}

impl<T> Buffer3<T> {
    pub fn new(width: usize, height: usize, depth: usize, voxels: Vec<T>) -> Self {
        assert_eq!(
            voxels.len(),
            width * height * depth,
            "voxels length must equal width * height * depth"
        );
        Self {
            voxels,
            width,
            height,
            depth,
        }
    }

    /// Build a volume from equally sized planes, first plane at z = 0.
    pub fn from_planes(width: usize, height: usize, planes: Vec<Vec<T>>) -> Self {
        let depth = planes.len();
        let mut voxels = Vec::with_capacity(width * height * depth);
        for (z, plane) in planes.into_iter().enumerate() {
            assert_eq!(
                plane.len(),
                width * height,
                "plane {} has {} voxels, expected {}",
                z,
                plane.len(),
                width * height
            );
            voxels.extend(plane);
        }
        Self::new(width, height, depth, voxels)
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize) -> &T {
        debug_assert!(x < self.width && y < self.height && z < self.depth);
        &self.voxels[self.index(x, y, z)]
    }

    #[inline]
    pub fn get_mut(&mut self, x: usize, y: usize, z: usize) -> &mut T {
        debug_assert!(x < self.width && y < self.height && z < self.depth);
        let idx = self.index(x, y, z);
        &mut self.voxels[idx]
    }

    /// Linear index of voxel `(x, y, z)`.
    #[inline]
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        (z * self.height + y) * self.width + x
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.voxels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Number of voxels in one z-plane.
    #[inline]
    pub fn plane_len(&self) -> usize {
        self.width * self.height
    }

    #[inline]
    pub fn voxels(&self) -> &[T] {
        &self.voxels
    }

    #[inline]
    pub fn voxels_mut(&mut self) -> &mut [T] {
        &mut self.voxels
    }

    #[inline]
    pub fn into_voxels(self) -> Vec<T> {
        self.voxels
    }

    #[inline]
    pub fn plane(&self, z: usize) -> &[T] {
        let len = self.plane_len();
        &self.voxels[z * len..(z + 1) * len]
    }

    #[inline]
    pub fn plane_mut(&mut self, z: usize) -> &mut [T] {
        let len = self.plane_len();
        &mut self.voxels[z * len..(z + 1) * len]
    }

    /// Iterate over z-planes in order.
    pub fn planes(&self) -> Chunks<'_, T> {
        self.voxels.chunks(self.plane_len().max(1))
    }

    pub fn planes_mut(&mut self) -> ChunksMut<'_, T> {
        let len = self.plane_len().max(1);
        self.voxels.chunks_mut(len)
    }

    /// True when both buffers have the same width, height and depth.
    #[inline]
    pub fn same_shape<U>(&self, other: &Buffer3<U>) -> bool {
        self.width == other.width() && self.height == other.height() && self.depth == other.depth()
    }
}

impl<T: Default + Clone> Buffer3<T> {
    pub fn new_default(width: usize, height: usize, depth: usize) -> Self {
        Self {
            voxels: vec![T::default(); width * height * depth],
            width,
            height,
            depth,
        }
    }
}

impl<T: Clone> Buffer3<T> {
    pub fn new_filled(width: usize, height: usize, depth: usize, value: T) -> Self {
        Self {
            voxels: vec![value; width * height * depth],
            width,
            height,
            depth,
        }
    }
}

impl<T> Index<(usize, usize, usize)> for Buffer3<T> {
    type Output = T;

    #[inline]
    fn index(&self, (x, y, z): (usize, usize, usize)) -> &Self::Output {
        &self.voxels[(z * self.height + y) * self.width + x]
    }
}

impl<T> IndexMut<(usize, usize, usize)> for Buffer3<T> {
    #[inline]
    fn index_mut(&mut self, (x, y, z): (usize, usize, usize)) -> &mut Self::Output {
        &mut self.voxels[(z * self.height + y) * self.width + x]
    }
}

impl<T> Index<usize> for Buffer3<T> {
    type Output = T;

    #[inline]
    fn index(&self, idx: usize) -> &Self::Output {
        &self.voxels[idx]
    }
}

impl<T> IndexMut<usize> for Buffer3<T> {
    #[inline]
    fn index_mut(&mut self, idx: usize) -> &mut Self::Output {
        &mut self.voxels[idx]
    }
}
