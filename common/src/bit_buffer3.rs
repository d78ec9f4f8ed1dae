//! Bit-packed 3D buffer for binary mask volumes.
//!
//! Each row of each z-plane starts on a fresh `u64` word, so a row can be
//! scanned word by word (run extraction in connected-component labeling)
//! without bit shifting across row boundaries. Bits are stored LSB first.

/// Number of bits per storage word.
const BITS_PER_WORD: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitBuffer3 {
    words: Vec<u64>,
    width: usize,
    height: usize,
    depth: usize,
    words_per_row: usize,
}

impl BitBuffer3 {
    /// Create a new mask with every voxel set to `value`.
    pub fn new_filled(width: usize, height: usize, depth: usize, value: bool) -> Self {
        let words_per_row = width.div_ceil(BITS_PER_WORD);
        let mut buf = Self {
            words: vec![0; words_per_row * height * depth],
            width,
            height,
            depth,
            words_per_row,
        };
        if value {
            buf.fill(true);
        }
        buf
    }

    #[inline]
    pub fn new_default(width: usize, height: usize, depth: usize) -> Self {
        Self::new_filled(width, height, depth, false)
    }

    /// Build a mask from a predicate over linear voxel indices.
    pub fn from_fn(
        width: usize,
        height: usize,
        depth: usize,
        mut f: impl FnMut(usize) -> bool,
    ) -> Self {
        let mut buf = Self::new_default(width, height, depth);
        for idx in 0..width * height * depth {
            if f(idx) {
                buf.set(idx, true);
            }
        }
        buf
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

    /// Number of voxels (not words).
    #[inline]
    pub fn len(&self) -> usize {
        self.width * self.height * self.depth
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn words_per_row(&self) -> usize {
        self.words_per_row
    }

    /// Word offset of row `y` in plane `z`.
    #[inline]
    fn row_word_start(&self, y: usize, z: usize) -> usize {
        (z * self.height + y) * self.words_per_row
    }

    #[inline]
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    #[inline]
    pub fn words_mut(&mut self) -> &mut [u64] {
        &mut self.words
    }

    #[inline]
    fn locate(&self, x: usize, y: usize, z: usize) -> (usize, usize) {
        (
            self.row_word_start(y, z) + x / BITS_PER_WORD,
            x % BITS_PER_WORD,
        )
    }

    #[inline]
    pub fn get_xyz(&self, x: usize, y: usize, z: usize) -> bool {
        debug_assert!(x < self.width && y < self.height && z < self.depth);
        let (word, bit) = self.locate(x, y, z);
        (self.words[word] >> bit) & 1 != 0
    }

    #[inline]
    pub fn set_xyz(&mut self, x: usize, y: usize, z: usize, value: bool) {
        debug_assert!(x < self.width && y < self.height && z < self.depth);
        let (word, bit) = self.locate(x, y, z);
        if value {
            self.words[word] |= 1u64 << bit;
        } else {
            self.words[word] &= !(1u64 << bit);
        }
    }

    /// Get by linear voxel index `(z * height + y) * width + x`.
    #[inline]
    pub fn get(&self, idx: usize) -> bool {
        let (x, y, z) = self.coords(idx);
        self.get_xyz(x, y, z)
    }

    #[inline]
    pub fn set(&mut self, idx: usize, value: bool) {
        let (x, y, z) = self.coords(idx);
        self.set_xyz(x, y, z, value);
    }

    #[inline]
    fn coords(&self, idx: usize) -> (usize, usize, usize) {
        debug_assert!(idx < self.len());
        let plane = self.width * self.height;
        let rem = idx % plane;
        (rem % self.width, rem / self.width, idx / plane)
    }

    /// Set every voxel, keeping padding bits at the end of rows cleared.
    pub fn fill(&mut self, value: bool) {
        if !value {
            self.words.fill(0);
            return;
        }
        let tail_bits = self.width % BITS_PER_WORD;
        let last_word = if tail_bits == 0 {
            !0u64
        } else {
            (1u64 << tail_bits) - 1
        };
        for row in self.words.chunks_mut(self.words_per_row.max(1)) {
            row.fill(!0u64);
            if let Some(last) = row.last_mut() {
                *last = last_word;
            }
        }
    }

    /// Clear every voxel of plane `z` for which `keep_out` is set in the
    /// 2D row-major plane mask (`width * height` entries).
    pub fn clear_plane_where(&mut self, z: usize, keep_out: &[bool]) {
        assert_eq!(keep_out.len(), self.width * self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                if keep_out[y * self.width + x] {
                    self.set_xyz(x, y, z, false);
                }
            }
        }
    }

    /// Count the number of set voxels.
    #[inline]
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }
}
