//! 3D connected component labeling using union-find over row runs.
//!
//! Every (y, z) row of the mask is run-length encoded with word-level bit
//! scanning (rows are extracted in parallel). Runs are then merged in
//! raster order against the already labeled rows that can touch them: the
//! previous row of the same plane and, depending on connectivity, one or
//! three rows of the previous plane. Provisional labels are flattened to
//! `1..=n` in order of first appearance.


use common::{BitBuffer3, Buffer3};
use rayon::prelude::*;

/// Voxel neighborhood used to connect foreground voxels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connectivity {
    /// Face neighbors only: (x±1), (y±1), (z±1).
    Six,
    /// Every voxel of the surrounding 3×3×3 cube.
    #[default]
    TwentySix,
}

/// How runs of two neighboring rows are allowed to touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Overlap {
    /// Runs must share at least one x.
    Face,
    /// Runs may also touch diagonally (x differs by one).
    Diagonal,
}

/// A horizontal run of foreground voxels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Run {
    start: u32, // inclusive
    end: u32,   // exclusive
    label: u32, // provisional, 0 = unassigned
}

impl Run {
    #[inline]
    fn search_window(&self, overlap: Overlap) -> (u32, u32) {
        match overlap {
            Overlap::Face => (self.start, self.end),
            Overlap::Diagonal => (self.start.saturating_sub(1), self.end + 1),
        }
    }
}

#[inline]
fn runs_connected(prev: &Run, curr: &Run, overlap: Overlap) -> bool {
    match overlap {
        Overlap::Face => prev.start < curr.end && prev.end > curr.start,
        Overlap::Diagonal => prev.start < curr.end + 1 && prev.end + 1 > curr.start,
    }
}

/// Extract runs from one mask row using trailing-zero scanning.
pub(crate) fn extract_runs_from_row(row_words: &[u64], width: usize, runs: &mut Vec<Run>) {
    let width = width as u32;
    let mut in_run = false;
    let mut run_start = 0u32;

    for (word_idx, &word) in row_words.iter().enumerate() {
        let base_x = word_idx as u32 * 64;

        if word == 0 {
            if in_run {
                runs.push(Run {
                    start: run_start,
                    end: base_x.min(width),
                    label: 0,
                });
                in_run = false;
            }
            continue;
        }

        if word == !0u64 {
            if !in_run {
                run_start = base_x;
                in_run = true;
            }
            continue;
        }

        let word_end = (base_x + 64).min(width);
        let mut pos = base_x;
        while pos < word_end {
            let remaining = word >> (pos - base_x);
            if in_run {
                let end_pos = pos + (!remaining).trailing_zeros();
                if end_pos >= word_end {
                    break;
                }
                runs.push(Run {
                    start: run_start,
                    end: end_pos,
                    label: 0,
                });
                in_run = false;
                pos = end_pos;
            } else {
                if remaining == 0 {
                    break;
                }
                let start_pos = pos + remaining.trailing_zeros();
                if start_pos >= word_end {
                    break;
                }
                run_start = start_pos;
                in_run = true;
                pos = start_pos;
            }
        }
    }

    if in_run {
        runs.push(Run {
            start: run_start,
            end: width,
            label: 0,
        });
    }
}

/// Give every run of `curr` that touches a run of `prev` that run's
/// label, and union labels when a run touches several.
fn link_runs(curr: &mut [Run], prev: &[Run], overlap: Overlap, uf: &mut UnionFind) {
    let mut prev_idx = 0;
    for run in curr.iter_mut() {
        let (search_start, search_end) = run.search_window(overlap);

        while prev_idx < prev.len() && prev[prev_idx].end <= search_start {
            prev_idx += 1;
        }

        let mut check_idx = prev_idx;
        while check_idx < prev.len() && prev[check_idx].start < search_end {
            let prev_run = &prev[check_idx];
            if runs_connected(prev_run, run, overlap) {
                if run.label == 0 {
                    run.label = prev_run.label;
                } else if run.label != prev_run.label {
                    uf.union(run.label, prev_run.label);
                }
            }
            check_idx += 1;
        }
    }
}

/// Result of labeling a binary volume.
#[derive(Debug, Clone)]
pub struct LabelVolume {
    labels: Buffer3<u32>,
    num_labels: usize,
}

impl LabelVolume {
    /// Label the connected foreground components of `mask`.
    pub fn from_mask(mask: &BitBuffer3, connectivity: Connectivity) -> Self {
        let width = mask.width();
        let height = mask.height();
        let depth = mask.depth();
        let mut labels = Buffer3::new_default(width, height, depth);

        if mask.is_empty() {
            return Self {
                labels,
                num_labels: 0,
            };
        }

        let words_per_row = mask.words_per_row();
        let mut rows: Vec<Vec<Run>> = mask
            .words()
            .par_chunks(words_per_row)
            .map(|row_words| {
                let mut runs = Vec::new();
                extract_runs_from_row(row_words, width, &mut runs);
                runs
            })
            .collect();

        let (in_plane, cross_plane) = match connectivity {
            Connectivity::Six => (Overlap::Face, Overlap::Face),
            Connectivity::TwentySix => (Overlap::Diagonal, Overlap::Diagonal),
        };

        let mut uf = UnionFind::new();
        for z in 0..depth {
            for y in 0..height {
                let row = z * height + y;
                let (done, rest) = rows.split_at_mut(row);
                let curr = &mut rest[0];
                if curr.is_empty() {
                    continue;
                }

                if y > 0 {
                    link_runs(curr, &done[row - 1], in_plane, &mut uf);
                }
                if z > 0 {
                    let below = row - height;
                    match connectivity {
                        Connectivity::Six => link_runs(curr, &done[below], cross_plane, &mut uf),
                        Connectivity::TwentySix => {
                            if y > 0 {
                                link_runs(curr, &done[below - 1], cross_plane, &mut uf);
                            }
                            link_runs(curr, &done[below], cross_plane, &mut uf);
                            if y + 1 < height {
                                link_runs(curr, &done[below + 1], cross_plane, &mut uf);
                            }
                        }
                    }
                }

                for run in curr.iter_mut().filter(|r| r.label == 0) {
                    run.label = uf.make_set();
                }
            }
        }

        for (row_labels, runs) in labels.voxels_mut().chunks_mut(width).zip(&rows) {
            for run in runs {
                row_labels[run.start as usize..run.end as usize].fill(run.label);
            }
        }
        drop(rows);

        let num_labels = uf.flatten_labels(labels.voxels_mut());
        Self { labels, num_labels }
    }

    /// Number of connected components (excluding background).
    #[inline]
    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    #[inline]
    pub fn labels(&self) -> &Buffer3<u32> {
        &self.labels
    }

    #[inline]
    pub fn into_labels(self) -> Buffer3<u32> {
        self.labels
    }
}

/// Sequential union-find over provisional labels starting at 1.
#[derive(Debug)]
struct UnionFind {
    parent: Vec<u32>,
}

impl UnionFind {
    fn new() -> Self {
        Self {
            parent: Vec::with_capacity(256),
        }
    }

    #[inline]
    fn make_set(&mut self) -> u32 {
        let label = self.parent.len() as u32 + 1;
        self.parent.push(label);
        label
    }

    /// Find root with two-pass path compression.
    #[inline]
    fn find(&mut self, label: u32) -> u32 {
        let mut root = label;
        loop {
            let parent = self.parent[(root - 1) as usize];
            if parent == root {
                break;
            }
            root = parent;
        }

        let mut current = label;
        while current != root {
            let idx = (current - 1) as usize;
            let parent = self.parent[idx];
            self.parent[idx] = root;
            current = parent;
        }

        root
    }

    #[inline]
    fn union(&mut self, a: u32, b: u32) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a != root_b {
            let (smaller, larger) = if root_a < root_b {
                (root_a, root_b)
            } else {
                (root_b, root_a)
            };
            self.parent[(larger - 1) as usize] = smaller;
        }
    }

    /// Rewrite provisional labels in place to sequential `1..=n`.
    fn flatten_labels(&mut self, labels: &mut [u32]) -> usize {
        let len = self.parent.len();
        if len == 0 {
            return 0;
        }

        let mut label_map = vec![0u32; len + 1];
        let mut num_labels = 0u32;
        for i in 1..=len as u32 {
            let root = self.find(i);
            if label_map[root as usize] == 0 {
                num_labels += 1;
                label_map[root as usize] = num_labels;
            }
            label_map[i as usize] = label_map[root as usize];
        }

        labels.par_iter_mut().for_each(|l| {
            if *l != 0 {
                *l = label_map[*l as usize];
            }
        });

        num_labels as usize
    }
}
