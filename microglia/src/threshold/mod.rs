//! Global automatic binarization.
//!
//! The volume's intensity range is split into [`HISTOGRAM_BINS`] bins, a
//! threshold bin is chosen by one of the classic histogram-based methods,
//! and voxels falling in bins strictly above it become foreground.

mod methods;


use std::str::FromStr;

use common::{BitBuffer3, Buffer3};
use rayon::prelude::*;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use crate::constants::HISTOGRAM_BINS;
use crate::error::ConfigError;

/// Histogram-based automatic threshold methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum ThresholdMethod {
    /// IsoData variant that first damps a dominant histogram mode.
    Default,
    Huang,
    Intermodes,
    IsoData,
    Li,
    MaxEntropy,
    Mean,
    Minimum,
    Moments,
    #[default]
    Otsu,
    Percentile,
    Triangle,
    Yen,
}

impl ThresholdMethod {
    /// Parse a method name (case-insensitive).
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        Self::from_str(name.trim()).map_err(|_| ConfigError::UnknownThresholdMethod {
            name: name.to_string(),
            known: Self::known_names(),
        })
    }

    /// Comma-separated list of every method name.
    pub fn known_names() -> String {
        Self::iter()
            .map(|m| m.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Threshold bin for a histogram, or `None` when the method cannot
    /// separate the histogram (e.g. no two modes found).
    pub fn threshold_bin(self, histogram: &[u64]) -> Option<usize> {
        let bin = match self {
            ThresholdMethod::Default => methods::ij_default(histogram),
            ThresholdMethod::Huang => methods::huang(histogram),
            ThresholdMethod::Intermodes => methods::intermodes(histogram),
            ThresholdMethod::IsoData => methods::iso_data(histogram),
            ThresholdMethod::Li => methods::li(histogram),
            ThresholdMethod::MaxEntropy => methods::max_entropy(histogram),
            ThresholdMethod::Mean => methods::mean(histogram),
            ThresholdMethod::Minimum => methods::minimum(histogram),
            ThresholdMethod::Moments => methods::moments(histogram),
            ThresholdMethod::Otsu => methods::otsu(histogram),
            ThresholdMethod::Percentile => methods::percentile(histogram),
            ThresholdMethod::Triangle => methods::triangle(histogram),
            ThresholdMethod::Yen => methods::yen(histogram),
        }?;
        Some(bin.min(histogram.len().saturating_sub(1)))
    }
}

/// Fixed-bin intensity histogram over `[min, max]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub counts: Vec<u64>,
    pub min: f32,
    pub max: f32,
}

impl Histogram {
    /// Build a histogram of the finite values of `voxels`. Returns `None`
    /// for an empty or constant input, which has nothing to separate.
    pub fn from_voxels(voxels: &[f32]) -> Option<Self> {
        let (min, max) = voxels
            .par_iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(
                || (f32::INFINITY, f32::NEG_INFINITY),
                |(lo, hi), v| (lo.min(v), hi.max(v)),
            )
            .reduce(
                || (f32::INFINITY, f32::NEG_INFINITY),
                |(a_lo, a_hi), (b_lo, b_hi)| (a_lo.min(b_lo), a_hi.max(b_hi)),
            );
        if max <= min {
            return None;
        }

        let counts = voxels
            .par_chunks(64 * 1024)
            .fold(
                || vec![0u64; HISTOGRAM_BINS],
                |mut counts, chunk| {
                    for &v in chunk {
                        if v.is_finite() {
                            counts[bin_index(v, min, max)] += 1;
                        }
                    }
                    counts
                },
            )
            .reduce(
                || vec![0u64; HISTOGRAM_BINS],
                |mut a, b| {
                    a.iter_mut().zip(&b).for_each(|(x, y)| *x += y);
                    a
                },
            );
        Some(Self { counts, min, max })
    }

    #[inline]
    pub fn bin_width(&self) -> f32 {
        (self.max - self.min) / HISTOGRAM_BINS as f32
    }

    #[inline]
    pub fn bin_of(&self, value: f32) -> usize {
        bin_index(value, self.min, self.max)
    }

    /// Intensity at the upper edge of `bin`.
    pub fn upper_edge(&self, bin: usize) -> f32 {
        self.min + (bin + 1) as f32 * self.bin_width()
    }
}

#[inline]
fn bin_index(value: f32, min: f32, max: f32) -> usize {
    let scaled = (value - min) / (max - min) * HISTOGRAM_BINS as f32;
    (scaled.max(0.0) as usize).min(HISTOGRAM_BINS - 1)
}

/// Binarize `volume` globally with `method`.
///
/// A constant volume, or a histogram the method cannot split, yields an
/// empty mask.
pub fn auto_threshold(volume: &Buffer3<f32>, method: ThresholdMethod) -> BitBuffer3 {
    let mut mask = BitBuffer3::new_default(volume.width(), volume.height(), volume.depth());

    let Some(histogram) = Histogram::from_voxels(volume.voxels()) else {
        tracing::debug!(%method, "Constant volume, nothing to threshold");
        return mask;
    };
    let Some(bin) = method.threshold_bin(&histogram.counts) else {
        tracing::warn!(%method, "Threshold method found no threshold, mask is empty");
        return mask;
    };
    tracing::debug!(
        %method,
        bin,
        value = histogram.upper_edge(bin),
        "Automatic threshold"
    );

    let width = volume.width();
    let words_per_row = mask.words_per_row();
    if words_per_row == 0 {
        return mask;
    }
    mask.words_mut()
        .par_chunks_mut(words_per_row)
        .zip(volume.voxels().par_chunks(width))
        .for_each(|(row_words, row)| {
            for (x, &v) in row.iter().enumerate() {
                if v.is_finite() && histogram.bin_of(v) > bin {
                    row_words[x / 64] |= 1u64 << (x % 64);
                }
            }
        });
    mask
}
