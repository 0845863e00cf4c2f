//! 4-channel output histogram.
//!
//! Binned over the post-toning texture exactly as the 8-bit preview would
//! quantize it, so the UI histogram matches what the user sees. On the GPU
//! this runs as an atomic-add kernel over the same binning.

use rayon::prelude::*;

use crate::decoders::ImageBuffer;
use crate::numerics::rec709_luma;

pub const HISTOGRAM_BINS: usize = 256;

/// R, G, B and Rec.709 luma, 256 bins each. Delivered asynchronously after a
/// render, tagged with the render id it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramResult {
    pub r: Vec<u32>,
    pub g: Vec<u32>,
    pub b: Vec<u32>,
    pub luma: Vec<u32>,
}

impl Default for HistogramResult {
    fn default() -> Self {
        Self {
            r: vec![0; HISTOGRAM_BINS],
            g: vec![0; HISTOGRAM_BINS],
            b: vec![0; HISTOGRAM_BINS],
            luma: vec![0; HISTOGRAM_BINS],
        }
    }
}

impl HistogramResult {
    /// Build from a flat 4x256 array as read back from the GPU metrics
    /// buffer (row order R, G, B, luma).
    pub fn from_flat(flat: &[u32]) -> Self {
        debug_assert_eq!(flat.len(), 4 * HISTOGRAM_BINS);
        Self {
            r: flat[..HISTOGRAM_BINS].to_vec(),
            g: flat[HISTOGRAM_BINS..2 * HISTOGRAM_BINS].to_vec(),
            b: flat[2 * HISTOGRAM_BINS..3 * HISTOGRAM_BINS].to_vec(),
            luma: flat[3 * HISTOGRAM_BINS..].to_vec(),
        }
    }

    fn merge(mut self, other: HistogramResult) -> Self {
        for (a, b) in self.r.iter_mut().zip(other.r) {
            *a += b;
        }
        for (a, b) in self.g.iter_mut().zip(other.g) {
            *a += b;
        }
        for (a, b) in self.b.iter_mut().zip(other.b) {
            *a += b;
        }
        for (a, b) in self.luma.iter_mut().zip(other.luma) {
            *a += b;
        }
        self
    }
}

#[inline]
fn bin_of(v: f32) -> usize {
    ((v.clamp(0.0, 1.0) * 255.0 + 0.5) as usize).min(HISTOGRAM_BINS - 1)
}

/// CPU reference histogram over a toned buffer.
pub fn compute_histogram(buffer: &ImageBuffer) -> HistogramResult {
    buffer
        .data
        .par_chunks((buffer.stride * 3) as usize)
        .fold(HistogramResult::default, |mut acc, row| {
            for px in row.chunks_exact(3) {
                acc.r[bin_of(px[0])] += 1;
                acc.g[bin_of(px[1])] += 1;
                acc.b[bin_of(px[2])] += 1;
                acc.luma[bin_of(rec709_luma(px[0], px[1], px[2]))] += 1;
            }
            acc
        })
        .reduce(HistogramResult::default, HistogramResult::merge)
}
