//! CLAHE local-contrast stage: histogram, CDF, and apply passes.
//!
//! Operates on perceptual luminance (gamma 2.2) over a fixed 8x8 grid of
//! tiles spanning the full image, regardless of aspect or export tiling.
//! The histogram/CDF context is shared per render so every export tile
//! equalizes against the same statistics as the untiled frame.

use rayon::prelude::*;

use super::params::{ClaheParams, CLAHE_BINS, CLAHE_GRID};
use crate::decoders::ImageBuffer;
use crate::numerics::rec709_luma;

/// Perceptual (display-weighted) luminance used for binning.
#[inline]
pub fn perceptual_luma(rgb: [f32; 3]) -> f32 {
    rec709_luma(rgb[0], rgb[1], rgb[2])
        .clamp(0.0, 1.0)
        .powf(1.0 / 2.2)
}

#[inline]
fn bin_of(p: f32) -> usize {
    ((p * 255.0 + 0.5) as usize).min(CLAHE_BINS as usize - 1)
}

#[inline]
fn tile_of(g: i32, full: u32) -> usize {
    ((g.max(0) as u32 * CLAHE_GRID) / full.max(1)).min(CLAHE_GRID - 1) as usize
}

/// Shared per-render histogram context.
///
/// `accumulate` may be called once for the whole frame or once per export
/// tile (over the halo-free region); the sums are identical either way.
pub struct ClaheContext {
    hist: Vec<u32>,
    cdf: Vec<f32>,
}

impl Default for ClaheContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ClaheContext {
    pub fn new() -> Self {
        let cells = (CLAHE_GRID * CLAHE_GRID * CLAHE_BINS) as usize;
        Self {
            hist: vec![0u32; cells],
            cdf: vec![0.0f32; cells],
        }
    }

    /// Accumulate the histogram over the params' region of a buffer.
    pub fn accumulate(&mut self, input: &ImageBuffer, params: &ClaheParams) {
        for ry in 0..params.region_height {
            let ly = params.region_origin[1] + ry as i32;
            let gy = ly + params.global_offset[1];
            let ty = tile_of(gy, params.full_height);
            for rx in 0..params.region_width {
                let lx = params.region_origin[0] + rx as i32;
                let gx = lx + params.global_offset[0];
                let tx = tile_of(gx, params.full_width);
                let p = perceptual_luma(input.pixel(lx as u32, ly as u32));
                let idx = (ty * CLAHE_GRID as usize + tx) * CLAHE_BINS as usize + bin_of(p);
                self.hist[idx] += 1;
            }
        }
    }

    /// Clip each tile histogram and build its normalized CDF.
    ///
    /// The clipped excess is redistributed uniformly: integer quotient to
    /// every bin, remainder to the first `rem` bins.
    pub fn build_cdf(&mut self, clip_limit: f32) {
        let bins = CLAHE_BINS as usize;
        for tile in 0..(CLAHE_GRID * CLAHE_GRID) as usize {
            let hist = &mut self.hist[tile * bins..(tile + 1) * bins];
            let total: u64 = hist.iter().map(|&c| c as u64).sum();
            let cdf = &mut self.cdf[tile * bins..(tile + 1) * bins];

            if total == 0 {
                // Empty tile: identity ramp.
                for (i, c) in cdf.iter_mut().enumerate() {
                    *c = (i as f32 + 0.5) / bins as f32;
                }
                continue;
            }

            let clip = ((clip_limit * total as f32 / bins as f32) as u64).max(1);
            let mut clipped = [0u64; 256];
            let mut excess = 0u64;
            for (i, &count) in hist.iter().enumerate() {
                let c = count as u64;
                if c > clip {
                    excess += c - clip;
                    clipped[i] = clip;
                } else {
                    clipped[i] = c;
                }
            }
            let share = excess / bins as u64;
            let rem = (excess % bins as u64) as usize;
            for (i, c) in clipped.iter_mut().enumerate() {
                *c += share + u64::from(i < rem);
            }

            let mut cum = 0u64;
            for (i, &c) in clipped.iter().enumerate() {
                cum += c;
                cdf[i] = cum as f32 / total as f32;
            }
        }
    }

    /// Look up the equalized luma by bilinear interpolation of the four
    /// surrounding tile-center CDFs. Tile centers beyond the grid clamp.
    #[inline]
    pub fn equalized(&self, gx: i32, gy: i32, p: f32, params: &ClaheParams) -> f32 {
        let bins = CLAHE_BINS as usize;
        let grid = CLAHE_GRID as f32;
        let bin = bin_of(p);

        let fx = (gx as f32 + 0.5) * grid / params.full_width.max(1) as f32 - 0.5;
        let fy = (gy as f32 + 0.5) * grid / params.full_height.max(1) as f32 - 0.5;
        let x0 = fx.floor();
        let y0 = fy.floor();
        let wx = fx - x0;
        let wy = fy - y0;

        let cx0 = (x0 as i32).clamp(0, CLAHE_GRID as i32 - 1) as usize;
        let cx1 = (x0 as i32 + 1).clamp(0, CLAHE_GRID as i32 - 1) as usize;
        let cy0 = (y0 as i32).clamp(0, CLAHE_GRID as i32 - 1) as usize;
        let cy1 = (y0 as i32 + 1).clamp(0, CLAHE_GRID as i32 - 1) as usize;

        let fetch = |tx: usize, ty: usize| self.cdf[(ty * CLAHE_GRID as usize + tx) * bins + bin];
        let top = fetch(cx0, cy0) * (1.0 - wx) + fetch(cx1, cy0) * wx;
        let bot = fetch(cx0, cy1) * (1.0 - wx) + fetch(cx1, cy1) * wx;
        top * (1.0 - wy) + bot * wy
    }

    /// Apply pass over a tile. Chrominance is rescaled with the luma ratio
    /// so hue is preserved.
    pub fn apply(&self, input: &ImageBuffer, params: &ClaheParams) -> ImageBuffer {
        let mut out = ImageBuffer::new(input.width, input.height);
        out.data
            .par_chunks_mut((input.width * 3) as usize)
            .enumerate()
            .for_each(|(row, chunk)| {
                let gy = row as i32 + params.global_offset[1];
                for (col, px) in chunk.chunks_exact_mut(3).enumerate() {
                    let gx = col as i32 + params.global_offset[0];
                    let rgb = input.pixel(col as u32, row as u32);
                    let p = perceptual_luma(rgb);
                    let eq = self.equalized(gx, gy, p, params);
                    let final_luma = p + (eq - p) * params.strength;
                    let ratio = final_luma / p.max(1e-6);
                    let scale = ratio.max(0.0).powf(2.2);
                    px[0] = rgb[0] * scale;
                    px[1] = rgb[1] * scale;
                    px[2] = rgb[2] * scale;
                }
            });
        out
    }
}
