//! Retouch stage: automatic dust detection and manual spot healing.
//!
//! Both operations address pixels by their full-image coordinate, so a tile
//! rendered with a `global_offset` heals exactly like the untiled frame.
//! Neighborhood reads clamp to the dispatched region; the export halo keeps
//! those clamps out of the visible output.

use rayon::prelude::*;

use super::params::{RetouchParams, SpotRecord};
use crate::decoders::ImageBuffer;
use crate::numerics::{hash2, hash3, median_in_place, rec709_luma, smoothstep};

/// Dust-classification gates.
const STD_EXCLUSION: f32 = 0.2;
const BRIGHT_GATE: f32 = 0.4;
/// Luminance key for manual healing: start fading in at 0.04, full by 0.12.
const HEAL_KEY_LO: f32 = 0.04;
const HEAL_KEY_HI: f32 = 0.12;
/// Angular jitter applied to the three ring samples, radians.
const SPOT_JITTER: f32 = 0.6;

#[inline]
fn luma_at(input: &ImageBuffer, x: i32, y: i32) -> f32 {
    let xc = x.clamp(0, input.width as i32 - 1) as u32;
    let yc = y.clamp(0, input.height as i32 - 1) as u32;
    let px = input.pixel(xc, yc);
    rec709_luma(px[0], px[1], px[2])
}

#[inline]
fn pixel_at(input: &ImageBuffer, x: i32, y: i32) -> [f32; 3] {
    let xc = x.clamp(0, input.width as i32 - 1) as u32;
    let yc = y.clamp(0, input.height as i32 - 1) as u32;
    input.pixel(xc, yc)
}

/// Neighborhood radius for the flatness statistics.
#[inline]
pub fn stat_radius(dust_size: f32, scale_factor: f32) -> i32 {
    ((3.0 * dust_size * scale_factor).round() as i32).clamp(1, 12)
}

/// Median kernel radius chosen by dust size: 3x3 under 1.5, 5x5 under 2.5,
/// 7x7 beyond.
#[inline]
pub fn median_radius(dust_size: f32) -> i32 {
    if dust_size < 1.5 {
        1
    } else if dust_size < 2.5 {
        2
    } else {
        3
    }
}

/// Per-channel median of the window around (x, y).
fn median_reference(input: &ImageBuffer, x: i32, y: i32, radius: i32) -> [f32; 3] {
    let mut scratch = [[0.0f32; 49]; 3];
    let side = (2 * radius + 1) as usize;
    let count = side * side;
    let mut i = 0;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let px = pixel_at(input, x + dx, y + dy);
            for c in 0..3 {
                scratch[c][i] = px[c];
            }
            i += 1;
        }
    }
    [
        median_in_place(&mut scratch[0][..count]),
        median_in_place(&mut scratch[1][..count]),
        median_in_place(&mut scratch[2][..count]),
    ]
}

/// Mean and standard deviation of luminance over the stat window.
fn local_stats(input: &ImageBuffer, x: i32, y: i32, radius: i32) -> (f32, f32) {
    let mut sum = 0.0f32;
    let mut sum2 = 0.0f32;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let l = luma_at(input, x + dx, y + dy);
            sum += l;
            sum2 += l * l;
        }
    }
    let n = ((2 * radius + 1) * (2 * radius + 1)) as f32;
    let mean = sum / n;
    let var = (sum2 / n - mean * mean).max(0.0);
    (mean, var.sqrt())
}

/// Adaptive dust threshold from local flatness and brightness.
#[inline]
pub fn adaptive_threshold(base: f32, mean: f32, std: f32) -> f32 {
    let flatness = (1.0 - std / 0.08).clamp(0.0, 1.0);
    let highlight_sens = ((mean - 0.4) * 1.5).clamp(0.0, 1.0);
    base * (1.0 - 0.98 * flatness.sqrt()) * (1.0 - 0.5 * highlight_sens)
        + (1.0 - flatness) * 0.05
}

/// 3x3 per-channel local minimum, used to reject residual dust in the ring
/// samples of manual healing.
fn local_min(input: &ImageBuffer, x: i32, y: i32) -> [f32; 3] {
    let mut out = [f32::INFINITY; 3];
    for dy in -1..=1 {
        for dx in -1..=1 {
            let px = pixel_at(input, x + dx, y + dy);
            for c in 0..3 {
                out[c] = out[c].min(px[c]);
            }
        }
    }
    out
}

fn retouch_pixel(
    input: &ImageBuffer,
    params: &RetouchParams,
    spots: &[SpotRecord],
    lx: u32,
    ly: u32,
) -> [f32; 3] {
    let gx = lx as i32 + params.global_offset[0];
    let gy = ly as i32 + params.global_offset[1];
    let gxu = gx.max(0) as u32;
    let gyu = gy.max(0) as u32;

    let mut rgb = input.pixel(lx, ly);

    if params.dust_enabled != 0 {
        let radius = stat_radius(params.dust_size, params.scale_factor);
        let (mean, std) = local_stats(input, lx as i32, ly as i32, radius);
        let luma = rec709_luma(rgb[0], rgb[1], rgb[2]);

        // Busy texture and shadows are left alone; dust on film scans prints
        // as bright specks.
        if std <= STD_EXCLUSION && luma > BRIGHT_GATE {
            let reference =
                median_reference(input, lx as i32, ly as i32, median_radius(params.dust_size));
            let max_diff = (0..3).fold(0.0f32, |m, c| m.max(rgb[c] - reference[c]));
            let threshold = adaptive_threshold(params.dust_threshold, mean, std);

            if max_diff > threshold {
                let t = smoothstep(threshold, 1.2 * threshold, max_diff);
                let amplitude = 3.0 * mean * (1.0 - mean) * 1e-3;
                let grain = (hash2(gxu, gyu) - 0.5) * amplitude;
                for c in 0..3 {
                    rgb[c] += (reference[c] + grain - rgb[c]) * t;
                }
            }
        }
    }

    for (si, spot) in spots.iter().enumerate() {
        let dx = gx as f32 - spot.center[0];
        let dy = gy as f32 - spot.center[1];
        let dist = (dx * dx + dy * dy).sqrt();
        if dist >= spot.radius {
            continue;
        }

        // Three jittered ring samples along the center-to-pixel direction,
        // each run through a 3x3 minimum to reject residual dust.
        let angle = dy.atan2(dx);
        let mut heal = [0.0f32; 3];
        for i in 0..3u32 {
            let jitter = (hash3(gxu, gyu, (si as u32) * 4 + i) - 0.5) * SPOT_JITTER;
            let a = angle + jitter;
            let sx = spot.center[0] + spot.radius * a.cos() - params.global_offset[0] as f32;
            let sy = spot.center[1] + spot.radius * a.sin() - params.global_offset[1] as f32;
            // floor(x + 0.5) keeps CPU and WGSL rounding identical.
            let sample = local_min(input, (sx + 0.5).floor() as i32, (sy + 0.5).floor() as i32);
            for c in 0..3 {
                heal[c] += sample[c];
            }
        }
        for c in &mut heal {
            *c /= 3.0;
        }

        let pixel_luma = rec709_luma(rgb[0], rgb[1], rgb[2]);
        let heal_luma = rec709_luma(heal[0], heal[1], heal[2]);
        let key = smoothstep(HEAL_KEY_LO, HEAL_KEY_HI, pixel_luma - heal_luma);
        let feather = 1.0 - smoothstep(0.8 * spot.radius, spot.radius, dist);
        let m = key * feather;
        for c in 0..3 {
            rgb[c] += (heal[c] - rgb[c]) * m;
        }
    }

    rgb
}

/// Run retouch over a tile. With auto dust disabled and no overlapping
/// spots this is bit-exact identity (the engine may elide it entirely).
pub fn run(input: &ImageBuffer, params: &RetouchParams, spots: &[SpotRecord]) -> ImageBuffer {
    if params.dust_enabled == 0 && spots.is_empty() {
        return input.clone();
    }

    let mut out = ImageBuffer::new(input.width, input.height);
    out.data
        .par_chunks_mut((input.width * 3) as usize)
        .enumerate()
        .for_each(|(row, chunk)| {
            for (col, px) in chunk.chunks_exact_mut(3).enumerate() {
                let rgb = retouch_pixel(input, params, spots, col as u32, row as u32);
                px.copy_from_slice(&rgb);
            }
        });
    out
}

/// Spots whose influence circle overlaps a tile, pre-filtered by the engine
/// so tiles without work skip the storage buffer entirely.
pub fn spots_overlapping(
    spots: &[SpotRecord],
    offset: [i32; 2],
    width: u32,
    height: u32,
) -> Vec<SpotRecord> {
    spots
        .iter()
        .filter(|s| {
            let min_x = offset[0] as f32 - s.radius;
            let max_x = (offset[0] + width as i32) as f32 + s.radius;
            let min_y = offset[1] as f32 - s.radius;
            let max_y = (offset[1] + height as i32) as f32 + s.radius;
            s.center[0] >= min_x
                && s.center[0] <= max_x
                && s.center[1] >= min_y
                && s.center[1] <= max_y
        })
        .copied()
        .collect()
}
