//! One-shot density calibration of a freshly loaded scan.
//!
//! Runs on the CPU over a downsample of the demosaiced buffer before the
//! first render. The resulting per-channel log10 floor/ceiling feed the
//! normalization uniform; explicit user bounds always win.

use rayon::prelude::*;

use crate::decoders::ImageBuffer;
use crate::models::{NormalizationConfig, ProcessMode};
use crate::numerics::{log10_safe, LogHistogram};

/// Per-channel log-density range of the scan. Valid for the lifetime of the
/// current file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationBounds {
    pub floor: [f32; 3],
    pub ceiling: [f32; 3],
    /// Set when the measured range collapsed and synthetic bounds were
    /// substituted; surfaced as a warning in the render envelope.
    pub degenerate: bool,
}

/// Percentile endpoints of the usable density range.
pub const FLOOR_PERCENTILE: f32 = 0.5;
pub const CEILING_PERCENTILE: f32 = 99.5;

/// Long-edge cap for the analysis downsample.
pub const ANALYSIS_MAX_EDGE: u32 = 2048;

/// Minimum density span before bounds are considered degenerate.
const MIN_SPAN: f32 = 1e-6;

/// Synthetic bounds covering the full usable density range of film, used
/// when measurement collapses (e.g. a blank frame).
pub const SYNTHETIC_BOUNDS: CalibrationBounds = CalibrationBounds {
    floor: [-3.0, -3.0, -3.0],
    ceiling: [0.0, 0.0, 0.0],
    degenerate: true,
};

impl CalibrationBounds {
    /// Effective bounds for a render: config overrides win per-field.
    pub fn resolve(&self, config: &NormalizationConfig) -> CalibrationBounds {
        CalibrationBounds {
            floor: config.floor.unwrap_or(self.floor),
            ceiling: config.ceiling.unwrap_or(self.ceiling),
            degenerate: self.degenerate,
        }
    }
}

/// Measure per-channel bounds from a seeded stride downsample.
///
/// The seed only moves the sampling phase; two different seeds over the same
/// buffer land within percentile-estimator noise of each other.
pub fn calibrate(buffer: &ImageBuffer, mode: ProcessMode, seed: u32) -> CalibrationBounds {
    let step = (buffer.width.max(buffer.height)).div_ceil(ANALYSIS_MAX_EDGE).max(1);
    let phase_x = if step > 1 { seed % step } else { 0 };
    let phase_y = if step > 1 { (seed / 7) % step } else { 0 };
    let invert = mode.is_positive();

    let rows: Vec<u32> = (0..buffer.height).step_by(step as usize).collect();
    let histograms = rows
        .par_iter()
        .fold(
            || [LogHistogram::new(), LogHistogram::new(), LogHistogram::new()],
            |mut acc, &row| {
                let y = (row + phase_y).min(buffer.height - 1);
                let mut x = phase_x;
                while x < buffer.width {
                    let px = buffer.pixel(x, y);
                    for c in 0..3 {
                        let v = if invert { 1.0 - px[c] } else { px[c] };
                        acc[c].push(v);
                    }
                    x += step;
                }
                acc
            },
        )
        .reduce(
            || [LogHistogram::new(), LogHistogram::new(), LogHistogram::new()],
            |a, b| {
                let [a0, a1, a2] = a;
                let [b0, b1, b2] = b;
                [a0.merge(b0), a1.merge(b1), a2.merge(b2)]
            },
        );

    let mut floor = [0.0f32; 3];
    let mut ceiling = [0.0f32; 3];
    for c in 0..3 {
        floor[c] = histograms[c].percentile(FLOOR_PERCENTILE);
        ceiling[c] = histograms[c].percentile(CEILING_PERCENTILE);
    }

    if (0..3).any(|c| ceiling[c] - floor[c] <= MIN_SPAN) {
        log::warn!("calibration degenerate, substituting synthetic bounds");
        return SYNTHETIC_BOUNDS;
    }

    CalibrationBounds {
        floor,
        ceiling,
        degenerate: false,
    }
}

/// Suggested print settings derived from a calibrated scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuggestedExposure {
    pub cyan: f32,
    pub magenta: f32,
    pub yellow: f32,
    pub density: f32,
    pub grade: f32,
}

/// Normalized density span a paper grade of 2.0 is matched against.
const TARGET_PAPER_RANGE: f32 = 2.0;

/// Sensitometric solver: derive filtration, density and grade from the
/// normalized subject area (center 60% of the frame).
///
/// Filtration aligns the green/blue film base density to red; grade matches
/// the measured dynamic range to the paper range; density anchors the
/// subject midpoint onto the sigmoid pivot.
pub fn solve_exposure(buffer: &ImageBuffer, bounds: &CalibrationBounds) -> SuggestedExposure {
    let x0 = buffer.width / 5;
    let x1 = buffer.width - x0;
    let y0 = buffer.height / 5;
    let y1 = buffer.height - y0;

    let mut channels: [Vec<f32>; 3] = [Vec::new(), Vec::new(), Vec::new()];
    let step = ((x1 - x0).max(y1 - y0) / 512).max(1);
    for y in (y0..y1).step_by(step as usize) {
        for x in (x0..x1).step_by(step as usize) {
            let px = buffer.pixel(x, y);
            for c in 0..3 {
                let span = (bounds.ceiling[c] - bounds.floor[c]).max(1e-6);
                let d = (log10_safe(px[c]) - bounds.floor[c]) / span;
                channels[c].push(d.clamp(0.0, 1.0));
            }
        }
    }

    let pct = |values: &mut Vec<f32>, p: f32| -> f32 {
        if values.is_empty() {
            return 0.0;
        }
        values.sort_by(|a, b| a.total_cmp(b));
        let idx = ((values.len() - 1) as f32 * p / 100.0).round() as usize;
        values[idx]
    };

    let base_r = pct(&mut channels[0], 0.1);
    let base_g = pct(&mut channels[1], 0.1);
    let base_b = pct(&mut channels[2], 0.1);

    let p1 = pct(&mut channels[0], 1.0);
    let p99 = pct(&mut channels[0], 99.0);
    let measured_dr = (p99 - p1).max(0.1);
    let midpoint = (p99 + p1) / 2.0;

    SuggestedExposure {
        cyan: 0.0,
        magenta: base_g - base_r,
        yellow: base_b - base_r,
        density: midpoint.clamp(0.0, 1.0),
        grade: (TARGET_PAPER_RANGE / measured_dr).clamp(0.5, 6.0),
    }
}
