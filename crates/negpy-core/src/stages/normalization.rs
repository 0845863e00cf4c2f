//! Normalization stage: white balance, optional linear inversion, and
//! log-density range mapping.

use rayon::prelude::*;

use super::params::{NormalizationParams, NORM_MODE_POSITIVE, NORM_MODE_SKIP};
use crate::decoders::ImageBuffer;
use crate::numerics::{log10_safe, EPSILON};

/// Map linear radiance to normalized log density, per channel, in place.
///
/// For reversal film the value is linearly inverted before the log. A
/// degenerate range (ceiling - floor <= epsilon) writes zero rather than
/// amplifying noise.
pub fn run(buffer: &mut ImageBuffer, params: &NormalizationParams) {
    if params.mode == NORM_MODE_SKIP {
        return;
    }
    let invert = params.mode == NORM_MODE_POSITIVE;

    buffer
        .data
        .par_chunks_mut((buffer.stride * 3) as usize)
        .for_each(|row| {
            for px in row.chunks_exact_mut(3) {
                for c in 0..3 {
                    let span = params.ceiling[c] - params.floor[c];
                    if span <= EPSILON {
                        px[c] = 0.0;
                        continue;
                    }
                    let mut v = px[c] * params.white_balance[c];
                    if invert {
                        v = 1.0 - v;
                    }
                    let d = log10_safe(v);
                    px[c] = ((d - params.floor[c]) / span).clamp(0.0, 1.0);
                }
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationBounds;
    use crate::models::WorkspaceConfig;
    use crate::stages::params::build_normalization;

    fn bounds(floor: f32, ceiling: f32) -> CalibrationBounds {
        CalibrationBounds {
            floor: [floor; 3],
            ceiling: [ceiling; 3],
            degenerate: false,
        }
    }

    #[test]
    fn test_range_mapping() {
        let config = WorkspaceConfig::default();
        let params = build_normalization(&config, &bounds(-3.0, 0.0), false);

        let mut buffer = ImageBuffer::new(2, 1);
        buffer.set_pixel(0, 0, [0.001, 0.001, 0.001]); // d = -3 -> 0
        buffer.set_pixel(1, 0, [1.0, 1.0, 1.0]); // d = 0 -> 1
        run(&mut buffer, &params);

        assert!(buffer.pixel(0, 0)[0].abs() < 1e-4);
        assert!((buffer.pixel(1, 0)[0] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_midpoint_maps_to_half() {
        let config = WorkspaceConfig::default();
        let params = build_normalization(&config, &bounds(-3.0, 0.0), false);
        let mut buffer = ImageBuffer::new(1, 1);
        let v = 10f32.powf(-1.5);
        buffer.set_pixel(0, 0, [v, v, v]);
        run(&mut buffer, &params);
        assert!((buffer.pixel(0, 0)[1] - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_degenerate_range_writes_zero() {
        let config = WorkspaceConfig::default();
        let params = build_normalization(&config, &bounds(-1.0, -1.0), false);
        let mut buffer = ImageBuffer::new(1, 1);
        buffer.set_pixel(0, 0, [0.5, 0.5, 0.5]);
        run(&mut buffer, &params);
        assert_eq!(buffer.pixel(0, 0), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_skip_mode_is_identity() {
        let config = WorkspaceConfig::default();
        let params = build_normalization(&config, &bounds(-3.0, 0.0), true);
        let mut buffer = ImageBuffer::new(1, 1);
        buffer.set_pixel(0, 0, [0.25, 0.5, 0.75]);
        run(&mut buffer, &params);
        assert_eq!(buffer.pixel(0, 0), [0.25, 0.5, 0.75]);
    }

    #[test]
    fn test_e6_inverts_linearly_first() {
        let mut config = WorkspaceConfig::default();
        config.process_mode = crate::models::ProcessMode::E6Positive;
        let params = build_normalization(&config, &bounds(-3.0, 0.0), false);
        let mut buffer = ImageBuffer::new(1, 1);
        buffer.set_pixel(0, 0, [0.9, 0.9, 0.9]);
        run(&mut buffer, &params);
        // 1 - 0.9 = 0.1 -> d = -1 -> (d + 3) / 3 = 0.6667
        assert!((buffer.pixel(0, 0)[0] - 2.0 / 3.0).abs() < 1e-4);
    }

    #[test]
    fn test_white_balance_applies_before_log() {
        let mut config = WorkspaceConfig::default();
        config.exposure.white_balance = [2.0, 1.0, 1.0];
        let params = build_normalization(&config, &bounds(-3.0, 0.0), false);
        let mut buffer = ImageBuffer::new(1, 1);
        buffer.set_pixel(0, 0, [0.05, 0.1, 0.1]);
        run(&mut buffer, &params);
        let px = buffer.pixel(0, 0);
        // 0.05 * 2.0 == 0.1, so R should equal G.
        assert!((px[0] - px[1]).abs() < 1e-5);
    }

    #[test]
    fn test_output_always_finite_and_clamped() {
        let config = WorkspaceConfig::default();
        let params = build_normalization(&config, &bounds(-3.0, 0.0), false);
        let mut buffer = ImageBuffer::new(2, 1);
        buffer.set_pixel(0, 0, [0.0, 1e9, 1.0]);
        buffer.set_pixel(1, 0, [1e-12, 0.5, 0.9]);
        run(&mut buffer, &params);
        for &v in &buffer.data {
            assert!(v.is_finite());
            assert!((0.0..=1.0).contains(&v));
        }
    }
}
