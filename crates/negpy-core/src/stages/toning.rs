//! Toning stage: paper base, chemical toners, saturation, display gamma.
//!
//! Order of operations: paper tint, D-max gamma, optional B&W collapse,
//! chemical toning (selenium then sepia; only when B&W), saturation, final
//! gamma. The output is clamped to [0, 1]; this is the last value-producing
//! stage before layout.

use rayon::prelude::*;

use super::params::ToningParams;
use crate::decoders::ImageBuffer;
use crate::numerics::rec709_luma;

/// Silver selenide shifts shadows cool and slightly magenta.
pub const SELENIUM_TONE: [f32; 3] = [0.85, 0.75, 0.85];
/// Silver sulfide warms mids and highlights.
pub const SEPIA_TONE: [f32; 3] = [1.10, 0.99, 0.83];

#[inline]
pub fn tone_pixel(rgb: [f32; 3], params: &ToningParams) -> [f32; 3] {
    let mut v = [
        rgb[0] * params.tint[0],
        rgb[1] * params.tint[1],
        rgb[2] * params.tint[2],
    ];

    if params.dmax_gamma != 1.0 {
        for c in &mut v {
            *c = c.max(0.0).powf(params.dmax_gamma);
        }
    }

    if params.bw != 0 {
        let l = rec709_luma(v[0], v[1], v[2]);
        v = [l, l, l];

        // Chemical toners react with the silver image; they are gated on
        // B&W because a dye image carries no silver to tone.
        let luma = l.clamp(0.0, 1.0);
        if params.selenium > 0.0 {
            let mask = params.selenium * (1.0 - luma) * (1.0 - luma);
            for c in 0..3 {
                v[c] = (1.0 - mask) * v[c] + mask * v[c] * SELENIUM_TONE[c];
            }
        }
        if params.sepia > 0.0 {
            let l2 = rec709_luma(v[0], v[1], v[2]).clamp(0.0, 1.0);
            let mask = params.sepia * (-(l2 - 0.6) * (l2 - 0.6) / 0.08).exp();
            for c in 0..3 {
                v[c] = (1.0 - mask) * v[c] + mask * v[c] * SEPIA_TONE[c];
            }
        }
    }

    if params.saturation != 1.0 {
        let l = rec709_luma(v[0], v[1], v[2]);
        for c in &mut v {
            *c = l + (*c - l) * params.saturation;
        }
    }

    if params.final_gamma != 1.0 {
        for c in &mut v {
            *c = c.clamp(0.0, 1.0).powf(1.0 / params.final_gamma);
        }
    }

    [
        v[0].clamp(0.0, 1.0),
        v[1].clamp(0.0, 1.0),
        v[2].clamp(0.0, 1.0),
    ]
}

pub fn run(input: &ImageBuffer, params: &ToningParams) -> ImageBuffer {
    let mut out = ImageBuffer::new(input.width, input.height);
    out.data
        .par_chunks_mut((input.width * 3) as usize)
        .zip(input.data.par_chunks((input.stride * 3) as usize))
        .for_each(|(dst, src)| {
            for (o, i) in dst.chunks_exact_mut(3).zip(src.chunks_exact(3)) {
                let rgb = tone_pixel([i[0], i[1], i[2]], params);
                o.copy_from_slice(&rgb);
            }
        });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WorkspaceConfig;
    use crate::stages::params::build_toning;

    fn tone_one(config: &WorkspaceConfig, rgb: [f32; 3]) -> [f32; 3] {
        tone_pixel(rgb, &build_toning(config))
    }

    #[test]
    fn test_identity_at_defaults() {
        let config = WorkspaceConfig::default();
        let out = tone_one(&config, [0.3, 0.5, 0.7]);
        assert_eq!(out, [0.3, 0.5, 0.7]);
    }

    #[test]
    fn test_paper_tint_multiplies() {
        let mut config = WorkspaceConfig::default();
        config.toning.paper_tint = [1.0, 0.97, 0.92];
        let out = tone_one(&config, [0.5, 0.5, 0.5]);
        assert!((out[0] - 0.5).abs() < 1e-6);
        assert!((out[1] - 0.485).abs() < 1e-6);
        assert!((out[2] - 0.46).abs() < 1e-6);
    }

    #[test]
    fn test_dmax_gamma_deepens_shadows() {
        let mut config = WorkspaceConfig::default();
        config.toning.dmax_gamma = 1.15;
        let out = tone_one(&config, [0.2, 0.2, 0.2]);
        assert!(out[0] < 0.2);
        // Whites stay pinned.
        let white = tone_one(&config, [1.0, 1.0, 1.0]);
        assert!((white[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_bw_broadcasts_luma() {
        let mut config = WorkspaceConfig::default();
        config.toning.bw = true;
        let out = tone_one(&config, [0.8, 0.4, 0.1]);
        assert_eq!(out[0], out[1]);
        assert_eq!(out[1], out[2]);
        let expected = rec709_luma(0.8, 0.4, 0.1);
        assert!((out[0] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_selenium_shadow_key() {
        // Deep shadow (0.1) with full selenium: output approaches the
        // selenium tone direction. With mask m = (1 - 0.1)^2 = 0.81, each
        // channel becomes 0.1 * ((1 - m) + m * tone_c).
        let mut config = WorkspaceConfig::default();
        config.toning.bw = true;
        config.toning.selenium = 1.0;
        let out = tone_one(&config, [0.1, 0.1, 0.1]);

        let m = 0.81f32;
        let expected: Vec<f32> = SELENIUM_TONE
            .iter()
            .map(|t| 0.1 * ((1.0 - m) + m * t))
            .collect();
        for c in 0..3 {
            assert!((out[c] - expected[c]).abs() < 1e-5, "channel {}", c);
        }
        // Channel ratios track the selenium tone ratios within 2%.
        let expected_rg = expected[0] / expected[1];
        assert!((out[0] / out[1] - expected_rg).abs() / expected_rg < 0.02);
        assert_eq!(out[0], out[2]);
        // And the cast is pulled well away from neutral, toward the tone.
        assert!(out[0] > out[1]);
    }

    #[test]
    fn test_selenium_leaves_highlights() {
        let mut config = WorkspaceConfig::default();
        config.toning.bw = true;
        config.toning.selenium = 1.0;
        let out = tone_one(&config, [0.95, 0.95, 0.95]);
        // Mask is (1 - 0.95)^2 = 0.0025; essentially untouched.
        assert!((out[0] - 0.95).abs() < 0.002);
    }

    #[test]
    fn test_sepia_peaks_at_mids() {
        let mut config = WorkspaceConfig::default();
        config.toning.bw = true;
        config.toning.sepia = 1.0;
        let mid = tone_one(&config, [0.6, 0.6, 0.6]);
        let shadow = tone_one(&config, [0.05, 0.05, 0.05]);
        // Warm cast at the mask peak: R up, B down.
        assert!(mid[0] > mid[2] + 0.05);
        // Deep shadows nearly neutral.
        assert!((shadow[0] - shadow[2]).abs() < 0.01);
    }

    #[test]
    fn test_toners_disabled_in_color_mode() {
        let mut config = WorkspaceConfig::default();
        config.toning.selenium = 1.0;
        config.toning.sepia = 1.0;
        let out = tone_one(&config, [0.1, 0.1, 0.1]);
        assert_eq!(out, [0.1, 0.1, 0.1]);
    }

    #[test]
    fn test_saturation_zero_is_grayscale() {
        let mut config = WorkspaceConfig::default();
        config.toning.saturation = 0.0;
        let out = tone_one(&config, [0.8, 0.3, 0.2]);
        assert!((out[0] - out[1]).abs() < 1e-6);
        assert!((out[1] - out[2]).abs() < 1e-6);
    }

    #[test]
    fn test_final_gamma_brightens() {
        let mut config = WorkspaceConfig::default();
        config.toning.final_gamma = 2.2;
        let out = tone_one(&config, [0.5, 0.5, 0.5]);
        assert!((out[0] - 0.5f32.powf(1.0 / 2.2)).abs() < 1e-6);
    }

    #[test]
    fn test_output_clamped() {
        let mut config = WorkspaceConfig::default();
        config.toning.saturation = 4.0;
        let out = tone_one(&config, [1.4, -0.2, 0.5]);
        for &v in &out {
            assert!((0.0..=1.0).contains(&v));
            assert!(v.is_finite());
        }
    }
}
