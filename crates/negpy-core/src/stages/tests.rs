//! Cross-stage properties on the CPU kernels.

use super::params::*;
use super::*;
use crate::calibration::CalibrationBounds;
use crate::decoders::ImageBuffer;
use crate::models::WorkspaceConfig;

fn frame(w: u32, h: u32) -> FrameGeometry {
    FrameGeometry {
        src_width: w,
        src_height: h,
        full_width: w,
        full_height: h,
        crop: PixelRect::full(w, h),
        canvas_width: w,
        canvas_height: h,
        image_origin: [0, 0],
    }
}

fn bounds() -> CalibrationBounds {
    CalibrationBounds {
        floor: [-3.0; 3],
        ceiling: [0.0; 3],
        degenerate: false,
    }
}

/// Run the full stage chain (minus CLAHE, exercised separately) over a
/// buffer.
fn run_chain(source: &ImageBuffer, config: &WorkspaceConfig) -> ImageBuffer {
    let f = frame(source.width, source.height);
    let mut normalized = source.clone();
    normalization::run(&mut normalized, &build_normalization(config, &bounds(), false));

    let transformed = transform::run(
        &normalized,
        &build_transform(&config.geometry, &f, [0, 0]),
        f.full_width,
        f.full_height,
    );
    let spots = build_spots(&config.retouch.spots, &f);
    let retouched = retouch::run(
        &transformed,
        &build_retouch(config, &f, [0, 0], spots.len()),
        &spots,
    );
    let exposed = exposure::run(&retouched, &build_exposure(config));
    let lab_out = lab_tools::run(&exposed, &build_lab(config));
    toning::run(&lab_out, &build_toning(config))
}

#[test]
fn test_gray_input_stays_gray() {
    // Neutrality: zero CMY shifts and an achromatic input keep every stage
    // channel-symmetric.
    let mut source = ImageBuffer::new(24, 24);
    for (i, px) in source.data.chunks_exact_mut(3).enumerate() {
        let v = 0.001 + (i as f32 / (24.0 * 24.0)) * 0.9;
        px.fill(v);
    }

    let mut config = WorkspaceConfig::default();
    config.exposure.grade = 2.8;
    config.exposure.toe = 0.3;
    config.exposure.shoulder = 0.5;
    config.lab.color_separation = 0.6;

    let out = run_chain(&source, &config);
    for px in out.data.chunks_exact(3) {
        assert!((px[0] - px[1]).abs() < 1e-5, "{:?}", px);
        assert!((px[1] - px[2]).abs() < 1e-5, "{:?}", px);
    }
}

#[test]
fn test_output_always_finite_in_unit_range() {
    // Hostile input: zeros, huge values, and a config that leans on every
    // stage. The toned output must still be finite and clipped.
    let mut source = ImageBuffer::new(32, 32);
    for (i, v) in source.data.iter_mut().enumerate() {
        *v = match i % 5 {
            0 => 0.0,
            1 => 1e9,
            2 => 1e-12,
            3 => 0.5,
            _ => 1.0,
        };
    }

    let mut config = WorkspaceConfig::default();
    config.exposure.grade = 6.0;
    config.exposure.cyan = 0.4;
    config.exposure.magenta = -0.4;
    config.retouch.dust_enabled = true;
    config.lab.color_separation = 1.0;
    config.lab.sharpen_amount = 2.0;
    config.toning.bw = true;
    config.toning.selenium = 1.0;
    config.toning.sepia = 1.0;
    config.toning.dmax_gamma = 1.3;
    config.toning.final_gamma = 2.2;

    let out = run_chain(&source, &config);
    for &v in &out.data {
        assert!(v.is_finite());
        assert!((0.0..=1.0).contains(&v), "out of range: {}", v);
    }
}

#[test]
fn test_retouch_identity_through_chain() {
    // With auto dust off and no spots, inserting retouch changes nothing.
    let mut source = ImageBuffer::new(16, 16);
    for (i, v) in source.data.iter_mut().enumerate() {
        *v = 0.01 + ((i * 29) % 97) as f32 / 100.0;
    }
    let config = WorkspaceConfig::default();
    let f = frame(16, 16);

    let mut normalized = source.clone();
    normalization::run(&mut normalized, &build_normalization(&config, &bounds(), false));
    let spots = build_spots(&[], &f);
    let retouched = retouch::run(
        &normalized,
        &build_retouch(&config, &f, [0, 0], 0),
        &spots,
    );
    assert_eq!(normalized.data, retouched.data);
}

#[test]
fn test_stage_uniform_offsets_never_overlap() {
    let mut seen = std::collections::HashSet::new();
    for stage in STAGE_ORDER {
        let offset = stage.uniform_offset();
        assert_eq!(offset % UNIFORM_SLICE_BYTES, 0);
        assert!(seen.insert(offset), "duplicate slice at {}", offset);
    }
    assert_eq!(seen.len(), 10);
}

#[test]
fn test_stage_labels_unique() {
    let mut labels = std::collections::HashSet::new();
    for stage in STAGE_ORDER {
        assert!(labels.insert(stage.label()));
    }
}
