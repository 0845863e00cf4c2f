//! CPU reference execution of the stage pipeline.
//!
//! This path runs when the GPU backend is disabled or unavailable, and it is
//! the ground truth the GPU kernels are validated against. Tiled and untiled
//! renders share one code path: the untiled render is a single-tile plan.

use crate::calibration::CalibrationBounds;
use crate::decoders::ImageBuffer;
use crate::error::RenderError;
use crate::metrics::{compute_histogram, HistogramResult};
use crate::models::WorkspaceConfig;
use crate::stages::clahe::ClaheContext;
use crate::stages::params::{
    build_clahe, build_exposure, build_lab, build_layout, build_normalization, build_retouch,
    build_spots, build_toning, build_transform, FrameGeometry,
};
use crate::stages::{exposure, lab_tools, layout, normalization, retouch, toning, transform};

use super::tiling::TilePlan;

/// Completed CPU render: the final canvas plus the post-toning histogram.
pub struct CpuRender {
    pub canvas: ImageBuffer,
    pub histogram: HistogramResult,
}

/// Extract the crop window of a buffer.
pub fn crop_of(buffer: &ImageBuffer, rect: &crate::stages::params::PixelRect) -> ImageBuffer {
    let mut out = ImageBuffer::new(rect.width, rect.height);
    for y in 0..rect.height {
        for x in 0..rect.width {
            let sx = (rect.x + x).min(buffer.width - 1);
            let sy = (rect.y + y).min(buffer.height - 1);
            out.set_pixel(x, y, buffer.pixel(sx, sy));
        }
    }
    out
}

/// Run Normalization through Lab for every tile of the plan, assembling the
/// halo-trimmed interiors into a full-frame buffer. Returns None when
/// superseded.
#[allow(clippy::too_many_arguments)]
fn run_to_lab(
    source: &ImageBuffer,
    config: &WorkspaceConfig,
    bounds: &CalibrationBounds,
    frame: &FrameGeometry,
    plan: &TilePlan,
    skip_normalization: bool,
    cancel: &dyn Fn() -> bool,
) -> Result<Option<ImageBuffer>, RenderError> {
    let mut normalized = source.clone();
    normalization::run(
        &mut normalized,
        &build_normalization(config, bounds, skip_normalization),
    );
    if cancel() {
        return Ok(None);
    }

    let spots = build_spots(&config.retouch.spots, frame);
    let exposure_params = build_exposure(config);
    let lab_params = build_lab(config);

    let mut lab_full = ImageBuffer::new(frame.full_width, frame.full_height);
    for tile in &plan.tiles {
        if cancel() {
            return Ok(None);
        }
        let offset = [tile.padded_x, tile.padded_y];

        let transform_params = build_transform(&config.geometry, frame, offset);
        let transformed = transform::run(
            &normalized,
            &transform_params,
            tile.padded_width,
            tile.padded_height,
        );

        let needs_retouch = config.retouch.dust_enabled
            || !retouch::spots_overlapping(&spots, offset, tile.padded_width, tile.padded_height)
                .is_empty();
        let retouched = if needs_retouch {
            let retouch_params = build_retouch(config, frame, offset, spots.len());
            retouch::run(&transformed, &retouch_params, &spots)
        } else {
            transformed
        };

        let exposed = exposure::run(&retouched, &exposure_params);
        let lab_out = lab_tools::run(&exposed, &lab_params);

        let interior = tile.interior_origin();
        for y in 0..tile.height {
            for x in 0..tile.width {
                lab_full.set_pixel(
                    tile.x + x,
                    tile.y + y,
                    lab_out.pixel(interior[0] as u32 + x, interior[1] as u32 + y),
                );
            }
        }
    }
    Ok(Some(lab_full))
}

/// Full pipeline: stages in order, CLAHE against the shared per-render
/// context, histogram over the cropped print, then layout.
pub fn render(
    source: &ImageBuffer,
    config: &WorkspaceConfig,
    bounds: &CalibrationBounds,
    frame: &FrameGeometry,
    plan: &TilePlan,
    skip_normalization: bool,
    cancel: &dyn Fn() -> bool,
) -> Result<Option<CpuRender>, RenderError> {
    let lab_full = match run_to_lab(
        source,
        config,
        bounds,
        frame,
        plan,
        skip_normalization,
        cancel,
    )? {
        Some(buffer) => buffer,
        None => return Ok(None),
    };

    let toned_input = if config.lab.clahe_strength > 0.0 {
        let params = build_clahe(
            config,
            frame,
            [0, 0],
            [0, 0],
            frame.full_width,
            frame.full_height,
        );
        let mut ctx = ClaheContext::new();
        ctx.accumulate(&lab_full, &params);
        ctx.build_cdf(params.clip_limit);
        if cancel() {
            return Ok(None);
        }
        ctx.apply(&lab_full, &params)
    } else {
        lab_full
    };

    if cancel() {
        return Ok(None);
    }
    let toned = toning::run(&toned_input, &build_toning(config));

    let print = crop_of(&toned, &frame.crop);
    let histogram = compute_histogram(&print);

    let canvas = layout::run(&toned, &build_layout(config, frame));
    Ok(Some(CpuRender { canvas, histogram }))
}
