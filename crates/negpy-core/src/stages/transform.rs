//! Transform stage: 90-degree rotation, flips, and fine affine rotation.
//!
//! The output is axis-aligned content at the canonical `full_dims`; during
//! tiled export each dispatch writes a sub-rectangle addressed by its
//! `global_offset`. Sampling is manual bilinear with clamped-edge reads.

use rayon::prelude::*;

use super::params::TransformParams;
use crate::decoders::ImageBuffer;
use crate::numerics::sample_bilinear;

/// Map an output pixel (full transform coordinates) back to continuous
/// source coordinates.
#[inline]
pub fn source_position(params: &TransformParams, gx: u32, gy: u32) -> (f32, f32) {
    let mut x = gx as f32;
    let mut y = gy as f32;

    // Undo flips (they apply after rotation).
    if params.flip_horizontal != 0 {
        x = (params.full_width - 1) as f32 - x;
    }
    if params.flip_vertical != 0 {
        y = (params.full_height - 1) as f32 - y;
    }

    // Undo the counter-clockwise quarter turns.
    let w = params.src_width as f32;
    let h = params.src_height as f32;
    let (mut sx, mut sy) = match params.quarter_turns {
        1 => (w - 1.0 - y, x),
        2 => (w - 1.0 - x, h - 1.0 - y),
        3 => (y, h - 1.0 - x),
        _ => (x, y),
    };

    // Undo the fine rotation about the source center.
    if params.fine_rotation != 0.0 {
        let cx = (w - 1.0) / 2.0;
        let cy = (h - 1.0) / 2.0;
        let (sin, cos) = params.fine_rotation.sin_cos();
        let dx = sx - cx;
        let dy = sy - cy;
        sx = cx + cos * dx - sin * dy;
        sy = cy + sin * dx + cos * dy;
    }

    (sx, sy)
}

/// Produce a tile of the transform output. `out_width`/`out_height` are the
/// tile dims; the tile origin within the full output is
/// `params.global_offset`.
pub fn run(
    src: &ImageBuffer,
    params: &TransformParams,
    out_width: u32,
    out_height: u32,
) -> ImageBuffer {
    let mut out = ImageBuffer::new(out_width, out_height);
    let stride = src.stride;

    out.data
        .par_chunks_mut((out_width * 3) as usize)
        .enumerate()
        .for_each(|(row, chunk)| {
            let gy = row as i32 + params.global_offset[1];
            for (col, px) in chunk.chunks_exact_mut(3).enumerate() {
                let gx = col as i32 + params.global_offset[0];
                let (sx, sy) = source_position(
                    params,
                    gx.clamp(0, params.full_width as i32 - 1) as u32,
                    gy.clamp(0, params.full_height as i32 - 1) as u32,
                );
                let rgb =
                    sample_bilinear(&src.data, src.width, src.height, stride, sx, sy);
                px.copy_from_slice(&rgb);
            }
        });

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GeometryConfig;
    use crate::stages::params::{build_transform, FrameGeometry, PixelRect};

    fn frame_for(geometry: &GeometryConfig, w: u32, h: u32) -> FrameGeometry {
        let (fw, fh) = FrameGeometry::transformed_dims(geometry, w, h);
        FrameGeometry {
            src_width: w,
            src_height: h,
            full_width: fw,
            full_height: fh,
            crop: PixelRect::full(fw, fh),
            canvas_width: fw,
            canvas_height: fh,
            image_origin: [0, 0],
        }
    }

    fn test_image(w: u32, h: u32) -> ImageBuffer {
        let mut buffer = ImageBuffer::new(w, h);
        for y in 0..h {
            for x in 0..w {
                let v = (y * w + x) as f32 / (w * h) as f32;
                buffer.set_pixel(x, y, [v, v * 0.5, 1.0 - v]);
            }
        }
        buffer
    }

    fn apply(src: &ImageBuffer, geometry: &GeometryConfig) -> ImageBuffer {
        let frame = frame_for(geometry, src.width, src.height);
        let params = build_transform(geometry, &frame, [0, 0]);
        run(src, &params, frame.full_width, frame.full_height)
    }

    fn max_diff(a: &ImageBuffer, b: &ImageBuffer) -> f32 {
        a.data
            .iter()
            .zip(b.data.iter())
            .map(|(x, y)| (x - y).abs())
            .fold(0.0, f32::max)
    }

    #[test]
    fn test_identity() {
        let src = test_image(16, 12);
        let out = apply(&src, &GeometryConfig::default());
        assert!(max_diff(&src, &out) < 1e-6);
    }

    #[test]
    fn test_rotate_four_times_is_identity() {
        let src = test_image(16, 12);
        let mut geometry = GeometryConfig::default();
        geometry.rotation = 90;

        let mut current = src.clone();
        for _ in 0..4 {
            current = apply(&current, &geometry);
        }
        assert_eq!(current.width, src.width);
        assert!(max_diff(&src, &current) < 1e-5);
    }

    #[test]
    fn test_rotation_swaps_dims() {
        let src = test_image(16, 12);
        let mut geometry = GeometryConfig::default();
        geometry.rotation = 90;
        let out = apply(&src, &geometry);
        assert_eq!((out.width, out.height), (12, 16));
    }

    #[test]
    fn test_flip_twice_is_identity() {
        let src = test_image(10, 14);
        let mut geometry = GeometryConfig::default();
        geometry.flip_horizontal = true;
        let once = apply(&src, &geometry);
        let twice = apply(&once, &geometry);
        assert!(max_diff(&src, &twice) < 1e-6);
        assert!(max_diff(&src, &once) > 1e-3);
    }

    #[test]
    fn test_tiled_matches_untiled() {
        let src = test_image(33, 21);
        let mut geometry = GeometryConfig::default();
        geometry.rotation = 90;
        geometry.fine_rotation = 1.5;

        let frame = frame_for(&geometry, src.width, src.height);
        let full_params = build_transform(&geometry, &frame, [0, 0]);
        let full = run(&src, &full_params, frame.full_width, frame.full_height);

        // Reassemble from 8x8 tiles.
        let mut assembled = ImageBuffer::new(frame.full_width, frame.full_height);
        let tile = 8u32;
        for ty in (0..frame.full_height).step_by(tile as usize) {
            for tx in (0..frame.full_width).step_by(tile as usize) {
                let tw = tile.min(frame.full_width - tx);
                let th = tile.min(frame.full_height - ty);
                let params = build_transform(&geometry, &frame, [tx as i32, ty as i32]);
                let piece = run(&src, &params, tw, th);
                for y in 0..th {
                    for x in 0..tw {
                        assembled.set_pixel(tx + x, ty + y, piece.pixel(x, y));
                    }
                }
            }
        }
        assert!(max_diff(&full, &assembled) < 1e-6);
    }

    #[test]
    fn test_out_of_bounds_reads_clamp() {
        let src = test_image(8, 8);
        let mut geometry = GeometryConfig::default();
        geometry.fine_rotation = 30.0;
        let out = apply(&src, &geometry);
        for &v in &out.data {
            assert!(v.is_finite());
        }
    }
}
