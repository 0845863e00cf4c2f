//! Layout stage: crop placement and paper border.
//!
//! Reads the toned texture, extracts the crop window, and surrounds it with
//! the border color when a border is configured. Aspect enforcement already
//! happened when the crop rectangle was chosen.

use rayon::prelude::*;

use super::params::LayoutParams;
use crate::decoders::ImageBuffer;
use crate::models::BorderSpec;

/// Canvas dims and image placement for a crop plus optional border.
pub fn canvas_for(crop_w: u32, crop_h: u32, border: Option<&BorderSpec>) -> (u32, u32, [i32; 2]) {
    match border {
        Some(spec) => {
            let pad = ((spec.size * crop_w.max(crop_h) as f32).round() as u32).min(4096);
            (
                crop_w + 2 * pad,
                crop_h + 2 * pad,
                [pad as i32, pad as i32],
            )
        }
        None => (crop_w, crop_h, [0, 0]),
    }
}

pub fn run(toned: &ImageBuffer, params: &LayoutParams) -> ImageBuffer {
    let mut out = ImageBuffer::new(params.canvas_width, params.canvas_height);
    out.data
        .par_chunks_mut((params.canvas_width * 3) as usize)
        .enumerate()
        .for_each(|(row, chunk)| {
            let y = row as i32;
            for (col, px) in chunk.chunks_exact_mut(3).enumerate() {
                let x = col as i32;
                let ix = x - params.image_origin[0];
                let iy = y - params.image_origin[1];
                let inside = ix >= 0
                    && iy >= 0
                    && (ix as u32) < params.image_width
                    && (iy as u32) < params.image_height;
                if inside {
                    let sx = (params.crop_origin[0] + ix).clamp(0, toned.width as i32 - 1);
                    let sy = (params.crop_origin[1] + iy).clamp(0, toned.height as i32 - 1);
                    let rgb = toned.pixel(sx as u32, sy as u32);
                    px.copy_from_slice(&rgb);
                } else {
                    px[0] = params.border_color[0];
                    px[1] = params.border_color[1];
                    px[2] = params.border_color[2];
                }
            }
        });
    out
}
