//! Exposure stage: dichroic filtration and the paper H&D curve.
//!
//! Input is normalized negative density; output is positive print intensity.
//! CMY shifts act subtractively in density space before the sigmoid, so a
//! cyan shift pulls red exposure down, magenta green, yellow blue.

use rayon::prelude::*;

use super::params::{ExposureParams, EXPOSURE_MODE_BYPASS};
use crate::decoders::ImageBuffer;
use crate::numerics::sigmoid_hd;

/// D-max of the normalized print response.
const PRINT_DMAX: f32 = 1.0;

#[inline]
pub fn expose_channel(x: f32, shift: f32, params: &ExposureParams) -> f32 {
    sigmoid_hd(
        x - shift,
        params.grade,
        params.density,
        params.toe,
        params.shoulder,
        PRINT_DMAX,
    )
}

pub fn run(input: &ImageBuffer, params: &ExposureParams) -> ImageBuffer {
    let mut out = ImageBuffer::new(input.width, input.height);

    if params.mode == EXPOSURE_MODE_BYPASS {
        // Reversal film is already positive; clamp and pass through.
        out.data
            .par_iter_mut()
            .zip(input.data.par_iter())
            .for_each(|(o, &v)| *o = v.clamp(0.0, 1.0));
        return out;
    }

    out.data
        .par_chunks_mut((input.width * 3) as usize)
        .zip(input.data.par_chunks((input.stride * 3) as usize))
        .for_each(|(dst, src)| {
            for (o, i) in dst.chunks_exact_mut(3).zip(src.chunks_exact(3)) {
                o[0] = expose_channel(i[0], params.cmy[0], params);
                o[1] = expose_channel(i[1], params.cmy[1], params);
                o[2] = expose_channel(i[2], params.cmy[2], params);
            }
        });
    out
}
