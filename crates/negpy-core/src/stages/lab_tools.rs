//! Lab-tools stage: spectral crosstalk correction and luma unsharp mask.
//!
//! The crosstalk matrix is blended with identity and row-normalized by the
//! params builder, so neutral input stays neutral here by construction. The
//! unsharp mask operates on L* only; a and b pass through untouched.

use rayon::prelude::*;

use super::params::LabParams;
use crate::color::{lab_to_rgb, rgb_to_lab, Lab};
use crate::decoders::ImageBuffer;
use crate::numerics::gaussian_weight;

/// Differences below this L* delta are treated as noise and not sharpened.
const NOISE_FLOOR: f32 = 2.0;

/// Largest blur window half-width; keeps the GPU loop bounded.
pub const MAX_KERNEL_RADIUS: i32 = 12;

#[inline]
pub fn kernel_radius(sigma: f32) -> i32 {
    ((2.0 * sigma).ceil() as i32).clamp(1, MAX_KERNEL_RADIUS)
}

#[inline]
fn apply_matrix(matrix: &[[f32; 4]; 3], rgb: [f32; 3]) -> [f32; 3] {
    let mut out = [0.0f32; 3];
    for (r, out_c) in out.iter_mut().enumerate() {
        *out_c = matrix[r][0] * rgb[0] + matrix[r][1] * rgb[1] + matrix[r][2] * rgb[2];
    }
    out
}

pub fn run(input: &ImageBuffer, params: &LabParams) -> ImageBuffer {
    // Crosstalk correction in linear RGB.
    let mut corrected = ImageBuffer::new(input.width, input.height);
    corrected
        .data
        .par_chunks_mut((input.width * 3) as usize)
        .zip(input.data.par_chunks((input.stride * 3) as usize))
        .for_each(|(dst, src)| {
            for (o, i) in dst.chunks_exact_mut(3).zip(src.chunks_exact(3)) {
                let rgb = apply_matrix(&params.matrix, [i[0], i[1], i[2]]);
                o.copy_from_slice(&rgb);
            }
        });

    if params.sharpen_amount <= 0.0 {
        return corrected;
    }

    // Luma unsharp: blur L* with a truncated Gaussian, boost where the
    // difference clears the noise floor.
    let width = corrected.width;
    let height = corrected.height;
    let labs: Vec<Lab> = corrected
        .data
        .par_chunks(3)
        .map(|px| rgb_to_lab(px[0], px[1], px[2]))
        .collect();

    let radius = kernel_radius(params.sharpen_radius);
    let sigma = params.sharpen_radius;

    let mut out = ImageBuffer::new(width, height);
    out.data
        .par_chunks_mut((width * 3) as usize)
        .enumerate()
        .for_each(|(row, chunk)| {
            let y = row as i32;
            for (col, px) in chunk.chunks_exact_mut(3).enumerate() {
                let x = col as i32;
                let lab = labs[(y as u32 * width + x as u32) as usize];

                let mut sum = 0.0f32;
                let mut weight_sum = 0.0f32;
                for dy in -radius..=radius {
                    for dx in -radius..=radius {
                        let nx = (x + dx).clamp(0, width as i32 - 1) as u32;
                        let ny = (y + dy).clamp(0, height as i32 - 1) as u32;
                        let w = gaussian_weight((dx * dx + dy * dy) as f32, sigma);
                        sum += w * labs[(ny * width + nx) as usize].l;
                        weight_sum += w;
                    }
                }
                let blurred = sum / weight_sum;

                let delta = lab.l - blurred;
                let l = if delta.abs() > NOISE_FLOOR {
                    lab.l + params.sharpen_amount * delta
                } else {
                    lab.l
                };

                let (r, g, b) = lab_to_rgb(Lab {
                    l: l.clamp(0.0, 100.0),
                    a: lab.a,
                    b: lab.b,
                });
                px[0] = r;
                px[1] = g;
                px[2] = b;
            }
        });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WorkspaceConfig;
    use crate::stages::params::build_lab;

    fn flat(w: u32, h: u32, rgb: [f32; 3]) -> ImageBuffer {
        let mut b = ImageBuffer::new(w, h);
        for y in 0..h {
            for x in 0..w {
                b.set_pixel(x, y, rgb);
            }
        }
        b
    }

    #[test]
    fn test_identity_at_defaults() {
        let config = WorkspaceConfig::default();
        let params = build_lab(&config);
        let input = flat(8, 8, [0.2, 0.5, 0.8]);
        let out = run(&input, &params);
        for (a, b) in input.data.iter().zip(out.data.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_neutral_preserved_under_separation() {
        let mut config = WorkspaceConfig::default();
        config.lab.color_separation = 0.8;
        let params = build_lab(&config);
        let input = flat(4, 4, [0.5, 0.5, 0.5]);
        let out = run(&input, &params);
        for px in out.data.chunks_exact(3) {
            assert!((px[0] - 0.5).abs() < 1e-5);
            assert!((px[1] - 0.5).abs() < 1e-5);
            assert!((px[2] - 0.5).abs() < 1e-5);
        }
    }

    #[test]
    fn test_separation_increases_saturation() {
        let mut config = WorkspaceConfig::default();
        config.lab.color_separation = 1.0;
        let params = build_lab(&config);
        let input = flat(2, 2, [0.6, 0.4, 0.4]);
        let out = run(&input, &params);
        let px = out.pixel(0, 0);
        // Crosstalk correction pushes channels apart.
        assert!(px[0] - px[1] > 0.2 - 1e-3, "got {:?}", px);
    }

    #[test]
    fn test_sharpen_boosts_edge_contrast() {
        let mut config = WorkspaceConfig::default();
        config.lab.sharpen_amount = 1.5;
        config.lab.sharpen_radius = 1.0;
        let params = build_lab(&config);

        // Vertical step edge.
        let mut input = ImageBuffer::new(16, 8);
        for y in 0..8 {
            for x in 0..16 {
                let v = if x < 8 { 0.25 } else { 0.75 };
                input.set_pixel(x, y, [v, v, v]);
            }
        }
        let out = run(&input, &params);
        // Overshoot on the bright side of the edge, undershoot on the dark.
        assert!(out.pixel(8, 4)[0] > 0.75 + 0.01);
        assert!(out.pixel(7, 4)[0] < 0.25 - 0.01);
        // Far from the edge nothing changes.
        assert!((out.pixel(0, 4)[0] - 0.25).abs() < 1e-3);
    }

    #[test]
    fn test_flat_field_not_sharpened() {
        // Noise floor: a uniform field has zero L delta everywhere.
        let mut config = WorkspaceConfig::default();
        config.lab.sharpen_amount = 2.0;
        let params = build_lab(&config);
        let input = flat(8, 8, [0.5, 0.5, 0.5]);
        let out = run(&input, &params);
        for (a, b) in input.data.iter().zip(out.data.iter()) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn test_kernel_radius_bounds() {
        assert_eq!(kernel_radius(0.2), 1);
        assert_eq!(kernel_radius(1.0), 2);
        assert_eq!(kernel_radius(100.0), MAX_KERNEL_RADIUS);
    }
}
