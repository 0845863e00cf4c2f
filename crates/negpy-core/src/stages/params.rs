//! Per-stage parameter blocks.
//!
//! These structs are the single source of truth for both backends: the CPU
//! kernels read them directly and the GPU engine writes them verbatim into
//! the stage's uniform slice, so the WGSL struct layouts must match
//! field-for-field. Every struct fits inside one 256-byte slice.

use bytemuck::{Pod, Zeroable};

use crate::calibration::CalibrationBounds;
use crate::models::{GeometryConfig, ManualSpot, ProcessMode, WorkspaceConfig};

/// Size of one stage's slice in the shared uniform block. 256 is the
/// guaranteed minimum dynamic-offset alignment in WebGPU.
pub const UNIFORM_SLICE_BYTES: u64 = 256;

/// Maximum manual spots copied into the per-render storage buffer.
pub const MAX_SPOTS: usize = 512;

/// CLAHE grid is always 8x8 over the full image, regardless of aspect.
pub const CLAHE_GRID: u32 = 8;
pub const CLAHE_BINS: u32 = 256;

/// Built-in spectral crosstalk correction for dye-coupler scans, row-major.
pub const DEFAULT_CROSSTALK: [f32; 9] = [
    1.08, -0.06, -0.02, //
    -0.05, 1.12, -0.07, //
    -0.01, -0.09, 1.10,
];

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct NormalizationParams {
    pub floor: [f32; 4],
    pub ceiling: [f32; 4],
    pub white_balance: [f32; 4],
    /// 0 = negative (log-normalize), 1 = positive (invert, then log),
    /// 2 = pass-through.
    pub mode: u32,
    pub _pad: [u32; 3],
}

pub const NORM_MODE_NEGATIVE: u32 = 0;
pub const NORM_MODE_POSITIVE: u32 = 1;
pub const NORM_MODE_SKIP: u32 = 2;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TransformParams {
    pub src_width: u32,
    pub src_height: u32,
    /// Canonical transform output dims (`full_dims`).
    pub full_width: u32,
    pub full_height: u32,
    /// Origin of this dispatch within the full output; (0,0) untiled.
    pub global_offset: [i32; 2],
    pub quarter_turns: u32,
    pub flip_horizontal: u32,
    pub flip_vertical: u32,
    pub _pad0: u32,
    /// Fine rotation in radians, counter-clockwise.
    pub fine_rotation: f32,
    pub _pad1: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct RetouchParams {
    pub dust_threshold: f32,
    pub dust_size: f32,
    /// Neighborhood scale for the current resolution.
    pub scale_factor: f32,
    pub _pad0: f32,
    pub global_offset: [i32; 2],
    pub full_width: u32,
    pub full_height: u32,
    pub spot_count: u32,
    pub dust_enabled: u32,
    pub _pad1: [u32; 2],
}

/// One manual spot in the per-render storage buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SpotRecord {
    /// Center in full-image pixels.
    pub center: [f32; 2],
    /// Radius in pixels.
    pub radius: f32,
    pub _pad: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ExposureParams {
    /// Subtractive CMY filtration in density units (applied against R, G, B).
    pub cmy: [f32; 4],
    /// Sigmoid pivot.
    pub density: f32,
    /// Sigmoid slope (paper grade).
    pub grade: f32,
    pub toe: f32,
    pub shoulder: f32,
    /// 0 = H&D sigmoid, 1 = linear pass-through (reversal film).
    pub mode: u32,
    pub _pad: [u32; 3],
}

pub const EXPOSURE_MODE_SIGMOID: u32 = 0;
pub const EXPOSURE_MODE_BYPASS: u32 = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LabParams {
    /// Row-normalized blend of identity and the crosstalk matrix; rows are
    /// padded to vec4 for WGSL alignment.
    pub matrix: [[f32; 4]; 3],
    pub sharpen_amount: f32,
    /// Gaussian sigma in pixels.
    pub sharpen_radius: f32,
    pub _pad: [f32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ClaheParams {
    pub strength: f32,
    pub clip_limit: f32,
    pub global_offset: [i32; 2],
    pub full_width: u32,
    pub full_height: u32,
    /// Local origin of the histogram accumulation region (excludes halos).
    pub region_origin: [i32; 2],
    /// Dims of the accumulation region.
    pub region_width: u32,
    pub region_height: u32,
    pub _pad: [u32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ToningParams {
    pub tint: [f32; 4],
    pub dmax_gamma: f32,
    pub selenium: f32,
    pub sepia: f32,
    pub saturation: f32,
    pub final_gamma: f32,
    pub bw: u32,
    pub _pad: [u32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LayoutParams {
    pub canvas_width: u32,
    pub canvas_height: u32,
    /// Where the cropped image lands on the canvas.
    pub image_origin: [i32; 2],
    /// Crop origin within the toned texture.
    pub crop_origin: [i32; 2],
    pub image_width: u32,
    pub image_height: u32,
    pub border_color: [f32; 4],
}

/// Rectangle in transform-space pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

/// Geometry of one render, computed once per request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameGeometry {
    pub src_width: u32,
    pub src_height: u32,
    /// Transform output dims.
    pub full_width: u32,
    pub full_height: u32,
    /// Crop applied by the layout stage, in transform space.
    pub crop: PixelRect,
    /// Final canvas dims (crop plus letterbox/border).
    pub canvas_width: u32,
    pub canvas_height: u32,
    /// Crop placement on the canvas.
    pub image_origin: [i32; 2],
}

impl FrameGeometry {
    /// Transform output dims for a source under a geometry record.
    pub fn transformed_dims(geometry: &GeometryConfig, src_w: u32, src_h: u32) -> (u32, u32) {
        if geometry.swaps_axes() {
            (src_h, src_w)
        } else {
            (src_w, src_h)
        }
    }
}

/// Scale factor feeding neighborhood radii so retouch behaves the same on a
/// preview and on a full-resolution export of the same frame.
pub fn image_scale_factor(full_width: u32, full_height: u32) -> f32 {
    (full_width.max(full_height) as f32 / 2048.0).clamp(0.5, 4.0)
}

pub fn build_normalization(
    config: &WorkspaceConfig,
    bounds: &CalibrationBounds,
    skip: bool,
) -> NormalizationParams {
    let resolved = bounds.resolve(&config.normalization);
    let wb = config.exposure.white_balance;
    let mode = if skip {
        NORM_MODE_SKIP
    } else if config.process_mode.is_positive() {
        NORM_MODE_POSITIVE
    } else {
        NORM_MODE_NEGATIVE
    };
    NormalizationParams {
        floor: [resolved.floor[0], resolved.floor[1], resolved.floor[2], 0.0],
        ceiling: [
            resolved.ceiling[0],
            resolved.ceiling[1],
            resolved.ceiling[2],
            0.0,
        ],
        white_balance: [wb[0], wb[1], wb[2], 1.0],
        mode,
        _pad: [0; 3],
    }
}

pub fn build_transform(
    geometry: &GeometryConfig,
    frame: &FrameGeometry,
    global_offset: [i32; 2],
) -> TransformParams {
    TransformParams {
        src_width: frame.src_width,
        src_height: frame.src_height,
        full_width: frame.full_width,
        full_height: frame.full_height,
        global_offset,
        quarter_turns: geometry.quarter_turns(),
        flip_horizontal: geometry.flip_horizontal as u32,
        flip_vertical: geometry.flip_vertical as u32,
        _pad0: 0,
        fine_rotation: geometry.fine_rotation.to_radians(),
        _pad1: 0.0,
    }
}

pub fn build_retouch(
    config: &WorkspaceConfig,
    frame: &FrameGeometry,
    global_offset: [i32; 2],
    spot_count: usize,
) -> RetouchParams {
    RetouchParams {
        dust_threshold: config.retouch.dust_threshold,
        dust_size: config.retouch.dust_size,
        scale_factor: image_scale_factor(frame.full_width, frame.full_height),
        _pad0: 0.0,
        global_offset,
        full_width: frame.full_width,
        full_height: frame.full_height,
        spot_count: spot_count as u32,
        dust_enabled: config.retouch.dust_enabled as u32,
        _pad1: [0; 2],
    }
}

/// Convert normalized manual spots into pixel-space records, capped at
/// MAX_SPOTS. Coordinates are already post-rotation (preset migration
/// handles older records).
pub fn build_spots(spots: &[ManualSpot], frame: &FrameGeometry) -> Vec<SpotRecord> {
    let long_edge = frame.full_width.max(frame.full_height) as f32;
    spots
        .iter()
        .take(MAX_SPOTS)
        .map(|s| SpotRecord {
            center: [
                s.x * frame.full_width as f32,
                s.y * frame.full_height as f32,
            ],
            radius: (s.radius * long_edge).max(1.0),
            _pad: 0.0,
        })
        .collect()
}

pub fn build_exposure(config: &WorkspaceConfig) -> ExposureParams {
    let e = &config.exposure;
    let mode = if config.process_mode == ProcessMode::E6Positive {
        EXPOSURE_MODE_BYPASS
    } else {
        EXPOSURE_MODE_SIGMOID
    };
    ExposureParams {
        cmy: [e.cyan, e.magenta, e.yellow, 0.0],
        density: e.density,
        grade: e.grade,
        toe: e.toe,
        shoulder: e.shoulder,
        mode,
        _pad: [0; 3],
    }
}

pub fn build_lab(config: &WorkspaceConfig) -> LabParams {
    let beta = config.lab.color_separation;
    let source = config.lab.crosstalk_matrix.unwrap_or(DEFAULT_CROSSTALK);

    // Blend toward the crosstalk matrix, then row-normalize so a neutral
    // input stays neutral.
    let mut matrix = [[0.0f32; 4]; 3];
    for r in 0..3 {
        let mut row = [0.0f32; 3];
        for c in 0..3 {
            let identity = if r == c { 1.0 } else { 0.0 };
            row[c] = identity * (1.0 - beta) + source[r * 3 + c] * beta;
        }
        let sum: f32 = row.iter().sum::<f32>();
        let norm = sum.max(1e-6);
        for c in 0..3 {
            matrix[r][c] = row[c] / norm;
        }
    }

    LabParams {
        matrix,
        sharpen_amount: config.lab.sharpen_amount,
        sharpen_radius: config.lab.sharpen_radius,
        _pad: [0.0; 2],
    }
}

pub fn build_clahe(
    config: &WorkspaceConfig,
    frame: &FrameGeometry,
    global_offset: [i32; 2],
    region_origin: [i32; 2],
    region_width: u32,
    region_height: u32,
) -> ClaheParams {
    ClaheParams {
        strength: config.lab.clahe_strength,
        clip_limit: config.lab.clahe_clip,
        global_offset,
        full_width: frame.full_width,
        full_height: frame.full_height,
        region_origin,
        region_width,
        region_height,
        _pad: [0; 2],
    }
}

pub fn build_toning(config: &WorkspaceConfig) -> ToningParams {
    let t = &config.toning;
    let bw = t.bw || config.process_mode.is_bw();
    ToningParams {
        tint: [t.paper_tint[0], t.paper_tint[1], t.paper_tint[2], 1.0],
        dmax_gamma: t.dmax_gamma,
        selenium: t.selenium,
        sepia: t.sepia,
        saturation: t.saturation,
        final_gamma: t.final_gamma,
        bw: bw as u32,
        _pad: [0; 2],
    }
}

pub fn build_layout(config: &WorkspaceConfig, frame: &FrameGeometry) -> LayoutParams {
    let border = config.export.border;
    LayoutParams {
        canvas_width: frame.canvas_width,
        canvas_height: frame.canvas_height,
        image_origin: frame.image_origin,
        crop_origin: [frame.crop.x as i32, frame.crop.y as i32],
        image_width: frame.crop.width,
        image_height: frame.crop.height,
        border_color: border
            .map(|b| [b.color[0], b.color[1], b.color[2], 1.0])
            .unwrap_or([1.0, 1.0, 1.0, 1.0]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_fit_uniform_slices() {
        assert!(std::mem::size_of::<NormalizationParams>() as u64 <= UNIFORM_SLICE_BYTES);
        assert!(std::mem::size_of::<TransformParams>() as u64 <= UNIFORM_SLICE_BYTES);
        assert!(std::mem::size_of::<RetouchParams>() as u64 <= UNIFORM_SLICE_BYTES);
        assert!(std::mem::size_of::<ExposureParams>() as u64 <= UNIFORM_SLICE_BYTES);
        assert!(std::mem::size_of::<LabParams>() as u64 <= UNIFORM_SLICE_BYTES);
        assert!(std::mem::size_of::<ClaheParams>() as u64 <= UNIFORM_SLICE_BYTES);
        assert!(std::mem::size_of::<ToningParams>() as u64 <= UNIFORM_SLICE_BYTES);
        assert!(std::mem::size_of::<LayoutParams>() as u64 <= UNIFORM_SLICE_BYTES);
    }

    #[test]
    fn test_lab_matrix_rows_sum_to_one() {
        let mut config = WorkspaceConfig::default();
        config.lab.color_separation = 0.7;
        let params = build_lab(&config);
        for r in 0..3 {
            let sum: f32 = params.matrix[r][..3].iter().sum();
            assert!((sum - 1.0).abs() < 1e-5, "row {} sums to {}", r, sum);
        }
    }

    #[test]
    fn test_lab_matrix_identity_at_zero_beta() {
        let config = WorkspaceConfig::default();
        let params = build_lab(&config);
        for r in 0..3 {
            for c in 0..3 {
                let expected = if r == c { 1.0 } else { 0.0 };
                assert!((params.matrix[r][c] - expected).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_spot_records_use_full_dims() {
        let frame = FrameGeometry {
            src_width: 4000,
            src_height: 3000,
            full_width: 3000,
            full_height: 4000,
            crop: PixelRect::full(3000, 4000),
            canvas_width: 3000,
            canvas_height: 4000,
            image_origin: [0, 0],
        };
        let spots = vec![ManualSpot {
            x: 0.5,
            y: 0.25,
            radius: 0.004,
        }];
        let records = build_spots(&spots, &frame);
        assert_eq!(records.len(), 1);
        assert!((records[0].center[0] - 1500.0).abs() < 1e-3);
        assert!((records[0].center[1] - 1000.0).abs() < 1e-3);
        assert!((records[0].radius - 16.0).abs() < 1e-3);
    }

    #[test]
    fn test_scale_factor_clamps() {
        assert_eq!(image_scale_factor(512, 512), 0.5);
        assert_eq!(image_scale_factor(2048, 1000), 1.0);
        assert_eq!(image_scale_factor(40000, 2000), 4.0);
    }
}
