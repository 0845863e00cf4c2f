//! WGSL kernel sources embedded at compile time.
//!
//! Every kernel mirrors its CPU counterpart in `stages/`; when one side
//! changes, the other must change with it (the cross-backend agreement
//! tolerance is 1/255 on 8-bit output).

/// Container for all shader source code.
pub struct Shaders;

impl Shaders {
    /// White balance, optional linear inversion, log-density range mapping.
    pub const NORMALIZATION: &'static str = include_str!("normalization.wgsl");

    /// Quarter-turn rotation, flips, fine affine rotation (bilinear).
    pub const TRANSFORM: &'static str = include_str!("transform.wgsl");

    /// Auto dust detection and manual spot healing.
    pub const RETOUCH: &'static str = include_str!("retouch.wgsl");

    /// Dichroic filtration and the paper H&D sigmoid.
    pub const EXPOSURE: &'static str = include_str!("exposure.wgsl");

    /// Crosstalk correction and luma unsharp mask.
    pub const LAB: &'static str = include_str!("lab.wgsl");

    /// CLAHE histogram accumulation (atomics over the 8x8 grid).
    pub const CLAHE_HIST: &'static str = include_str!("clahe_hist.wgsl");

    /// CLAHE clip + redistribute + cumulative sum, one thread per cell.
    pub const CLAHE_CDF: &'static str = include_str!("clahe_cdf.wgsl");

    /// CLAHE application with bilinear cell interpolation.
    pub const CLAHE_APPLY: &'static str = include_str!("clahe_apply.wgsl");

    /// Paper tint, D-max gamma, chemical toners, saturation, display gamma.
    pub const TONING: &'static str = include_str!("toning.wgsl");

    /// Crop placement and border fill.
    pub const LAYOUT: &'static str = include_str!("layout.wgsl");

    /// 4x256 output histogram over the cropped print.
    pub const METRICS: &'static str = include_str!("metrics.wgsl");

    /// Row/column luminance reductions for autocrop.
    pub const AUTOCROP: &'static str = include_str!("autocrop.wgsl");
}
