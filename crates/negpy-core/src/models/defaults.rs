//! Default functions referenced by serde attributes on the workspace record.
//!
//! Missing preset keys fall back to these, so old presets keep loading as the
//! record grows.

pub(crate) fn default_true() -> bool {
    true
}

pub(crate) fn default_one() -> f32 {
    1.0
}

pub(crate) fn default_unit_rgb() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

pub(crate) fn default_density() -> f32 {
    0.5
}

pub(crate) fn default_grade() -> f32 {
    2.0
}

pub(crate) fn default_dust_threshold() -> f32 {
    0.25
}

pub(crate) fn default_dust_size() -> f32 {
    1.0
}

pub(crate) fn default_clahe_clip() -> f32 {
    2.5
}

pub(crate) fn default_sharpen_radius() -> f32 {
    1.0
}

pub(crate) fn default_aspect_ratio() -> String {
    "3:2".to_string()
}

pub(crate) fn default_dpi() -> u32 {
    300
}
