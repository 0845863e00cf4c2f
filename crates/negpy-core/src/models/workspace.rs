//! The workspace record: every parameter for one image edit.
//!
//! The record is immutable from the engine's point of view; the UI replaces
//! it wholesale and the edit store persists complete records keyed by file
//! fingerprint. Unknown JSON keys are ignored and missing keys fall back to
//! defaults so presets stay forward-compatible.

use serde::{Deserialize, Serialize};

use super::defaults::*;
use super::enums::{IccTag, OutputFormat, ProcessMode, SizePolicy};
use crate::error::RenderError;

/// A manual healing spot in normalized coordinates.
///
/// Coordinates live in the full rotated-and-flipped image space, independent
/// of crop and of export tile offsets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ManualSpot {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
}

/// Normalized crop rectangle in post-rotation coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Border drawn by the layout stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BorderSpec {
    /// Border width as a fraction of the long edge.
    pub size: f32,
    pub color: [f32; 3],
}

/// Photometric print exposure: the H&D curve and dichroic filtration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExposureConfig {
    /// Pivot of the paper sigmoid in normalized density.
    pub density: f32,
    /// Contrast grade; slope of the sigmoid.
    pub grade: f32,
    /// Toe softness (highlight roll-off), >= 0.
    pub toe: f32,
    /// Shoulder compression (shadow roll-off), >= 0.
    pub shoulder: f32,
    /// Subtractive filtration in density units.
    pub cyan: f32,
    pub magenta: f32,
    pub yellow: f32,
    /// Per-channel white-balance multipliers applied before normalization.
    pub white_balance: [f32; 3],
}

impl Default for ExposureConfig {
    fn default() -> Self {
        Self {
            density: default_density(),
            grade: default_grade(),
            toe: 0.0,
            shoulder: 0.0,
            cyan: 0.0,
            magenta: 0.0,
            yellow: 0.0,
            white_balance: default_unit_rgb(),
        }
    }
}

/// Per-channel log-density bounds. `None` means auto-calibrate from the scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NormalizationConfig {
    pub floor: Option<[f32; 3]>,
    pub ceiling: Option<[f32; 3]>,
}

/// Lab-space tools: crosstalk correction, CLAHE, luma sharpening.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabConfig {
    /// Blend toward the crosstalk-correction matrix, 0-1.
    pub color_separation: f32,
    /// Row-major 3x3 override; `None` uses the built-in scanner matrix.
    pub crosstalk_matrix: Option<[f32; 9]>,
    /// CLAHE blend toward the equalized luma, 0-1.
    pub clahe_strength: f32,
    /// CLAHE histogram clip limit multiplier.
    pub clahe_clip: f32,
    /// Luma unsharp mask gain.
    pub sharpen_amount: f32,
    /// Gaussian sigma of the unsharp blur, in pixels.
    pub sharpen_radius: f32,
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            color_separation: 0.0,
            crosstalk_matrix: None,
            clahe_strength: 0.0,
            clahe_clip: default_clahe_clip(),
            sharpen_amount: 0.0,
            sharpen_radius: default_sharpen_radius(),
        }
    }
}

/// Paper base and chemical toning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToningConfig {
    pub paper_tint: [f32; 3],
    pub dmax_gamma: f32,
    pub selenium: f32,
    pub sepia: f32,
    /// Collapse to Rec.709 luma before toning.
    pub bw: bool,
    pub saturation: f32,
    /// Final display gamma; 1.0 leaves print intensity untouched.
    pub final_gamma: f32,
}

impl Default for ToningConfig {
    fn default() -> Self {
        Self {
            paper_tint: default_unit_rgb(),
            dmax_gamma: default_one(),
            selenium: 0.0,
            sepia: 0.0,
            bw: false,
            saturation: default_one(),
            final_gamma: default_one(),
        }
    }
}

/// Dust removal and manual healing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetouchConfig {
    pub dust_enabled: bool,
    pub dust_threshold: f32,
    pub dust_size: f32,
    pub spots: Vec<ManualSpot>,
}

impl Default for RetouchConfig {
    fn default() -> Self {
        Self {
            dust_enabled: false,
            dust_threshold: default_dust_threshold(),
            dust_size: default_dust_size(),
            spots: Vec::new(),
        }
    }
}

/// Orientation and cropping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    /// Coarse rotation in degrees: 0, 90, 180 or 270 (counter-clockwise).
    pub rotation: u32,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
    /// Fine affine rotation in degrees.
    pub fine_rotation: f32,
    /// Manual crop; `None` engages autocrop unless `keep_full_frame`.
    pub crop: Option<CropRect>,
    /// Aspect ratio tag enforced on autocrop results, e.g. "3:2".
    pub aspect_ratio: String,
    pub keep_full_frame: bool,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            rotation: 0,
            flip_horizontal: false,
            flip_vertical: false,
            fine_rotation: 0.0,
            crop: None,
            aspect_ratio: default_aspect_ratio(),
            keep_full_frame: true,
        }
    }
}

impl GeometryConfig {
    /// Number of 90-degree counter-clockwise quarter turns.
    pub fn quarter_turns(&self) -> u32 {
        (self.rotation / 90) % 4
    }

    /// True when the rotation swaps width and height.
    pub fn swaps_axes(&self) -> bool {
        self.quarter_turns() % 2 == 1
    }
}

/// Output encoding parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub format: OutputFormat,
    pub color_space: IccTag,
    pub dpi: u32,
    pub size: SizePolicy,
    pub border: Option<BorderSpec>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            color_space: IccTag::default(),
            dpi: default_dpi(),
            size: SizePolicy::default(),
            border: None,
        }
    }
}

/// Complete state for a single image edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub process_mode: ProcessMode,
    pub exposure: ExposureConfig,
    pub normalization: NormalizationConfig,
    pub lab: LabConfig,
    pub toning: ToningConfig,
    pub retouch: RetouchConfig,
    pub geometry: GeometryConfig,
    pub export: ExportConfig,
}

impl WorkspaceConfig {
    /// Range-check every parameter. The engine refuses to render an invalid
    /// record rather than clamping silently.
    pub fn validate(&self) -> Result<(), RenderError> {
        fn check(name: &str, v: f32, lo: f32, hi: f32) -> Result<(), RenderError> {
            if !v.is_finite() || v < lo || v > hi {
                return Err(RenderError::ConfigInvalid(format!(
                    "{} = {} outside [{}, {}]",
                    name, v, lo, hi
                )));
            }
            Ok(())
        }

        check("exposure.density", self.exposure.density, 0.0, 1.0)?;
        check("exposure.grade", self.exposure.grade, 0.1, 10.0)?;
        check("exposure.toe", self.exposure.toe, 0.0, 4.0)?;
        check("exposure.shoulder", self.exposure.shoulder, 0.0, 4.0)?;
        for (name, v) in [
            ("exposure.cyan", self.exposure.cyan),
            ("exposure.magenta", self.exposure.magenta),
            ("exposure.yellow", self.exposure.yellow),
        ] {
            check(name, v, -1.0, 1.0)?;
        }
        for (c, &v) in self.exposure.white_balance.iter().enumerate() {
            check(&format!("exposure.white_balance[{}]", c), v, 0.1, 10.0)?;
        }
        if let (Some(floor), Some(ceiling)) =
            (self.normalization.floor, self.normalization.ceiling)
        {
            for c in 0..3 {
                if floor[c] >= ceiling[c] {
                    return Err(RenderError::ConfigInvalid(format!(
                        "normalization floor {} >= ceiling {} on channel {}",
                        floor[c], ceiling[c], c
                    )));
                }
            }
        }
        check("lab.color_separation", self.lab.color_separation, 0.0, 1.0)?;
        check("lab.clahe_strength", self.lab.clahe_strength, 0.0, 1.0)?;
        check("lab.clahe_clip", self.lab.clahe_clip, 1.0, 40.0)?;
        check("lab.sharpen_amount", self.lab.sharpen_amount, 0.0, 4.0)?;
        check("lab.sharpen_radius", self.lab.sharpen_radius, 0.2, 25.0)?;
        check("toning.dmax_gamma", self.toning.dmax_gamma, 0.2, 4.0)?;
        check("toning.selenium", self.toning.selenium, 0.0, 1.0)?;
        check("toning.sepia", self.toning.sepia, 0.0, 1.0)?;
        check("toning.saturation", self.toning.saturation, 0.0, 4.0)?;
        check("toning.final_gamma", self.toning.final_gamma, 0.2, 4.0)?;
        check("retouch.dust_threshold", self.retouch.dust_threshold, 0.0, 1.0)?;
        check("retouch.dust_size", self.retouch.dust_size, 0.25, 8.0)?;
        for (i, s) in self.retouch.spots.iter().enumerate() {
            check(&format!("retouch.spots[{}].x", i), s.x, 0.0, 1.0)?;
            check(&format!("retouch.spots[{}].y", i), s.y, 0.0, 1.0)?;
            check(&format!("retouch.spots[{}].radius", i), s.radius, 0.0, 0.5)?;
        }
        if !matches!(self.geometry.rotation, 0 | 90 | 180 | 270) {
            return Err(RenderError::ConfigInvalid(format!(
                "geometry.rotation = {} not one of 0/90/180/270",
                self.geometry.rotation
            )));
        }
        check("geometry.fine_rotation", self.geometry.fine_rotation, -45.0, 45.0)?;
        if let Some(crop) = &self.geometry.crop {
            for (name, v) in [
                ("geometry.crop.x", crop.x),
                ("geometry.crop.y", crop.y),
                ("geometry.crop.width", crop.width),
                ("geometry.crop.height", crop.height),
            ] {
                check(name, v, 0.0, 1.0)?;
            }
            if crop.width <= 0.0 || crop.height <= 0.0 {
                return Err(RenderError::ConfigInvalid("empty crop rectangle".into()));
            }
        }
        if self.export.dpi == 0 || self.export.dpi > 2400 {
            return Err(RenderError::ConfigInvalid(format!(
                "export.dpi = {} outside [1, 2400]",
                self.export.dpi
            )));
        }
        if let Some(border) = &self.export.border {
            check("export.border.size", border.size, 0.0, 0.5)?;
        }
        Ok(())
    }
}
