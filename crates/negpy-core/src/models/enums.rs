//! Closed enumerations used across the workspace record.

use serde::{Deserialize, Serialize};

/// Film process the scan came from. Selects the sign of the normalization
/// inversion and gates chemical toning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ProcessMode {
    /// Chromogenic color negative (orange-masked).
    #[default]
    #[serde(rename = "C41")]
    C41Negative,
    /// Silver black & white negative.
    #[serde(rename = "BW")]
    BwNegative,
    /// Reversal slide film; already positive.
    #[serde(rename = "E6")]
    E6Positive,
}

impl ProcessMode {
    pub fn is_positive(&self) -> bool {
        matches!(self, ProcessMode::E6Positive)
    }

    pub fn is_bw(&self) -> bool {
        matches!(self, ProcessMode::BwNegative)
    }
}

/// Encoded export container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Tiff16,
    Jpeg,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Tiff16 => "tiff",
            OutputFormat::Jpeg => "jpg",
        }
    }
}

/// ICC profile tag attached to exports. The core never converts color; it
/// only names the space for the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum IccTag {
    #[default]
    #[serde(rename = "sRGB")]
    Srgb,
    #[serde(rename = "Adobe RGB")]
    AdobeRgb,
    #[serde(rename = "ProPhoto")]
    ProPhoto,
    #[serde(rename = "Display P3")]
    DisplayP3,
    #[serde(rename = "Rec2020")]
    Rec2020,
    #[serde(rename = "WideGamut")]
    WideGamut,
    #[serde(rename = "Greyscale")]
    Greyscale,
}

impl IccTag {
    pub fn label(&self) -> &'static str {
        match self {
            IccTag::Srgb => "sRGB",
            IccTag::AdobeRgb => "Adobe RGB",
            IccTag::ProPhoto => "ProPhoto",
            IccTag::DisplayP3 => "Display P3",
            IccTag::Rec2020 => "Rec2020",
            IccTag::WideGamut => "WideGamut",
            IccTag::Greyscale => "Greyscale",
        }
    }
}

/// Output sizing policy for exports.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SizePolicy {
    /// Keep the post-crop pixel dimensions.
    #[default]
    Original,
    /// Fit the long edge to a physical print size in centimeters at the
    /// configured DPI.
    PrintCm(f32),
}
