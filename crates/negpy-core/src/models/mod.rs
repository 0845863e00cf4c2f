//! Parameter records edited by the UI and consumed by the engine.

mod defaults;
mod enums;
mod paper;
mod workspace;

#[cfg(test)]
mod tests;

pub use enums::{IccTag, OutputFormat, ProcessMode, SizePolicy};
pub use paper::{paper_profile, PaperProfile, PAPER_PROFILES};
pub use workspace::{
    BorderSpec, CropRect, ExportConfig, ExposureConfig, GeometryConfig, LabConfig, ManualSpot,
    NormalizationConfig, RetouchConfig, ToningConfig, WorkspaceConfig,
};
