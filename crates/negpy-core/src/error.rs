//! Error types shared across the rendering pipeline.

use std::fmt;

/// Errors that can occur while loading, rendering, or exporting an image.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderError {
    /// File format not recognized by any loader
    LoaderUnsupported(String),
    /// File recognized but its contents could not be decoded
    LoaderCorrupt(String),
    /// Calibration produced floor >= ceiling
    CalibrationDegenerate,
    /// GPU device was lost mid-render
    GpuDeviceLost(String),
    /// GPU allocation failed
    GpuOutOfMemory(String),
    /// WGSL compilation failed
    KernelCompileError(String),
    /// A tile dispatch could not be issued
    TileDispatchFailed(String),
    /// Buffer mapping / readback failed
    ReadbackFailed(String),
    /// Edit store or preset write failed (non-fatal for rendering)
    PersistenceFailed(String),
    /// A parameter is outside its valid range
    ConfigInvalid(String),
    /// Input path does not exist
    PathNotFound(String),
}

impl RenderError {
    /// Stable kind name used in events and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            RenderError::LoaderUnsupported(_) => "LoaderUnsupported",
            RenderError::LoaderCorrupt(_) => "LoaderCorrupt",
            RenderError::CalibrationDegenerate => "CalibrationDegenerate",
            RenderError::GpuDeviceLost(_) => "GpuDeviceLost",
            RenderError::GpuOutOfMemory(_) => "GpuOutOfMemory",
            RenderError::KernelCompileError(_) => "KernelCompileError",
            RenderError::TileDispatchFailed(_) => "TileDispatchFailed",
            RenderError::ReadbackFailed(_) => "ReadbackFailed",
            RenderError::PersistenceFailed(_) => "PersistenceFailed",
            RenderError::ConfigInvalid(_) => "ConfigInvalid",
            RenderError::PathNotFound(_) => "PathNotFound",
        }
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::LoaderUnsupported(e) => write!(f, "Unsupported input: {}", e),
            RenderError::LoaderCorrupt(e) => write!(f, "Corrupt input: {}", e),
            RenderError::CalibrationDegenerate => {
                write!(f, "Calibration degenerate: floor >= ceiling")
            }
            RenderError::GpuDeviceLost(e) => write!(f, "GPU device lost: {}", e),
            RenderError::GpuOutOfMemory(e) => write!(f, "GPU out of memory: {}", e),
            RenderError::KernelCompileError(e) => write!(f, "Kernel compile error: {}", e),
            RenderError::TileDispatchFailed(e) => write!(f, "Tile dispatch failed: {}", e),
            RenderError::ReadbackFailed(e) => write!(f, "Readback failed: {}", e),
            RenderError::PersistenceFailed(e) => write!(f, "Persistence failed: {}", e),
            RenderError::ConfigInvalid(e) => write!(f, "Invalid parameter: {}", e),
            RenderError::PathNotFound(e) => write!(f, "Path not found: {}", e),
        }
    }
}

impl std::error::Error for RenderError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_are_stable() {
        assert_eq!(RenderError::CalibrationDegenerate.kind(), "CalibrationDegenerate");
        assert_eq!(
            RenderError::GpuOutOfMemory("tex".into()).kind(),
            "GpuOutOfMemory"
        );
    }

    #[test]
    fn test_display_includes_detail() {
        let e = RenderError::ConfigInvalid("grade out of range".into());
        assert!(e.to_string().contains("grade out of range"));
    }
}
