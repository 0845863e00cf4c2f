//! Image loaders.
//!
//! The engine consumes a linear float RGB buffer; where it came from is a
//! collaborator concern. TIFF and the headerless planar scanner format are
//! decoded here; RAW containers are delegated to an external `ImageLoader`
//! implementation (demosaicing is out of scope for the core).

mod planar;
mod tiff;

#[cfg(test)]
mod tests;

use std::path::Path;

use crate::error::RenderError;

/// Linear scene-referred RGB float buffer.
///
/// `stride` is in pixels; loaders produce tightly packed buffers where
/// `stride == width`, but tile views may differ.
#[derive(Debug, Clone)]
pub struct ImageBuffer {
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    /// Interleaved RGB, length `stride * height * 3`.
    pub data: Vec<f32>,
}

impl ImageBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            stride: width,
            data: vec![0.0; (width * height * 3) as usize],
        }
    }

    pub fn from_data(width: u32, height: u32, data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), (width * height * 3) as usize);
        Self {
            width,
            height,
            stride: width,
            data,
        }
    }

    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [f32; 3] {
        let i = ((y * self.stride + x) * 3) as usize;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    #[inline]
    pub fn set_pixel(&mut self, x: u32, y: u32, rgb: [f32; 3]) {
        let i = ((y * self.stride + x) * 3) as usize;
        self.data[i] = rgb[0];
        self.data[i + 1] = rgb[1];
        self.data[i + 2] = rgb[2];
    }

    pub fn pixel_count(&self) -> usize {
        (self.width * self.height) as usize
    }
}

/// Capture metadata carried alongside the pixels.
#[derive(Debug, Clone, Default)]
pub struct ExifMetadata {
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub iso: Option<u32>,
    pub capture_date: Option<String>,
}

/// Optional per-channel density hints a loader may supply (e.g. from a DNG
/// baseline); they seed calibration but never override user bounds.
#[derive(Debug, Clone, Copy)]
pub struct CalibrationHint {
    pub floor: [f32; 3],
    pub ceiling: [f32; 3],
}

/// Result of a load.
pub struct LoadedImage {
    pub buffer: ImageBuffer,
    pub metadata: ExifMetadata,
    pub hint: Option<CalibrationHint>,
}

/// Loader collaborator interface. The built-in implementation handles TIFF
/// and the planar scanner format; RAW decoding plugs in from outside.
pub trait ImageLoader {
    fn supports(&self, path: &Path) -> bool;
    fn load(&self, path: &Path) -> Result<LoadedImage, RenderError>;
}

/// Extensions the built-in loader recognizes.
pub const KNOWN_EXTENSIONS: &[&str] = &["tif", "tiff", "npx"];

/// Built-in loader for TIFF and headerless planar files.
#[derive(Debug, Default)]
pub struct FileLoader;

impl ImageLoader for FileLoader {
    fn supports(&self, path: &Path) -> bool {
        extension_of(path)
            .map(|ext| KNOWN_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false)
    }

    fn load(&self, path: &Path) -> Result<LoadedImage, RenderError> {
        if !path.exists() {
            return Err(RenderError::PathNotFound(path.display().to_string()));
        }
        let ext = extension_of(path)
            .ok_or_else(|| RenderError::LoaderUnsupported("no file extension".to_string()))?;
        match ext.as_str() {
            "tif" | "tiff" => tiff::decode_tiff(path),
            "npx" => planar::decode_planar(path),
            other => Err(RenderError::LoaderUnsupported(format!(
                "unrecognized extension: {}",
                other
            ))),
        }
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}
