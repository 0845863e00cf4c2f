//! Headerless planar scanner dumps.
//!
//! Some lab scanners write bare big-endian 10- or 14-bit triplets with no
//! container at all. Dimensions and bit depth come from a JSON sidecar next
//! to the file (`scan.npx` + `scan.npx.json`).

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{ExifMetadata, ImageBuffer, LoadedImage};
use crate::error::RenderError;

#[derive(Debug, Deserialize)]
struct PlanarSidecar {
    width: u32,
    height: u32,
    /// Bits per sample; 10 and 14 are the formats seen in the wild.
    bits: u32,
}

pub(crate) fn decode_planar(path: &Path) -> Result<LoadedImage, RenderError> {
    let sidecar = read_sidecar(path)?;
    if sidecar.bits != 10 && sidecar.bits != 14 {
        return Err(RenderError::LoaderUnsupported(format!(
            "planar bit depth {} (expected 10 or 14)",
            sidecar.bits
        )));
    }
    if sidecar.width == 0 || sidecar.height == 0 {
        return Err(RenderError::LoaderCorrupt("sidecar reports empty image".into()));
    }

    let raw = std::fs::read(path)
        .map_err(|e| RenderError::LoaderCorrupt(format!("failed to read planar file: {}", e)))?;

    // Samples are stored as big-endian u16 with the value left-justified in
    // the low bits, interleaved RGB.
    let sample_count = (sidecar.width * sidecar.height * 3) as usize;
    if raw.len() < sample_count * 2 {
        return Err(RenderError::LoaderCorrupt(format!(
            "planar file holds {} bytes, {} required for {}x{}",
            raw.len(),
            sample_count * 2,
            sidecar.width,
            sidecar.height
        )));
    }

    let max = ((1u32 << sidecar.bits) - 1) as f32;
    let mut data = Vec::with_capacity(sample_count);
    for chunk in raw[..sample_count * 2].chunks_exact(2) {
        let v = u16::from_be_bytes([chunk[0], chunk[1]]) as f32;
        data.push((v / max).min(1.0));
    }

    Ok(LoadedImage {
        buffer: ImageBuffer::from_data(sidecar.width, sidecar.height, data),
        metadata: ExifMetadata::default(),
        hint: None,
    })
}

fn read_sidecar(path: &Path) -> Result<PlanarSidecar, RenderError> {
    let sidecar_path: PathBuf = {
        let mut s = path.as_os_str().to_os_string();
        s.push(".json");
        s.into()
    };
    let text = std::fs::read_to_string(&sidecar_path).map_err(|e| {
        RenderError::LoaderUnsupported(format!(
            "planar sidecar {} unreadable: {}",
            sidecar_path.display(),
            e
        ))
    })?;
    serde_json::from_str(&text)
        .map_err(|e| RenderError::LoaderCorrupt(format!("bad planar sidecar: {}", e)))
}
