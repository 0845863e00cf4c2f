//! 16-bit TIFF scan decoder.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult, Limits};

use super::{ExifMetadata, ImageBuffer, LoadedImage};
use crate::error::RenderError;

/// Decode a TIFF scan into linear float RGB.
///
/// Integer samples are scaled by their type maximum; float samples pass
/// through. Grayscale sources are expanded to RGB so the pipeline sees one
/// layout.
pub(crate) fn decode_tiff(path: &Path) -> Result<LoadedImage, RenderError> {
    let file = File::open(path)
        .map_err(|e| RenderError::LoaderCorrupt(format!("failed to open TIFF: {}", e)))?;

    // Film scans routinely exceed the crate's default decode limits.
    let mut limits = Limits::default();
    limits.decoding_buffer_size = 1024 * 1024 * 1024;
    limits.ifd_value_size = 1024 * 1024 * 1024;
    limits.intermediate_buffer_size = 1024 * 1024 * 1024;

    let mut decoder = Decoder::new(BufReader::new(file))
        .map_err(|e| RenderError::LoaderCorrupt(format!("failed to parse TIFF: {}", e)))?
        .with_limits(limits);

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| RenderError::LoaderCorrupt(format!("failed to read dimensions: {}", e)))?;
    let color_type = decoder
        .colortype()
        .map_err(|e| RenderError::LoaderCorrupt(format!("failed to read color type: {}", e)))?;

    let channels = match color_type {
        tiff::ColorType::Gray(_) => 1usize,
        tiff::ColorType::RGB(_) => 3usize,
        tiff::ColorType::RGBA(_) => 4usize,
        other => {
            return Err(RenderError::LoaderUnsupported(format!(
                "TIFF color type {:?}",
                other
            )))
        }
    };

    let image_data = decoder
        .read_image()
        .map_err(|e| RenderError::LoaderCorrupt(format!("failed to read image data: {}", e)))?;

    let data = match image_data {
        DecodingResult::U8(buf) => scale_to_rgb(&buf, channels, u8::MAX as f32),
        DecodingResult::U16(buf) => scale_to_rgb(&buf, channels, u16::MAX as f32),
        DecodingResult::U32(buf) => scale_to_rgb(&buf, channels, u32::MAX as f32),
        DecodingResult::F32(buf) => scale_to_rgb(&buf, channels, 1.0),
        other => {
            return Err(RenderError::LoaderUnsupported(format!(
                "TIFF sample format {:?} not supported",
                sample_name(&other)
            )))
        }
    };

    let expected = (width * height * 3) as usize;
    if data.len() != expected {
        return Err(RenderError::LoaderCorrupt(format!(
            "TIFF data length {} does not match {}x{}",
            data.len(),
            width,
            height
        )));
    }

    Ok(LoadedImage {
        buffer: ImageBuffer::from_data(width, height, data),
        metadata: ExifMetadata::default(),
        hint: None,
    })
}

fn sample_name(result: &DecodingResult) -> &'static str {
    match result {
        DecodingResult::U8(_) => "u8",
        DecodingResult::U16(_) => "u16",
        DecodingResult::U32(_) => "u32",
        DecodingResult::U64(_) => "u64",
        DecodingResult::F32(_) => "f32",
        DecodingResult::F64(_) => "f64",
        _ => "signed/other",
    }
}

fn scale_to_rgb<T: Copy + Into<f64>>(buf: &[T], channels: usize, max: f32) -> Vec<f32> {
    let pixels = buf.len() / channels;
    let mut out = Vec::with_capacity(pixels * 3);
    for px in buf.chunks_exact(channels) {
        match channels {
            1 => {
                let v = px[0].into() as f32 / max;
                out.extend_from_slice(&[v, v, v]);
            }
            _ => {
                for c in 0..3 {
                    out.push(px[c].into() as f32 / max);
                }
            }
        }
    }
    out
}
