//! Output encoders.
//!
//! The 16-bit TIFF path writes RGB planes straight through the `tiff`
//! encoder so no color-management layer can touch the sample values. JPEG
//! goes through the `image` crate at 8 bits.

use std::io::Cursor;

use crate::decoders::ImageBuffer;
use crate::models::{IccTag, OutputFormat};
use crate::store::IccProvider;

/// Quantize to interleaved 16-bit samples.
pub fn to_rgb16(buffer: &ImageBuffer) -> Vec<u16> {
    buffer
        .data
        .iter()
        .map(|&v| (v.clamp(0.0, 1.0) * 65535.0).round() as u16)
        .collect()
}

/// Quantize to interleaved 8-bit samples.
pub fn to_rgb8(buffer: &ImageBuffer) -> Vec<u8> {
    buffer
        .data
        .iter()
        .map(|&v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect()
}

/// Encode a finished print to its container format.
pub fn encode(
    buffer: &ImageBuffer,
    format: OutputFormat,
    color_space: IccTag,
    icc: &dyn IccProvider,
) -> Result<Vec<u8>, String> {
    match format {
        OutputFormat::Tiff16 => encode_tiff16(buffer),
        OutputFormat::Jpeg => encode_jpeg(buffer, color_space, icc),
    }
}

/// 16-bit TIFF with the sample planes written directly.
///
/// ICC data is intentionally not routed through here: the TIFF path must
/// stay byte-transparent, and the `tiff` crate does not expose profile tags.
pub fn encode_tiff16(buffer: &ImageBuffer) -> Result<Vec<u8>, String> {
    let mut out = Cursor::new(Vec::new());
    {
        let mut encoder = tiff::encoder::TiffEncoder::new(&mut out)
            .map_err(|e| format!("Failed to create TIFF encoder: {}", e))?;
        let samples = to_rgb16(buffer);
        encoder
            .write_image::<tiff::encoder::colortype::RGB16>(buffer.width, buffer.height, &samples)
            .map_err(|e| format!("Failed to write TIFF image: {}", e))?;
    }
    Ok(out.into_inner())
}

/// 8-bit JPEG with the ICC tag attached when the provider has one.
pub fn encode_jpeg(
    buffer: &ImageBuffer,
    color_space: IccTag,
    icc: &dyn IccProvider,
) -> Result<Vec<u8>, String> {
    use image::{codecs::jpeg::JpegEncoder, ExtendedColorType, ImageEncoder};

    let samples = to_rgb8(buffer);
    let mut out = Cursor::new(Vec::new());
    let mut encoder = JpegEncoder::new_with_quality(&mut out, 92);
    if let Some(profile) = icc.profile_bytes(color_space) {
        // Not every encoder version supports profiles; tagging is advisory.
        if encoder.set_icc_profile(profile).is_err() {
            log::warn!("JPEG encoder refused ICC profile for {}", color_space.label());
        }
    }
    encoder
        .write_image(
            &samples,
            buffer.width,
            buffer.height,
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| format!("Failed to write JPEG image: {}", e))?;
    Ok(out.into_inner())
}
