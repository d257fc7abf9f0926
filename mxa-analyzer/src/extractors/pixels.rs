//! Pixel ablation encodings
//!
//! `raw_pixels`: grayscale, 64×64, flattened intensities (0–255).
//! `compressed_pixels`: grayscale, JPEG round trip at quality 30, then the
//! same 64×64 flattening.

use super::{gray_resized, FeatureExtractor};
use crate::error::ExtractionError;
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage, ImageFormat};

pub const PIXEL_SIZE: u32 = 64;
pub const JPEG_QUALITY: u8 = 30;

pub struct PixelExtractor {
    compressed: bool,
}

impl PixelExtractor {
    pub fn raw() -> Self {
        Self { compressed: false }
    }

    pub fn compressed() -> Self {
        Self { compressed: true }
    }
}

impl FeatureExtractor for PixelExtractor {
    fn name(&self) -> &str {
        if self.compressed {
            "builtin_compressed_pixels"
        } else {
            "builtin_raw_pixels"
        }
    }

    fn extract(&self, image: &DynamicImage) -> Result<Vec<f32>, ExtractionError> {
        let source = if self.compressed {
            jpeg_round_trip(image)?
        } else {
            image.clone()
        };

        Ok(gray_resized(&source, PIXEL_SIZE)?
            .pixels()
            .map(|p| p[0] as f32)
            .collect())
    }
}

/// Grayscale JPEG encode/decode at `JPEG_QUALITY`
fn jpeg_round_trip(image: &DynamicImage) -> Result<DynamicImage, ExtractionError> {
    let gray = image.to_luma8();
    if gray.width() == 0 || gray.height() == 0 {
        return Err(ExtractionError::Computation("image has zero area".into()));
    }

    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, JPEG_QUALITY)
        .encode(gray.as_raw(), gray.width(), gray.height(), ColorType::L8)
        .map_err(|e| ExtractionError::Computation(format!("JPEG encode failed: {}", e)))?;

    image::load_from_memory_with_format(&encoded, ImageFormat::Jpeg)
        .map_err(|e| ExtractionError::Computation(format!("JPEG decode failed: {}", e)))
}
