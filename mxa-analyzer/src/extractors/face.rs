//! Built-in face detector
//!
//! Multi-scale sliding window over an integral image. A window is a face
//! candidate when it has enough contrast and the classic Haar-like layout
//! holds: both eye bands darker than the cheek band and the nose bridge,
//! with left and right eyes of similar brightness. The highest-scoring
//! window is the primary face.
//!
//! This detector is always available; a stronger detector can be injected
//! through the capability registry.

use crate::models::landmarks::BoundingBox;
use crate::registry::FaceDetector;
use image::GrayImage;

/// Images are downscaled to at most this many pixels on the long side
const WORK_SIZE: u32 = 128;

/// Window regions in window-relative coordinates: (x0, y0, x1, y1)
const LEFT_EYE: (f32, f32, f32, f32) = (0.15, 0.25, 0.40, 0.45);
const RIGHT_EYE: (f32, f32, f32, f32) = (0.60, 0.25, 0.85, 0.45);
const NOSE_BRIDGE: (f32, f32, f32, f32) = (0.42, 0.25, 0.58, 0.45);
const CHEEKS: (f32, f32, f32, f32) = (0.15, 0.50, 0.85, 0.70);

#[derive(Debug, Clone)]
pub struct HaarFaceDetector {
    /// Smallest window side in working-image pixels
    pub min_window: u32,
    /// Windows flatter than this (intensity std-dev) are rejected
    pub min_stddev: f64,
    /// Required darkness of the eyes, in window std-devs
    pub min_contrast: f64,
    /// Allowed left/right eye difference, in window std-devs
    pub max_asymmetry: f64,
    /// Window shrink factor between scales
    pub scale_step: f32,
}

impl Default for HaarFaceDetector {
    fn default() -> Self {
        Self {
            min_window: 24,
            min_stddev: 12.0,
            min_contrast: 0.5,
            max_asymmetry: 0.3,
            scale_step: 0.8,
        }
    }
}

/// Summed-area tables of intensity and squared intensity
struct IntegralImage {
    width: usize,
    sum: Vec<f64>,
    sq_sum: Vec<f64>,
}

impl IntegralImage {
    fn new(image: &GrayImage) -> Self {
        let width = image.width() as usize + 1;
        let height = image.height() as usize + 1;
        let mut sum = vec![0.0; width * height];
        let mut sq_sum = vec![0.0; width * height];

        for y in 1..height {
            let mut row = 0.0;
            let mut row_sq = 0.0;
            for x in 1..width {
                let v = image.get_pixel(x as u32 - 1, y as u32 - 1)[0] as f64;
                row += v;
                row_sq += v * v;
                sum[y * width + x] = sum[(y - 1) * width + x] + row;
                sq_sum[y * width + x] = sq_sum[(y - 1) * width + x] + row_sq;
            }
        }

        Self { width, sum, sq_sum }
    }

    fn rect(table: &[f64], width: usize, x0: usize, y0: usize, x1: usize, y1: usize) -> f64 {
        table[y1 * width + x1] - table[y0 * width + x1] - table[y1 * width + x0]
            + table[y0 * width + x0]
    }

    /// Mean over `[x0, x1) × [y0, y1)`
    fn mean(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> f64 {
        let area = ((x1 - x0) * (y1 - y0)).max(1) as f64;
        Self::rect(&self.sum, self.width, x0, y0, x1, y1) / area
    }

    fn stddev(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> f64 {
        let area = ((x1 - x0) * (y1 - y0)).max(1) as f64;
        let mean = Self::rect(&self.sum, self.width, x0, y0, x1, y1) / area;
        let mean_sq = Self::rect(&self.sq_sum, self.width, x0, y0, x1, y1) / area;
        (mean_sq - mean * mean).max(0.0).sqrt()
    }
}

impl HaarFaceDetector {
    fn score_window(&self, ii: &IntegralImage, x: usize, y: usize, size: usize) -> Option<f64> {
        let std = ii.stddev(x, y, x + size, y + size);
        if std < self.min_stddev {
            return None;
        }

        let region = |(fx0, fy0, fx1, fy1): (f32, f32, f32, f32)| {
            let s = size as f32;
            let x0 = x + (fx0 * s) as usize;
            let y0 = y + (fy0 * s) as usize;
            let x1 = (x + (fx1 * s).ceil() as usize).max(x0 + 1);
            let y1 = (y + (fy1 * s).ceil() as usize).max(y0 + 1);
            ii.mean(x0, y0, x1, y1)
        };

        let left = region(LEFT_EYE);
        let right = region(RIGHT_EYE);
        let eyes = (left + right) / 2.0;
        let cheek_contrast = (region(CHEEKS) - eyes) / std;
        let bridge_contrast = (region(NOSE_BRIDGE) - eyes) / std;
        let asymmetry = (left - right).abs() / std;

        if cheek_contrast < self.min_contrast
            || bridge_contrast < self.min_contrast
            || asymmetry > self.max_asymmetry
        {
            return None;
        }

        Some(cheek_contrast + bridge_contrast - asymmetry)
    }
}

impl FaceDetector for HaarFaceDetector {
    fn detect(&self, image: &GrayImage) -> Option<BoundingBox> {
        let long_side = image.width().max(image.height());
        if long_side == 0 {
            return None;
        }

        let (work, scale) = if long_side > WORK_SIZE {
            let scale = WORK_SIZE as f32 / long_side as f32;
            let w = ((image.width() as f32 * scale).round() as u32).max(1);
            let h = ((image.height() as f32 * scale).round() as u32).max(1);
            (
                image::imageops::resize(image, w, h, image::imageops::FilterType::Triangle),
                scale,
            )
        } else {
            (image.clone(), 1.0)
        };

        let ii = IntegralImage::new(&work);
        let (width, height) = (work.width() as usize, work.height() as usize);

        let mut best: Option<(f64, usize, usize, usize)> = None;
        let mut size = width.min(height) as f32;

        while size >= self.min_window as f32 {
            let side = size as usize;
            let step = (side / 8).max(1);

            for y in (0..=height - side).step_by(step) {
                for x in (0..=width - side).step_by(step) {
                    if let Some(score) = self.score_window(&ii, x, y, side) {
                        if best.map_or(true, |(b, ..)| score > b) {
                            best = Some((score, x, y, side));
                        }
                    }
                }
            }

            size *= self.scale_step;
        }

        best.map(|(_, x, y, side)| {
            BoundingBox::new(
                x as f32 / scale,
                y as f32 / scale,
                side as f32 / scale,
                side as f32 / scale,
            )
        })
    }
}

/// Synthetic frontal face: light skin, dark eyes and mouth
#[cfg(test)]
pub(crate) fn synthetic_face(size: u32) -> GrayImage {
    let s = size as f32;
    GrayImage::from_fn(size, size, |x, y| {
        let (fx, fy) = (x as f32 / s, y as f32 / s);
        let in_band = |x0: f32, x1: f32, y0: f32, y1: f32| fx >= x0 && fx < x1 && fy >= y0 && fy < y1;
        if in_band(0.16, 0.40, 0.27, 0.44) || in_band(0.60, 0.84, 0.27, 0.44) {
            image::Luma([30])
        } else if in_band(0.35, 0.65, 0.76, 0.84) {
            image::Luma([60])
        } else {
            image::Luma([185])
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_gray_image_has_no_face() {
        let image = GrayImage::from_pixel(64, 64, image::Luma([128]));
        assert!(HaarFaceDetector::default().detect(&image).is_none());
    }

    #[test]
    fn horizontal_gradient_has_no_face() {
        let image = GrayImage::from_fn(64, 64, |x, _| image::Luma([(x * 4) as u8]));
        assert!(HaarFaceDetector::default().detect(&image).is_none());
    }

    #[test]
    fn synthetic_face_is_detected() {
        let image = synthetic_face(64);
        let face = HaarFaceDetector::default().detect(&image).unwrap();
        assert!(face.width >= 24.0);
        assert!(face.x >= 0.0 && face.x + face.width <= 64.0 + 1e-3);
    }

    #[test]
    fn large_images_map_back_to_source_coordinates() {
        let image = synthetic_face(256);
        let face = HaarFaceDetector::default().detect(&image).unwrap();
        // Smallest working window is 24 px at half scale
        assert!(face.width >= 48.0);
        assert!(face.x + face.width <= 256.0 + 1.0);
    }

    #[test]
    fn tiny_images_have_no_face() {
        let image = GrayImage::from_pixel(10, 10, image::Luma([0]));
        assert!(HaarFaceDetector::default().detect(&image).is_none());
    }
}
