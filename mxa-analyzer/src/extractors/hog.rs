//! Histogram of Oriented Gradients
//!
//! 64×64 grayscale window, 8×8 pixel cells, 2×2-cell blocks moved one cell
//! at a time, 9 unsigned orientation bins over [0°, 180°), L2-Hys block
//! normalization. 7 × 7 blocks × 36 values = 1764 features.

use super::{gray_resized, FeatureExtractor};
use crate::error::ExtractionError;
use image::{DynamicImage, GrayImage};

pub const WINDOW: u32 = 64;
pub const CELL: usize = 8;
pub const BLOCK_CELLS: usize = 2;
pub const BINS: usize = 9;
/// Block stride in cells (8 px)
const BLOCK_STRIDE: usize = 1;
const L2_HYS_CLIP: f32 = 0.2;
const EPS: f32 = 1e-5;

/// Descriptor length for the configured geometry
pub const DESCRIPTOR_LEN: usize = {
    let cells = WINDOW as usize / CELL;
    let blocks = (cells - BLOCK_CELLS) / BLOCK_STRIDE + 1;
    blocks * blocks * BLOCK_CELLS * BLOCK_CELLS * BINS
};

pub struct HogExtractor;

impl FeatureExtractor for HogExtractor {
    fn name(&self) -> &str {
        "builtin_hog"
    }

    fn extract(&self, image: &DynamicImage) -> Result<Vec<f32>, ExtractionError> {
        Ok(hog_descriptor(&gray_resized(image, WINDOW)?))
    }
}

/// HOG descriptor of a 64×64 grayscale image
pub fn hog_descriptor(gray: &GrayImage) -> Vec<f32> {
    let width = gray.width() as usize;
    let height = gray.height() as usize;
    let px = |x: usize, y: usize| gray.get_pixel(x as u32, y as u32)[0] as f32 / 255.0;

    // Centered differences; border pixels have no gradient
    let cells_x = width / CELL;
    let cells_y = height / CELL;
    let mut histograms = vec![[0.0f32; BINS]; cells_x * cells_y];

    for y in 1..height.saturating_sub(1) {
        for x in 1..width.saturating_sub(1) {
            let gx = px(x + 1, y) - px(x - 1, y);
            let gy = px(x, y + 1) - px(x, y - 1);
            let magnitude = (gx * gx + gy * gy).sqrt();
            if magnitude == 0.0 {
                continue;
            }

            let mut angle = gy.atan2(gx).to_degrees();
            if angle < 0.0 {
                angle += 180.0;
            }
            if angle >= 180.0 {
                angle -= 180.0;
            }
            let bin = ((angle / (180.0 / BINS as f32)) as usize).min(BINS - 1);

            let (cx, cy) = (x / CELL, y / CELL);
            if cx < cells_x && cy < cells_y {
                histograms[cy * cells_x + cx][bin] += magnitude;
            }
        }
    }

    // Cell histograms are averaged over the cell area
    let area = (CELL * CELL) as f32;
    for histogram in &mut histograms {
        histogram.iter_mut().for_each(|v| *v /= area);
    }

    let blocks_x = (cells_x - BLOCK_CELLS) / BLOCK_STRIDE + 1;
    let blocks_y = (cells_y - BLOCK_CELLS) / BLOCK_STRIDE + 1;
    let mut descriptor = Vec::with_capacity(blocks_x * blocks_y * BLOCK_CELLS * BLOCK_CELLS * BINS);

    for by in 0..blocks_y {
        for bx in 0..blocks_x {
            let mut block = Vec::with_capacity(BLOCK_CELLS * BLOCK_CELLS * BINS);
            for cy in 0..BLOCK_CELLS {
                for cx in 0..BLOCK_CELLS {
                    let cell = (by * BLOCK_STRIDE + cy) * cells_x + bx * BLOCK_STRIDE + cx;
                    block.extend_from_slice(&histograms[cell]);
                }
            }
            l2_hys(&mut block);
            descriptor.extend(block);
        }
    }

    descriptor
}

fn l2_hys(block: &mut [f32]) {
    let normalize = |block: &mut [f32]| {
        let norm = (block.iter().map(|v| v * v).sum::<f32>() + EPS * EPS).sqrt();
        block.iter_mut().for_each(|v| *v /= norm);
    };
    normalize(block);
    block.iter_mut().for_each(|v| *v = v.min(L2_HYS_CLIP));
    normalize(block);
}
