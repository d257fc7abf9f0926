//! Deep embedding encoding (`resnet`)
//!
//! RGB input resized to the backbone's input size, scaled to [0,1] and
//! normalized with the ImageNet channel statistics, then passed through the
//! headless backbone.

use super::FeatureExtractor;
use crate::error::ExtractionError;
use crate::models::backbone::Tensor;
use crate::registry::EmbeddingBackbone;
use image::imageops::FilterType;
use image::DynamicImage;
use std::sync::Arc;

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

pub struct EmbeddingExtractor {
    backbone: Arc<dyn EmbeddingBackbone>,
}

impl EmbeddingExtractor {
    pub fn new(backbone: Arc<dyn EmbeddingBackbone>) -> Self {
        Self { backbone }
    }
}

impl FeatureExtractor for EmbeddingExtractor {
    fn name(&self) -> &str {
        "builtin_embedding"
    }

    fn extract(&self, image: &DynamicImage) -> Result<Vec<f32>, ExtractionError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(ExtractionError::Computation("image has zero area".into()));
        }
        let (width, height) = self.backbone.input_size();
        self.backbone.embed(&normalized_tensor(image, width, height))
    }
}

/// CHW tensor with per-channel ImageNet normalization
pub fn normalized_tensor(image: &DynamicImage, width: u32, height: u32) -> Tensor {
    let rgb = image::imageops::resize(&image.to_rgb8(), width, height, FilterType::Triangle);
    let (w, h) = (width as usize, height as usize);
    let mut tensor = Tensor::zeros(3, h, w);

    for (x, y, pixel) in rgb.enumerate_pixels() {
        for c in 0..3 {
            let v = pixel[c] as f32 / 255.0;
            tensor.data[(c * h + y as usize) * w + x as usize] =
                (v - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }

    tensor
}
