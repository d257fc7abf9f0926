//! Convolutional embedding backbone
//!
//! ```json
//! {
//!   "input_size": [224, 224],
//!   "layers": [
//!     { "in_channels": 3, "out_channels": 16, "kernel_size": 3,
//!       "stride": 2, "padding": 1, "weights": [...], "bias": [...] }
//!   ],
//!   "head": { ... }
//! }
//! ```
//!
//! Every convolution is followed by ReLU; the final feature map is reduced
//! by global average pooling. A classification `head`, if present, is
//! dropped at load so the output is the penultimate representation.

use crate::error::{ArtifactError, ExtractionError};
use crate::registry::EmbeddingBackbone;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Channel-major (CHW) float tensor
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub data: Vec<f32>,
}

impl Tensor {
    pub fn zeros(channels: usize, height: usize, width: usize) -> Self {
        Self {
            channels,
            height,
            width,
            data: vec![0.0; channels * height * width],
        }
    }

    #[inline]
    fn index(&self, c: usize, y: usize, x: usize) -> usize {
        (c * self.height + y) * self.width + x
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvLayer {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    #[serde(default = "default_stride")]
    pub stride: usize,
    #[serde(default)]
    pub padding: usize,
    /// `[out][in][k][k]`, flattened
    pub weights: Vec<f32>,
    pub bias: Vec<f32>,
}

fn default_stride() -> usize {
    1
}

impl ConvLayer {
    fn output_dim(&self, input: usize) -> Option<usize> {
        let padded = input + 2 * self.padding;
        if padded < self.kernel_size {
            return None;
        }
        Some((padded - self.kernel_size) / self.stride + 1)
    }

    fn forward(&self, input: &Tensor) -> Option<Tensor> {
        let out_h = self.output_dim(input.height)?;
        let out_w = self.output_dim(input.width)?;
        let k = self.kernel_size;
        let mut output = Tensor::zeros(self.out_channels, out_h, out_w);

        for oc in 0..self.out_channels {
            for oy in 0..out_h {
                for ox in 0..out_w {
                    let mut acc = self.bias[oc];
                    for ic in 0..self.in_channels {
                        for ky in 0..k {
                            let iy = (oy * self.stride + ky) as isize - self.padding as isize;
                            if iy < 0 || iy >= input.height as isize {
                                continue;
                            }
                            for kx in 0..k {
                                let ix = (ox * self.stride + kx) as isize - self.padding as isize;
                                if ix < 0 || ix >= input.width as isize {
                                    continue;
                                }
                                let w = self.weights[((oc * self.in_channels + ic) * k + ky) * k + kx];
                                acc += w * input.data[input.index(ic, iy as usize, ix as usize)];
                            }
                        }
                    }
                    let idx = output.index(oc, oy, ox);
                    output.data[idx] = acc.max(0.0);
                }
            }
        }

        Some(output)
    }
}

#[derive(Debug, Deserialize)]
struct BackboneFile {
    input_size: [u32; 2],
    layers: Vec<ConvLayer>,
    #[serde(default)]
    head: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct ConvBackbone {
    input_width: u32,
    input_height: u32,
    layers: Vec<ConvLayer>,
}

impl ConvBackbone {
    pub fn new(input_size: (u32, u32), layers: Vec<ConvLayer>) -> Result<Self, ArtifactError> {
        let backbone = Self {
            input_width: input_size.0,
            input_height: input_size.1,
            layers,
        };
        backbone.validate()?;
        Ok(backbone)
    }

    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let content = std::fs::read_to_string(path)?;
        let file: BackboneFile = serde_json::from_str(&content)?;
        if file.head.is_some() {
            debug!(path = %path.display(), "Discarding classification head from backbone");
        }
        Self::new((file.input_size[0], file.input_size[1]), file.layers)
    }

    fn validate(&self) -> Result<(), ArtifactError> {
        if self.layers.is_empty() {
            return Err(ArtifactError::Invalid("backbone has no layers".into()));
        }

        let mut channels = 3;
        let mut height = self.input_height as usize;
        let mut width = self.input_width as usize;

        for (index, layer) in self.layers.iter().enumerate() {
            let k = layer.kernel_size;
            if layer.in_channels != channels {
                return Err(ArtifactError::Invalid(format!(
                    "layer {}: expects {} input channels, previous layer yields {}",
                    index, layer.in_channels, channels
                )));
            }
            if k == 0 || layer.stride == 0 || layer.out_channels == 0 {
                return Err(ArtifactError::Invalid(format!(
                    "layer {}: zero kernel, stride or channel count",
                    index
                )));
            }
            let expected = layer.out_channels * layer.in_channels * k * k;
            if layer.weights.len() != expected || layer.bias.len() != layer.out_channels {
                return Err(ArtifactError::Invalid(format!(
                    "layer {}: {} weights / {} biases, expected {} / {}",
                    index,
                    layer.weights.len(),
                    layer.bias.len(),
                    expected,
                    layer.out_channels
                )));
            }
            if layer.weights.iter().chain(&layer.bias).any(|v| !v.is_finite()) {
                return Err(ArtifactError::Invalid(format!(
                    "layer {}: non-finite parameter",
                    index
                )));
            }
            height = layer.output_dim(height).ok_or_else(|| {
                ArtifactError::Invalid(format!("layer {}: feature map collapses", index))
            })?;
            width = layer.output_dim(width).ok_or_else(|| {
                ArtifactError::Invalid(format!("layer {}: feature map collapses", index))
            })?;
            channels = layer.out_channels;
        }

        Ok(())
    }

    pub fn embedding_len(&self) -> usize {
        self.layers.last().map(|l| l.out_channels).unwrap_or(0)
    }
}

impl EmbeddingBackbone for ConvBackbone {
    fn input_size(&self) -> (u32, u32) {
        (self.input_width, self.input_height)
    }

    fn embed(&self, input: &Tensor) -> Result<Vec<f32>, ExtractionError> {
        if input.channels != 3
            || input.width != self.input_width as usize
            || input.height != self.input_height as usize
        {
            return Err(ExtractionError::Computation(format!(
                "input {}x{}x{} does not match backbone 3x{}x{}",
                input.channels, input.height, input.width, self.input_height, self.input_width
            )));
        }

        let mut activation = input.clone();
        for (index, layer) in self.layers.iter().enumerate() {
            activation = layer.forward(&activation).ok_or_else(|| {
                ExtractionError::Computation(format!("layer {} produced an empty map", index))
            })?;
        }

        let area = (activation.height * activation.width) as f32;
        Ok(activation
            .data
            .chunks(activation.height * activation.width)
            .map(|plane| plane.iter().sum::<f32>() / area)
            .collect())
    }
}
