//! Holistic dense network
//!
//! ```json
//! {
//!   "layers": [ { "weights": [[...], ...], "bias": [...] }, ... ],
//!   "labels": ["truth", "lie"]
//! }
//! ```
//!
//! `weights` is row-major `[outputs][inputs]`. ReLU is applied between
//! layers; the last layer's outputs are logits.

use crate::error::{ArtifactError, PredictionError};
use crate::registry::HolisticModel;
use crate::types::Label;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseLayer {
    pub weights: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
}

impl DenseLayer {
    fn outputs(&self) -> usize {
        self.weights.len()
    }

    fn inputs(&self) -> usize {
        self.weights.first().map(|row| row.len()).unwrap_or(0)
    }

    fn forward(&self, input: &[f32]) -> Vec<f32> {
        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(input).map(|(w, x)| w * x).sum::<f32>() + b)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseNetwork {
    pub layers: Vec<DenseLayer>,
    #[serde(default = "default_labels")]
    pub labels: Vec<Label>,
}

fn default_labels() -> Vec<Label> {
    vec![Label::Truth, Label::Lie]
}

impl DenseNetwork {
    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let content = std::fs::read_to_string(path)?;
        let network: Self = serde_json::from_str(&content)?;
        network.validate()?;
        Ok(network)
    }

    /// Check layer shapes chain together and end in one logit per label
    pub fn validate(&self) -> Result<(), ArtifactError> {
        if self.layers.is_empty() {
            return Err(ArtifactError::Invalid("network has no layers".into()));
        }
        if self.labels.len() < 2 {
            return Err(ArtifactError::Invalid(format!(
                "need at least 2 labels, got {}",
                self.labels.len()
            )));
        }

        let mut expected_inputs = self.layers[0].inputs();
        if expected_inputs == 0 {
            return Err(ArtifactError::Invalid("first layer has no inputs".into()));
        }

        for (index, layer) in self.layers.iter().enumerate() {
            if layer.outputs() == 0 || layer.bias.len() != layer.outputs() {
                return Err(ArtifactError::Invalid(format!(
                    "layer {}: {} weight rows, {} biases",
                    index,
                    layer.outputs(),
                    layer.bias.len()
                )));
            }
            if layer.weights.iter().any(|row| row.len() != expected_inputs) {
                return Err(ArtifactError::Invalid(format!(
                    "layer {}: expected {} inputs per row",
                    index, expected_inputs
                )));
            }
            let finite = layer
                .weights
                .iter()
                .flatten()
                .chain(&layer.bias)
                .all(|v| v.is_finite());
            if !finite {
                return Err(ArtifactError::Invalid(format!(
                    "layer {}: non-finite parameter",
                    index
                )));
            }
            expected_inputs = layer.outputs();
        }

        if expected_inputs != self.labels.len() {
            return Err(ArtifactError::Invalid(format!(
                "{} outputs for {} labels",
                expected_inputs,
                self.labels.len()
            )));
        }

        Ok(())
    }

    pub fn input_len(&self) -> usize {
        self.layers.first().map(|l| l.inputs()).unwrap_or(0)
    }

    /// Logits for one input vector
    pub fn forward(&self, input: &[f32]) -> Result<Vec<f32>, PredictionError> {
        if input.len() != self.input_len() {
            return Err(PredictionError::FeatureMismatch {
                expected: self.input_len(),
                actual: input.len(),
            });
        }

        let last = self.layers.len().saturating_sub(1);
        let mut activations = input.to_vec();
        for (index, layer) in self.layers.iter().enumerate() {
            activations = layer.forward(&activations);
            if index < last {
                activations.iter_mut().for_each(|v| *v = v.max(0.0));
            }
        }
        Ok(activations)
    }
}

/// Numerically stable softmax
pub fn softmax(logits: &[f32]) -> Vec<f64> {
    let max = logits
        .iter()
        .map(|&v| v as f64)
        .fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|&v| (v as f64 - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

impl HolisticModel for DenseNetwork {
    fn predict(&self, features: &[f32]) -> Result<(Label, f64), PredictionError> {
        let probabilities = softmax(&self.forward(features)?);

        let (index, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .ok_or_else(|| PredictionError::InvalidOutput("empty output".into()))?;

        if !confidence.is_finite() {
            return Err(PredictionError::InvalidOutput(
                "non-finite probability".into(),
            ));
        }

        let label = self.labels.get(index).copied().unwrap_or(Label::Unknown);
        Ok((label, confidence))
    }
}
