//! Statistical placeholder classifier
//!
//! Last learned-free tier of the prediction chain. It carries no predictive
//! value; it only keeps the pipeline producing a labelled record when no
//! model is available.

use crate::models::classifier::ClassifierFamily;
use crate::types::Label;

const BASE_CONFIDENCE: f64 = 0.6;
const MAX_CONFIDENCE: f64 = 0.95;
const SPREAD_SCALE: f64 = 1000.0;

/// Population mean and standard deviation
pub fn mean_std(values: &[f32]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
    let variance = values
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    (mean, variance.sqrt())
}

/// Discount applied for a classifier tag; unknown tags are not discounted
pub fn tag_discount(tag: &str) -> f64 {
    ClassifierFamily::from_tag(tag)
        .map(|family| family.confidence_discount())
        .unwrap_or(1.0)
}

/// `truth` when mean > std, otherwise `lie`
pub fn classify(values: &[f32], tag: &str) -> (Label, f64) {
    let (mean, std) = mean_std(values);
    let label = if mean > std { Label::Truth } else { Label::Lie };
    let raw = (BASE_CONFIDENCE + (mean - std).abs() / SPREAD_SCALE).min(MAX_CONFIDENCE);
    (label, (raw * tag_discount(tag)).clamp(0.0, 1.0))
}
