//! Prediction fallback chain
//!
//! Tiers are tried in order; a tier that is unavailable, returns an error,
//! panics or produces an out-of-range confidence hands over to the next:
//!
//! 1. Holistic model on the raw feature vector
//! 2. Saved classifier for the method's tag
//! 3. External classification routine
//! 4. Statistical placeholder
//!
//! Exhausting every tier, or having no features at all, yields
//! `("unknown", 0.5)`.

pub mod statistical;

use crate::error::PredictionError;
use crate::registry::CapabilityRegistry;
use crate::types::{FeatureVector, Label, Prediction, PredictionSource};
use crate::utils::panic_message;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

/// Confidence assigned to external verdicts that carry none
pub const EXTERNAL_DEFAULT_CONFIDENCE: f64 = 0.8;

#[derive(Clone)]
pub struct PredictionChain {
    registry: Arc<CapabilityRegistry>,
}

impl PredictionChain {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self { registry }
    }

    pub fn predict(&self, features: Option<&FeatureVector>, classifier_tag: &str) -> Prediction {
        let Some(features) = features else {
            return Prediction::unknown();
        };
        let values = features.values();

        if let Some(model) = self.registry.holistic() {
            if let Some(prediction) = run_tier(PredictionSource::Holistic, classifier_tag, || {
                model.predict(values)
            }) {
                return prediction;
            }
        }

        if let Some(classifier) = self.registry.classifier(classifier_tag) {
            if let Some(prediction) =
                run_tier(PredictionSource::SavedClassifier, classifier_tag, || {
                    classifier.predict(values)
                })
            {
                return prediction;
            }
        }

        if let Some(external) = self.registry.external_classifier() {
            if let Some(prediction) = run_tier(PredictionSource::External, classifier_tag, || {
                external.classify(values, classifier_tag).map(|verdict| {
                    (
                        verdict.label,
                        verdict.confidence.unwrap_or(EXTERNAL_DEFAULT_CONFIDENCE),
                    )
                })
            }) {
                return prediction;
            }
        }

        if let Some(prediction) = run_tier(PredictionSource::Statistical, classifier_tag, || {
            Ok(statistical::classify(values, classifier_tag))
        }) {
            return prediction;
        }

        warn!(classifier = classifier_tag, "All prediction tiers failed");
        Prediction::unknown()
    }
}

/// Run one tier, converting errors, panics and bad confidences to `None`
fn run_tier<F>(source: PredictionSource, classifier_tag: &str, tier: F) -> Option<Prediction>
where
    F: FnOnce() -> Result<(Label, f64), PredictionError>,
{
    let outcome = match catch_unwind(AssertUnwindSafe(tier)) {
        Ok(outcome) => outcome,
        Err(payload) => Err(PredictionError::InvalidOutput(format!(
            "panicked: {}",
            panic_message(payload.as_ref())
        ))),
    };

    match outcome {
        Ok((label, confidence)) if confidence.is_finite() && (0.0..=1.0).contains(&confidence) => {
            debug!(
                tier = source.as_str(),
                classifier = classifier_tag,
                label = %label,
                confidence,
                "Prediction produced"
            );
            Some(Prediction {
                label,
                confidence,
                source,
            })
        }
        Ok((_, confidence)) => {
            warn!(
                tier = source.as_str(),
                classifier = classifier_tag,
                confidence,
                "Prediction tier returned out-of-range confidence, falling through"
            );
            None
        }
        Err(e) => {
            warn!(
                tier = source.as_str(),
                classifier = classifier_tag,
                error = %e,
                "Prediction tier failed, falling through"
            );
            None
        }
    }
}
