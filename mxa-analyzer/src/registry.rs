//! Capability Registry
//!
//! Records which optional collaborators are available to the analyzer. The
//! registry is assembled once (by [`crate::loader::ModelLoader`] or by the
//! builder in tests) and shared read-only behind an `Arc`.

use crate::error::{ExtractionError, PredictionError};
use crate::extractors::face::HaarFaceDetector;
use crate::extractors::FeatureExtractor;
use crate::models::backbone::Tensor;
use crate::models::classifier::{ClassifierFamily, SavedClassifier};
use crate::models::landmarks::{BoundingBox, Shape};
use crate::types::Label;
use image::GrayImage;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Learned model applied to the raw feature vector of any encoding
pub trait HolisticModel: Send + Sync {
    fn predict(&self, features: &[f32]) -> Result<(Label, f64), PredictionError>;
}

/// Regresses facial landmarks inside a detected face region
pub trait LandmarkPredictor: Send + Sync {
    fn num_landmarks(&self) -> usize;
    fn predict(&self, image: &GrayImage, face: &BoundingBox) -> Result<Shape, ExtractionError>;
}

/// Finds the primary face region, if any
pub trait FaceDetector: Send + Sync {
    fn detect(&self, image: &GrayImage) -> Option<BoundingBox>;
}

/// Deep embedding network with its classification head removed
pub trait EmbeddingBackbone: Send + Sync {
    /// `(width, height)` expected by `embed`
    fn input_size(&self) -> (u32, u32);
    fn embed(&self, input: &Tensor) -> Result<Vec<f32>, ExtractionError>;
}

/// Verdict of an external classification routine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExternalVerdict {
    pub label: Label,
    /// Routines that only return a label leave this unset
    pub confidence: Option<f64>,
}

/// Domain classification routine registered by the embedding application
pub trait ExternalClassifier: Send + Sync {
    fn classify(
        &self,
        features: &[f32],
        classifier_tag: &str,
    ) -> Result<ExternalVerdict, PredictionError>;
}

/// Named extraction entry points supplied from outside the engine
#[derive(Default, Clone)]
pub struct EncodingModule {
    entry_points: HashMap<String, Arc<dyn FeatureExtractor>>,
}

impl EncodingModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry_point(
        mut self,
        name: impl Into<String>,
        extractor: Arc<dyn FeatureExtractor>,
    ) -> Self {
        self.entry_points.insert(name.into(), extractor);
        self
    }

    pub fn entry_point(&self, name: &str) -> Option<Arc<dyn FeatureExtractor>> {
        self.entry_points.get(name).cloned()
    }

    pub fn entry_point_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entry_points.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Availability summary reported by `/health` and `capabilities`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapabilityFlags {
    pub holistic_model: bool,
    pub landmark_predictor: bool,
    pub embedding_backbone: bool,
    /// Tags with a loaded `<tag>_model.json`, sorted
    pub saved_classifiers: Vec<String>,
    pub external_encoding_module: bool,
    pub external_classifier: bool,
}

impl CapabilityFlags {
    /// True when every artifact loaded from disk is present
    pub fn is_complete(&self) -> bool {
        self.holistic_model && self.landmark_predictor && self.embedding_backbone
    }
}

pub struct CapabilityRegistry {
    holistic: Option<Arc<dyn HolisticModel>>,
    landmark_predictor: Option<Arc<dyn LandmarkPredictor>>,
    face_detector: Arc<dyn FaceDetector>,
    backbone: Option<Arc<dyn EmbeddingBackbone>>,
    classifiers: HashMap<String, Arc<SavedClassifier>>,
    external_classifier: Option<Arc<dyn ExternalClassifier>>,
    encoding_module: Option<Arc<EncodingModule>>,
}

impl CapabilityRegistry {
    pub fn builder() -> CapabilityRegistryBuilder {
        CapabilityRegistryBuilder::default()
    }

    /// Built-in strategies only
    pub fn empty() -> Self {
        Self::builder().build()
    }

    pub fn holistic(&self) -> Option<&Arc<dyn HolisticModel>> {
        self.holistic.as_ref()
    }

    pub fn landmark_predictor(&self) -> Option<&Arc<dyn LandmarkPredictor>> {
        self.landmark_predictor.as_ref()
    }

    pub fn face_detector(&self) -> &Arc<dyn FaceDetector> {
        &self.face_detector
    }

    pub fn backbone(&self) -> Option<&Arc<dyn EmbeddingBackbone>> {
        self.backbone.as_ref()
    }

    pub fn external_classifier(&self) -> Option<&Arc<dyn ExternalClassifier>> {
        self.external_classifier.as_ref()
    }

    pub fn encoding_module(&self) -> Option<&Arc<EncodingModule>> {
        self.encoding_module.as_ref()
    }

    /// Saved classifier for a tag; `rf` and `random_forest` find each other
    pub fn classifier(&self, tag: &str) -> Option<&Arc<SavedClassifier>> {
        if let Some(found) = self.classifiers.get(tag) {
            return Some(found);
        }
        let family = ClassifierFamily::from_tag(tag)?;
        self.classifiers
            .get(family.short_tag())
            .or_else(|| self.classifiers.get(family.long_tag()))
    }

    pub fn flags(&self) -> CapabilityFlags {
        let mut saved_classifiers: Vec<String> = self.classifiers.keys().cloned().collect();
        saved_classifiers.sort();

        CapabilityFlags {
            holistic_model: self.holistic.is_some(),
            landmark_predictor: self.landmark_predictor.is_some(),
            embedding_backbone: self.backbone.is_some(),
            saved_classifiers,
            external_encoding_module: self.encoding_module.is_some(),
            external_classifier: self.external_classifier.is_some(),
        }
    }
}

/// Builder for dependency injection
#[derive(Default)]
pub struct CapabilityRegistryBuilder {
    holistic: Option<Arc<dyn HolisticModel>>,
    landmark_predictor: Option<Arc<dyn LandmarkPredictor>>,
    face_detector: Option<Arc<dyn FaceDetector>>,
    backbone: Option<Arc<dyn EmbeddingBackbone>>,
    classifiers: HashMap<String, Arc<SavedClassifier>>,
    external_classifier: Option<Arc<dyn ExternalClassifier>>,
    encoding_module: Option<Arc<EncodingModule>>,
}

impl CapabilityRegistryBuilder {
    pub fn holistic(mut self, model: Arc<dyn HolisticModel>) -> Self {
        self.holistic = Some(model);
        self
    }

    pub fn landmark_predictor(mut self, predictor: Arc<dyn LandmarkPredictor>) -> Self {
        self.landmark_predictor = Some(predictor);
        self
    }

    /// Replace the built-in face detector
    pub fn face_detector(mut self, detector: Arc<dyn FaceDetector>) -> Self {
        self.face_detector = Some(detector);
        self
    }

    pub fn backbone(mut self, backbone: Arc<dyn EmbeddingBackbone>) -> Self {
        self.backbone = Some(backbone);
        self
    }

    pub fn classifier(mut self, tag: impl Into<String>, classifier: SavedClassifier) -> Self {
        self.classifiers.insert(tag.into(), Arc::new(classifier));
        self
    }

    pub fn external_classifier(mut self, classifier: Arc<dyn ExternalClassifier>) -> Self {
        self.external_classifier = Some(classifier);
        self
    }

    pub fn encoding_module(mut self, module: Arc<EncodingModule>) -> Self {
        self.encoding_module = Some(module);
        self
    }

    pub fn build(self) -> CapabilityRegistry {
        CapabilityRegistry {
            holistic: self.holistic,
            landmark_predictor: self.landmark_predictor,
            face_detector: self
                .face_detector
                .unwrap_or_else(|| Arc::new(HaarFaceDetector::default())),
            backbone: self.backbone,
            classifiers: self.classifiers,
            external_classifier: self.external_classifier,
            encoding_module: self.encoding_module,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump_classifier() -> SavedClassifier {
        SavedClassifier::DecisionTree {
            classes: vec![Label::Truth, Label::Lie],
            nodes: vec![crate::models::classifier::TreeNode::Leaf {
                value: vec![1.0, 0.0],
            }],
        }
    }

    #[test]
    fn empty_registry_reports_nothing_loaded() {
        let flags = CapabilityRegistry::empty().flags();
        assert!(!flags.holistic_model);
        assert!(!flags.landmark_predictor);
        assert!(!flags.embedding_backbone);
        assert!(flags.saved_classifiers.is_empty());
        assert!(!flags.is_complete());
    }

    #[test]
    fn classifier_lookup_accepts_aliases() {
        let registry = CapabilityRegistry::builder()
            .classifier("random_forest", stump_classifier())
            .classifier("dt", stump_classifier())
            .build();

        assert!(registry.classifier("rf").is_some());
        assert!(registry.classifier("random_forest").is_some());
        assert!(registry.classifier("decision_tree").is_some());
        assert!(registry.classifier("lr").is_none());
        assert!(registry.classifier("svm").is_none());
        assert_eq!(
            registry.flags().saved_classifiers,
            vec!["dt".to_string(), "random_forest".to_string()]
        );
    }
}
