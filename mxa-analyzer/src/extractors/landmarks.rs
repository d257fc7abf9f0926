//! Facial landmark encoding (`dlib`)
//!
//! Detect the primary face, regress 68 landmarks inside it and flatten the
//! (x, y) pairs in image coordinates. An image without a detectable face
//! yields an all-zero vector of the same length so downstream stages still
//! see a fixed-size input.

use super::FeatureExtractor;
use crate::error::ExtractionError;
use crate::models::landmarks::LANDMARK_COUNT;
use crate::registry::{FaceDetector, LandmarkPredictor};
use image::DynamicImage;
use std::sync::Arc;
use tracing::debug;

/// Flattened (x, y) pairs for 68 landmarks
pub const LANDMARK_FEATURES: usize = LANDMARK_COUNT * 2;

pub struct LandmarkExtractor {
    detector: Arc<dyn FaceDetector>,
    predictor: Option<Arc<dyn LandmarkPredictor>>,
}

impl LandmarkExtractor {
    pub fn new(
        detector: Arc<dyn FaceDetector>,
        predictor: Option<Arc<dyn LandmarkPredictor>>,
    ) -> Self {
        Self {
            detector,
            predictor,
        }
    }
}

impl FeatureExtractor for LandmarkExtractor {
    fn name(&self) -> &str {
        "builtin_landmarks"
    }

    fn extract(&self, image: &DynamicImage) -> Result<Vec<f32>, ExtractionError> {
        let gray = image.to_luma8();

        let Some(face) = self.detector.detect(&gray) else {
            debug!("No face detected; emitting zero landmark vector");
            return Ok(vec![0.0; LANDMARK_FEATURES]);
        };

        let predictor = self
            .predictor
            .as_ref()
            .ok_or(ExtractionError::MissingArtifact("landmark predictor"))?;

        let features = predictor.predict(&gray, &face)?.flatten();
        if features.len() != LANDMARK_FEATURES {
            return Err(ExtractionError::InvalidFeatures(format!(
                "expected {} landmark coordinates, got {}",
                LANDMARK_FEATURES,
                features.len()
            )));
        }

        Ok(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::face::synthetic_face;
    use crate::models::landmarks::{default_mean_shape, BoundingBox, Shape, ShapePredictor};
    use image::GrayImage;

    struct FixedDetector(Option<BoundingBox>);

    impl FaceDetector for FixedDetector {
        fn detect(&self, _image: &GrayImage) -> Option<BoundingBox> {
            self.0
        }
    }

    struct ShortPredictor;

    impl LandmarkPredictor for ShortPredictor {
        fn num_landmarks(&self) -> usize {
            5
        }

        fn predict(&self, _image: &GrayImage, _face: &BoundingBox) -> Result<Shape, ExtractionError> {
            Ok(Shape::zeros(5))
        }
    }

    fn face_box() -> Option<BoundingBox> {
        Some(BoundingBox::new(8.0, 8.0, 48.0, 48.0))
    }

    fn image() -> DynamicImage {
        DynamicImage::ImageLuma8(synthetic_face(64))
    }

    #[test]
    fn no_face_yields_zero_vector() {
        let extractor = LandmarkExtractor::new(Arc::new(FixedDetector(None)), None);
        let features = extractor.extract(&image()).unwrap();
        assert_eq!(features.len(), 136);
        assert!(features.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn face_without_predictor_is_an_error() {
        let extractor = LandmarkExtractor::new(Arc::new(FixedDetector(face_box())), None);
        assert!(matches!(
            extractor.extract(&image()),
            Err(ExtractionError::MissingArtifact("landmark predictor"))
        ));
    }

    #[test]
    fn mean_shape_predictor_places_points_inside_face() {
        let predictor = ShapePredictor::new(default_mean_shape(), Vec::new());
        let extractor = LandmarkExtractor::new(
            Arc::new(FixedDetector(face_box())),
            Some(Arc::new(predictor)),
        );

        let features = extractor.extract(&image()).unwrap();
        assert_eq!(features.len(), LANDMARK_FEATURES);
        assert!(features.iter().all(|&v| (8.0..=56.0).contains(&v)));
    }

    #[test]
    fn wrong_landmark_count_is_rejected() {
        let extractor = LandmarkExtractor::new(
            Arc::new(FixedDetector(face_box())),
            Some(Arc::new(ShortPredictor)),
        );
        assert!(matches!(
            extractor.extract(&image()),
            Err(ExtractionError::InvalidFeatures(_))
        ));
    }
}
