//! Feature Extractors and the encoding dispatch table
//!
//! Each encoding has an ordered list of candidate strategies: named external
//! entry points first, then the built-in implementation. The list is
//! resolved ONCE when the analyzer is built; at analysis time the chosen
//! strategy is simply invoked.
//!
//! | Encoding            | Candidates                                                   |
//! |---------------------|--------------------------------------------------------------|
//! | `hog`               | `low_level_encoding`, `extract_hog_features`, built-in       |
//! | `dlib`              | `high_level_encoding`, `extract_dlib_features`, built-in     |
//! | `resnet`            | `pretrained_encoding`, built-in (only with a loaded backbone)|
//! | `raw_pixels`        | built-in                                                     |
//! | `compressed_pixels` | built-in                                                     |
//!
//! A missing name falls through to the next candidate. A failure of the
//! chosen strategy does NOT: the method is skipped.

pub mod embedding;
pub mod face;
pub mod hog;
pub mod landmarks;
pub mod pixels;

use crate::error::{DispatchError, ExtractionError};
use crate::registry::CapabilityRegistry;
use crate::types::{Encoding, FeatureVector};
use crate::utils::panic_message;
use image::DynamicImage;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub use embedding::EmbeddingExtractor;
pub use face::HaarFaceDetector;
pub use hog::HogExtractor;
pub use landmarks::LandmarkExtractor;
pub use pixels::PixelExtractor;

/// Synchronous, CPU-bound feature extraction
///
/// Implementations must not mutate shared state; the same image is handed
/// to every method of an analysis call.
pub trait FeatureExtractor: Send + Sync {
    fn name(&self) -> &str;

    fn extract(&self, image: &DynamicImage) -> Result<Vec<f32>, ExtractionError>;
}

/// External entry-point names tried before the built-in strategy
pub fn entry_point_candidates(encoding: Encoding) -> &'static [&'static str] {
    match encoding {
        Encoding::Hog => &["low_level_encoding", "extract_hog_features"],
        Encoding::Dlib => &["high_level_encoding", "extract_dlib_features"],
        Encoding::Resnet => &["pretrained_encoding"],
        Encoding::RawPixels | Encoding::CompressedPixels => &[],
    }
}

/// Where a resolved strategy came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum StrategySource {
    ExternalEntryPoint(String),
    Builtin,
}

#[derive(Clone)]
pub struct ResolvedStrategy {
    pub source: StrategySource,
    pub extractor: Arc<dyn FeatureExtractor>,
}

/// Resolution outcome per encoding, for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct StrategySummary {
    pub encoding: Encoding,
    pub source: Option<StrategySource>,
}

/// Encoding → strategy, resolved once from a capability registry
#[derive(Clone, Default)]
pub struct DispatchTable {
    strategies: HashMap<Encoding, ResolvedStrategy>,
}

impl DispatchTable {
    pub fn resolve(registry: &CapabilityRegistry) -> Self {
        let mut strategies = HashMap::new();

        for encoding in Encoding::ALL {
            match Self::resolve_encoding(encoding, registry) {
                Some(strategy) => {
                    debug!(
                        encoding = %encoding,
                        source = ?strategy.source,
                        extractor = strategy.extractor.name(),
                        "Resolved extraction strategy"
                    );
                    strategies.insert(encoding, strategy);
                }
                None => {
                    warn!(
                        encoding = %encoding,
                        "No extraction strategy available; methods using this encoding will be skipped"
                    );
                }
            }
        }

        info!("Dispatch table resolved {} of {} encodings", strategies.len(), Encoding::ALL.len());
        Self { strategies }
    }

    fn resolve_encoding(encoding: Encoding, registry: &CapabilityRegistry) -> Option<ResolvedStrategy> {
        if let Some(module) = registry.encoding_module() {
            for name in entry_point_candidates(encoding) {
                if let Some(extractor) = module.entry_point(name) {
                    return Some(ResolvedStrategy {
                        source: StrategySource::ExternalEntryPoint(name.to_string()),
                        extractor,
                    });
                }
            }
        }

        builtin_strategy(encoding, registry).map(|extractor| ResolvedStrategy {
            source: StrategySource::Builtin,
            extractor,
        })
    }

    pub fn strategy(&self, encoding: Encoding) -> Result<&ResolvedStrategy, DispatchError> {
        self.strategies
            .get(&encoding)
            .ok_or_else(|| DispatchError::NoCompatibleMethod(encoding.to_string()))
    }

    pub fn summary(&self) -> Vec<StrategySummary> {
        Encoding::ALL
            .iter()
            .map(|encoding| StrategySummary {
                encoding: *encoding,
                source: self.strategies.get(encoding).map(|s| s.source.clone()),
            })
            .collect()
    }
}

fn builtin_strategy(
    encoding: Encoding,
    registry: &CapabilityRegistry,
) -> Option<Arc<dyn FeatureExtractor>> {
    match encoding {
        Encoding::Hog => Some(Arc::new(HogExtractor)),
        Encoding::Dlib => Some(Arc::new(LandmarkExtractor::new(
            Arc::clone(registry.face_detector()),
            registry.landmark_predictor().cloned(),
        ))),
        Encoding::Resnet => registry
            .backbone()
            .map(|backbone| Arc::new(EmbeddingExtractor::new(Arc::clone(backbone))) as Arc<dyn FeatureExtractor>),
        Encoding::RawPixels => Some(Arc::new(PixelExtractor::raw())),
        Encoding::CompressedPixels => Some(Arc::new(PixelExtractor::compressed())),
    }
}

/// Run a strategy on the blocking pool, optionally under a deadline
///
/// Panics inside the extractor surface as `ExtractionError::Panicked`. A
/// timed-out extraction keeps running to completion in the background; its
/// result is discarded.
pub async fn run_extraction(
    strategy: &ResolvedStrategy,
    encoding: Encoding,
    image: Arc<DynamicImage>,
    deadline: Option<Duration>,
) -> Result<FeatureVector, ExtractionError> {
    let extractor = Arc::clone(&strategy.extractor);
    let task = tokio::task::spawn_blocking(move || extractor.extract(&image));

    let joined = match deadline {
        Some(limit) => tokio::time::timeout(limit, task)
            .await
            .map_err(|_| ExtractionError::DeadlineExceeded(limit.as_millis() as u64))?,
        None => task.await,
    };

    let values = match joined {
        Ok(result) => result?,
        Err(e) if e.is_panic() => {
            return Err(ExtractionError::Panicked(panic_message(e.into_panic().as_ref())))
        }
        Err(e) => return Err(ExtractionError::Computation(e.to_string())),
    };

    FeatureVector::new(encoding, values)
}

/// Grayscale, Triangle-filtered resize shared by the built-in extractors
pub(crate) fn gray_resized(image: &DynamicImage, size: u32) -> Result<image::GrayImage, ExtractionError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(ExtractionError::Computation("image has zero area".into()));
    }
    Ok(image::imageops::resize(
        &image.to_luma8(),
        size,
        size,
        image::imageops::FilterType::Triangle,
    ))
}

// ============================================================================
// Mock Extractor for Testing
// ============================================================================


// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::mock::MockExtractor;
    use super::*;
    use crate::registry::EncodingModule;

    fn gray_image() -> Arc<DynamicImage> {
        Arc::new(DynamicImage::ImageLuma8(image::GrayImage::from_pixel(
            64,
            64,
            image::Luma([128]),
        )))
    }

    fn strategy(extractor: MockExtractor) -> ResolvedStrategy {
        ResolvedStrategy {
            source: StrategySource::Builtin,
            extractor: Arc::new(extractor),
        }
    }

    #[test]
    fn builtin_table_without_artifacts_lacks_resnet() {
        let table = DispatchTable::resolve(&CapabilityRegistry::empty());

        assert_eq!(table.strategy(Encoding::Hog).unwrap().source, StrategySource::Builtin);
        assert!(table.strategy(Encoding::Dlib).is_ok());
        assert!(table.strategy(Encoding::RawPixels).is_ok());
        assert!(table.strategy(Encoding::CompressedPixels).is_ok());
        assert_eq!(
            table.strategy(Encoding::Resnet).err(),
            Some(DispatchError::NoCompatibleMethod("resnet".into()))
        );
    }

    #[test]
    fn entry_points_are_tried_in_order() {
        let module = EncodingModule::new()
            .with_entry_point(
                "extract_hog_features",
                Arc::new(MockExtractor::returning("second", vec![2.0])),
            )
            .with_entry_point(
                "pretrained_encoding",
                Arc::new(MockExtractor::returning("embed", vec![3.0])),
            );
        let registry = CapabilityRegistry::builder()
            .encoding_module(Arc::new(module))
            .build();

        let table = DispatchTable::resolve(&registry);

        // `low_level_encoding` missing → falls through to the second name
        let hog = table.strategy(Encoding::Hog).unwrap();
        assert_eq!(
            hog.source,
            StrategySource::ExternalEntryPoint("extract_hog_features".into())
        );
        // Entry point makes resnet available without a backbone
        assert!(table.strategy(Encoding::Resnet).is_ok());
        // No external dlib names → built-in
        assert_eq!(table.strategy(Encoding::Dlib).unwrap().source, StrategySource::Builtin);
    }

    #[tokio::test]
    async fn extraction_failures_do_not_fall_through() {
        let failing = strategy(MockExtractor::failing("broken"));
        let result = run_extraction(&failing, Encoding::Hog, gray_image(), None).await;
        assert!(matches!(result, Err(ExtractionError::Computation(_))));
    }

    #[tokio::test]
    async fn panics_become_extraction_errors() {
        let panicking = strategy(MockExtractor::panicking("boom"));
        let result = run_extraction(&panicking, Encoding::Hog, gray_image(), None).await;
        assert!(matches!(result, Err(ExtractionError::Panicked(_))));
    }

    #[tokio::test]
    async fn non_finite_output_is_rejected() {
        let bad = strategy(MockExtractor::returning("nan", vec![1.0, f32::NAN]));
        let result = run_extraction(&bad, Encoding::Hog, gray_image(), None).await;
        assert!(matches!(result, Err(ExtractionError::InvalidFeatures(_))));
    }

    #[tokio::test]
    async fn deadline_is_enforced() {
        let slow = strategy(MockExtractor::sleeping("slow", Duration::from_millis(500)));
        let result = run_extraction(
            &slow,
            Encoding::Hog,
            gray_image(),
            Some(Duration::from_millis(20)),
        )
        .await;
        assert!(matches!(result, Err(ExtractionError::DeadlineExceeded(20))));
    }

    #[tokio::test]
    async fn successful_extraction_is_tagged_with_encoding() {
        let ok = strategy(MockExtractor::returning("ok", vec![0.5; 10]));
        let fv = run_extraction(&ok, Encoding::RawPixels, gray_image(), None)
            .await
            .unwrap();
        assert_eq!(fv.encoding(), Encoding::RawPixels);
        assert_eq!(fv.len(), 10);
    }
}
