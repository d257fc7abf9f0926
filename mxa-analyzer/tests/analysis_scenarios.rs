//! End-to-end analysis scenarios over a real (temporary) database
//!
//! No model artifacts are present unless a test writes them, so predictions
//! come from the statistical tier.

mod helpers;

use helpers::{gray_png, synthetic_face_png, test_analyzer, test_config};
use mxa_analyzer::analyzer::Extensions;
use mxa_analyzer::error::{AnalysisError, ExtractionError};
use mxa_analyzer::extractors::FeatureExtractor;
use mxa_analyzer::registry::EncodingModule;
use mxa_analyzer::types::{ImageRef, Label, PredictionSource};
use mxa_analyzer::Analyzer;
use std::sync::Arc;

fn upload(name: &str, data: Vec<u8>) -> ImageRef {
    ImageRef::Bytes {
        name: name.to_string(),
        filename: Some(format!("{}.png", name)),
        data,
    }
}

fn ids(methods: &[&str]) -> Vec<String> {
    methods.iter().map(|m| m.to_string()).collect()
}

/// External entry point that always fails
struct BrokenExtractor;

impl FeatureExtractor for BrokenExtractor {
    fn name(&self) -> &str {
        "broken"
    }

    fn extract(&self, _image: &image::DynamicImage) -> Result<Vec<f32>, ExtractionError> {
        Err(ExtractionError::Computation("simulated failure".into()))
    }
}

/// External entry point that returns immediately
struct InstantExtractor;

impl FeatureExtractor for InstantExtractor {
    fn name(&self) -> &str {
        "instant"
    }

    fn extract(&self, _image: &image::DynamicImage) -> Result<Vec<f32>, ExtractionError> {
        Ok(vec![1.0, 2.0])
    }
}

#[tokio::test]
async fn gray_image_hog_and_landmarks_without_artifacts() {
    let (_dir, analyzer) = test_analyzer().await.unwrap();

    let records = analyzer
        .analyze(&upload("gray", gray_png(64, 64, 128)), Some(&ids(&["hog_rf", "dlib_dt"])))
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].encoding_type, "hog");
    assert_eq!(records[0].classifier_type, "rf");
    assert_eq!(records[0].features_extracted, 1764);
    assert_eq!(records[1].encoding_type, "dlib");
    assert_eq!(records[1].features_extracted, 136);
    assert_eq!(records[1].model_combination, "Dlib + Dt");

    for record in &records {
        assert!((0.0..=1.0).contains(&record.confidence));
        assert_ne!(record.prediction, Label::Unknown);
        assert_eq!(record.prediction_source, Some(PredictionSource::Statistical));
        assert_eq!(record.image_path, "gray");
        assert_eq!(record.original_filename, "gray.png");
    }
}

#[tokio::test]
async fn invalid_identifier_is_skipped() {
    let (_dir, analyzer) = test_analyzer().await.unwrap();

    let records = analyzer
        .analyze(&upload("img", gray_png(64, 64, 90)), Some(&ids(&["x", "hog_rf"])))
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].encoding_type, "hog");
}

#[tokio::test]
async fn empty_store_statistics() {
    let (_dir, analyzer) = test_analyzer().await.unwrap();

    let stats = analyzer.statistics().await.unwrap();
    assert_eq!(stats.total_analyses, 0);
    assert!(stats.by_combination.is_empty());
    assert!(stats.prediction_distribution.is_empty());
    assert!(stats.timing_by_encoding.is_empty());
}

#[tokio::test]
async fn failing_extractor_shortens_result_by_one() {
    let (dir, pool) = helpers::create_test_db().await.unwrap();
    let extensions = Extensions {
        encoding_module: Some(Arc::new(
            EncodingModule::new().with_entry_point("low_level_encoding", Arc::new(BrokenExtractor)),
        )),
        external_classifier: None,
    };
    let analyzer = Analyzer::with_extensions(pool, &test_config(dir.path()), extensions);

    let requested = ids(&["raw_pixels_rf", "hog_rf", "compressed_pixels_rf"]);
    let records = analyzer
        .analyze(&upload("img", gray_png(80, 60, 200)), Some(&requested))
        .await
        .unwrap();

    assert_eq!(records.len(), requested.len() - 1);
    assert_eq!(records[0].encoding_type, "raw_pixels");
    assert_eq!(records[1].encoding_type, "compressed_pixels");
    assert!(records.iter().all(|r| r.features_extracted == 4096));
}

#[tokio::test]
async fn resnet_without_backbone_is_skipped() {
    let (_dir, analyzer) = test_analyzer().await.unwrap();

    let records = analyzer
        .analyze(
            &upload("img", gray_png(64, 64, 128)),
            Some(&ids(&["resnet_lr", "raw_pixels_rf"])),
        )
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].encoding_type, "raw_pixels");
}

#[tokio::test]
async fn statistics_are_idempotent_and_reflect_batches() {
    let (_dir, analyzer) = test_analyzer().await.unwrap();

    analyzer
        .analyze(&upload("a", gray_png(64, 64, 10)), Some(&ids(&["hog_rf", "raw_pixels_rf"])))
        .await
        .unwrap();
    analyzer
        .analyze(&upload("b", gray_png(64, 64, 250)), Some(&ids(&["raw_pixels_rf"])))
        .await
        .unwrap();

    let first = analyzer.statistics().await.unwrap();
    let second = analyzer.statistics().await.unwrap();
    assert_eq!(first, second);

    assert_eq!(first.total_analyses, 3);
    let raw = first
        .by_combination
        .iter()
        .find(|c| c.model_combination == "Raw Pixels + Rf")
        .unwrap();
    assert_eq!(raw.count, 2);
    assert_eq!(first.timing_by_encoding.len(), 2);
    assert!(first
        .by_combination
        .windows(2)
        .all(|w| w[0].avg_confidence >= w[1].avg_confidence));

    let only_b = analyzer.results(10, Some("b")).await.unwrap();
    assert_eq!(only_b.len(), 1);
    let recent = analyzer.results(10, None).await.unwrap();
    assert_eq!(recent[0].record.image_path, "b");
}

#[tokio::test]
async fn image_file_paths_are_supported() {
    let (dir, analyzer) = test_analyzer().await.unwrap();
    let path = dir.path().join("face.png");
    std::fs::write(&path, gray_png(48, 48, 140)).unwrap();

    let records = analyzer
        .analyze(&ImageRef::Path(path.clone()), Some(&ids(&["hog_dt"])))
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].image_path, path.display().to_string());
    assert_eq!(records[0].original_filename, "face.png");
}

#[tokio::test]
async fn detected_face_without_predictor_skips_landmarks() {
    let (_dir, analyzer) = test_analyzer().await.unwrap();

    let records = analyzer
        .analyze(&upload("face", synthetic_face_png(64)), Some(&ids(&["dlib_rf", "hog_rf"])))
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].encoding_type, "hog");
}

#[tokio::test]
async fn undecodable_upload_produces_no_records() {
    let (_dir, analyzer) = test_analyzer().await.unwrap();

    let records = analyzer
        .analyze(&upload("junk", b"GIF89a but not really".to_vec()), None)
        .await
        .unwrap();

    assert!(records.is_empty());
    assert_eq!(analyzer.statistics().await.unwrap().total_analyses, 0);
}

#[tokio::test]
async fn persistence_failure_surfaces_and_rolls_back_the_batch() {
    let (dir, pool) = helpers::create_test_db().await.unwrap();
    sqlx::query(
        r#"
        CREATE TRIGGER reject_second_row BEFORE INSERT ON analysis_results
        WHEN (SELECT COUNT(*) FROM analysis_results) >= 1
        BEGIN SELECT RAISE(ABORT, 'second row rejected'); END
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();
    let analyzer = Analyzer::new(pool.clone(), &test_config(dir.path()));

    let result = analyzer
        .analyze(&upload("img", gray_png(64, 64, 128)), Some(&ids(&["hog_rf", "raw_pixels_rf"])))
        .await;

    assert!(matches!(result, Err(AnalysisError::Persistence(_))));
    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM analysis_results")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 0);
}

#[tokio::test]
async fn processing_time_includes_image_decoding() {
    let (dir, pool) = helpers::create_test_db().await.unwrap();
    let extensions = Extensions {
        encoding_module: Some(Arc::new(
            EncodingModule::new().with_entry_point("low_level_encoding", Arc::new(InstantExtractor)),
        )),
        external_classifier: None,
    };
    let analyzer = Analyzer::with_extensions(pool, &test_config(dir.path()), extensions);

    // Pseudo-random pixels barely compress, so decoding dominates the method
    let mut state = 0x2545_f491u32;
    let noise = image::GrayImage::from_fn(2048, 2048, |_, _| {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        image::Luma([(state >> 24) as u8])
    });

    let records = analyzer
        .analyze(&upload("noise", helpers::encode_png(noise)), Some(&ids(&["hog_rf"])))
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].features_extracted, 2);
    assert!(records[0].processing_time >= 0.001);
}
