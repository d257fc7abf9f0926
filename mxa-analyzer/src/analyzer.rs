//! Analysis orchestrator
//!
//! For one image and an ordered list of method identifiers, runs every
//! method sequentially (resolve → extract → predict), assembles one record
//! per completed method and persists the batch atomically. Methods that
//! cannot run are skipped with a warning; callers compare the result length
//! with the request length to detect partial skips.

use crate::classifiers::PredictionChain;
use crate::db::{AnalysisStatistics, ResultStore};
use crate::error::AnalysisError;
use crate::extractors::{run_extraction, DispatchTable, StrategySummary};
use crate::loader::ModelLoader;
use crate::methods::{resolve, MethodCatalog, MethodInfo};
use crate::registry::{CapabilityFlags, CapabilityRegistry, EncodingModule, ExternalClassifier};
use crate::types::{AnalysisRecord, Encoding, ImageRef, StoredRecord};
use chrono::Utc;
use mxa_common::config::TomlConfig;
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Collaborators supplied by an embedding application
///
/// Kept across [`Analyzer::reload_models`], which only re-reads artifacts
/// from disk.
#[derive(Clone, Default)]
pub struct Extensions {
    pub encoding_module: Option<Arc<EncodingModule>>,
    pub external_classifier: Option<Arc<dyn ExternalClassifier>>,
}

/// Self-test report: what is loaded and which strategy serves each encoding
#[derive(Debug, Clone, Serialize)]
pub struct Capabilities {
    pub flags: CapabilityFlags,
    pub strategies: Vec<StrategySummary>,
    pub entry_points: Vec<String>,
}

pub struct Analyzer {
    store: ResultStore,
    registry: Arc<CapabilityRegistry>,
    dispatch: DispatchTable,
    chain: PredictionChain,
    catalog: MethodCatalog,
    default_methods: Vec<String>,
    extraction_timeout: Option<Duration>,
    loader: Option<ModelLoader>,
    extensions: Extensions,
}

impl Analyzer {
    /// Build from configuration; missing artifacts degrade, never fail
    pub fn new(pool: SqlitePool, config: &TomlConfig) -> Self {
        Self::with_extensions(pool, config, Extensions::default())
    }

    pub fn with_extensions(pool: SqlitePool, config: &TomlConfig, extensions: Extensions) -> Self {
        let loader = ModelLoader::new(config.models.clone(), config.root_folder());
        let registry = build_registry(&loader, &extensions);

        let mut analyzer = Self::from_parts(
            ResultStore::new(pool, config.analysis.db_max_lock_wait_ms),
            registry,
            MethodCatalog::load(config.analysis.methods_file.as_deref()),
            config.analysis.default_methods.clone(),
            config.analysis.extraction_timeout_ms.map(Duration::from_millis),
        );
        analyzer.loader = Some(loader);
        analyzer.extensions = extensions;
        analyzer
    }

    /// Assemble from an explicit registry (dependency injection)
    pub fn from_parts(
        store: ResultStore,
        registry: CapabilityRegistry,
        catalog: MethodCatalog,
        default_methods: Vec<String>,
        extraction_timeout: Option<Duration>,
    ) -> Self {
        let registry = Arc::new(registry);
        let dispatch = DispatchTable::resolve(&registry);
        let chain = PredictionChain::new(Arc::clone(&registry));

        let flags = registry.flags();
        if !flags.is_complete() {
            warn!(
                holistic_model = flags.holistic_model,
                landmark_predictor = flags.landmark_predictor,
                embedding_backbone = flags.embedding_backbone,
                "Analyzer running in degraded mode"
            );
        }

        Self {
            store,
            registry,
            dispatch,
            chain,
            catalog,
            default_methods,
            extraction_timeout,
            loader: None,
            extensions: Extensions::default(),
        }
    }

    /// Run `methods` (or the configured default list) against one image
    ///
    /// Returns the records in request order, minus skipped methods. The
    /// whole batch is persisted in one transaction before returning.
    pub async fn analyze(
        &self,
        image: &ImageRef,
        methods: Option<&[String]>,
    ) -> Result<Vec<AnalysisRecord>, AnalysisError> {
        let method_ids = methods.unwrap_or(self.default_methods.as_slice());
        let image_path = image.display_name();
        let original_filename = image.original_filename();

        // Decoding happens once per call; its cost is charged to every method
        let decode_started = Instant::now();
        let source = image.clone();
        let decoded = match tokio::task::spawn_blocking(move || source.decode()).await {
            Ok(Ok(decoded)) => Arc::new(decoded),
            Ok(Err(e)) => {
                warn!(
                    image = %image_path,
                    error = %e,
                    "Image could not be decoded, skipping all methods"
                );
                return Ok(Vec::new());
            }
            Err(e) => return Err(AnalysisError::Worker(e.to_string())),
        };
        let decode_time = decode_started.elapsed();

        let mut records = Vec::with_capacity(method_ids.len());

        for method_id in method_ids {
            let Some(method) = resolve(method_id) else {
                warn!(method = %method_id, "Invalid method identifier, skipping");
                continue;
            };

            let Some(encoding) = Encoding::from_tag(&method.encoding) else {
                warn!(
                    method = %method_id,
                    encoding = %method.encoding,
                    "Unknown encoding, skipping method"
                );
                continue;
            };

            let started = Instant::now();

            let strategy = match self.dispatch.strategy(encoding) {
                Ok(strategy) => strategy,
                Err(e) => {
                    warn!(method = %method_id, error = %e, "Skipping method");
                    continue;
                }
            };

            let features = match run_extraction(
                strategy,
                encoding,
                Arc::clone(&decoded),
                self.extraction_timeout,
            )
            .await
            {
                Ok(features) => features,
                Err(e) => {
                    warn!(
                        method = %method_id,
                        encoding = %encoding,
                        error = %e,
                        "Feature extraction failed, skipping method"
                    );
                    continue;
                }
            };

            let prediction = self.chain.predict(Some(&features), &method.classifier);
            let processing_time = (decode_time + started.elapsed()).as_secs_f64();

            let record = AnalysisRecord {
                image_path: image_path.clone(),
                original_filename: original_filename.clone(),
                encoding_type: method.encoding.clone(),
                classifier_type: method.classifier.clone(),
                prediction: prediction.label,
                confidence: prediction.confidence,
                processing_time,
                features_extracted: features.len() as i64,
                timestamp: Utc::now(),
                model_combination: method.combination_label(),
                prediction_source: Some(prediction.source),
            };

            info!(
                method = %method_id,
                encoding = %encoding,
                classifier = %method.classifier,
                prediction = %record.prediction,
                confidence = record.confidence,
                source = prediction.source.as_str(),
                features = record.features_extracted,
                processing_time_ms = (processing_time * 1000.0) as u64,
                "Method completed"
            );

            records.push(record);
        }

        if records.len() < method_ids.len() {
            info!(
                image = %image_path,
                requested = method_ids.len(),
                completed = records.len(),
                "Analysis finished with skipped methods"
            );
        }

        self.store.append(&records).await?;
        Ok(records)
    }

    /// Method vocabulary
    pub fn methods(&self) -> &[MethodInfo] {
        self.catalog.methods()
    }

    pub fn default_methods(&self) -> &[String] {
        &self.default_methods
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            flags: self.registry.flags(),
            strategies: self.dispatch.summary(),
            entry_points: self
                .registry
                .encoding_module()
                .map(|module| module.entry_point_names())
                .unwrap_or_default(),
        }
    }

    pub async fn results(
        &self,
        limit: u32,
        image_path: Option<&str>,
    ) -> Result<Vec<StoredRecord>, AnalysisError> {
        Ok(self.store.query(limit, image_path).await?)
    }

    pub async fn statistics(&self) -> Result<AnalysisStatistics, AnalysisError> {
        Ok(self.store.statistics().await?)
    }

    /// Where reloaded artifacts come from
    ///
    /// `None` for analyzers assembled with [`Analyzer::from_parts`]; those
    /// keep their registry across reloads.
    pub fn model_source(&self) -> Option<ModelSource> {
        self.loader.as_ref().map(|loader| ModelSource {
            loader: loader.clone(),
            extensions: self.extensions.clone(),
        })
    }

    /// Swap in a freshly loaded registry and re-resolve the dispatch table
    pub fn install_registry(&mut self, registry: CapabilityRegistry) -> CapabilityFlags {
        self.registry = Arc::new(registry);
        self.chain = PredictionChain::new(Arc::clone(&self.registry));
        self.refresh_dispatch()
    }

    /// Re-read model artifacts in place
    ///
    /// Blocks on file I/O; async callers load through [`Analyzer::model_source`]
    /// off the runtime and finish with [`Analyzer::install_registry`].
    pub fn reload_models(&mut self) -> CapabilityFlags {
        match self.model_source() {
            Some(source) => self.install_registry(source.load()),
            None => self.refresh_dispatch(),
        }
    }

    fn refresh_dispatch(&mut self) -> CapabilityFlags {
        self.dispatch = DispatchTable::resolve(&self.registry);

        let flags = self.registry.flags();
        info!(
            holistic_model = flags.holistic_model,
            landmark_predictor = flags.landmark_predictor,
            embedding_backbone = flags.embedding_backbone,
            saved_classifiers = flags.saved_classifiers.len(),
            "Model artifacts reloaded"
        );
        flags
    }
}

/// Artifact loader plus the injected collaborators it is combined with
#[derive(Clone)]
pub struct ModelSource {
    loader: ModelLoader,
    extensions: Extensions,
}

impl ModelSource {
    /// Build a registry from disk; never fails, missing artifacts degrade
    pub fn load(&self) -> CapabilityRegistry {
        build_registry(&self.loader, &self.extensions)
    }
}

fn build_registry(loader: &ModelLoader, extensions: &Extensions) -> CapabilityRegistry {
    let mut builder = CapabilityRegistry::builder();
    if let Some(module) = &extensions.encoding_module {
        builder = builder.encoding_module(Arc::clone(module));
    }
    if let Some(classifier) = &extensions.external_classifier {
        builder = builder.external_classifier(Arc::clone(classifier));
    }
    loader.load_into(builder).build()
}
