//! Model artifact loader
//!
//! Builds a [`CapabilityRegistry`] from the model directory. Every artifact
//! is optional: a missing or invalid file is logged as a degraded-mode
//! warning and the corresponding capability stays unavailable. Loading
//! never fails.

use crate::models::{ConvBackbone, DenseNetwork, SavedClassifier, ShapePredictor};
use crate::registry::{CapabilityRegistry, CapabilityRegistryBuilder};
use mxa_common::config::ModelsConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Suffix identifying per-tag classifier files: `<tag>_model.json`
pub const CLASSIFIER_SUFFIX: &str = "_model.json";

#[derive(Clone)]
pub struct ModelLoader {
    config: ModelsConfig,
    root_folder: PathBuf,
}

impl ModelLoader {
    pub fn new(config: ModelsConfig, root_folder: impl Into<PathBuf>) -> Self {
        Self {
            config,
            root_folder: root_folder.into(),
        }
    }

    pub fn model_directory(&self) -> PathBuf {
        self.config.model_directory(&self.root_folder)
    }

    /// Load every available artifact into `builder`
    pub fn load_into(&self, mut builder: CapabilityRegistryBuilder) -> CapabilityRegistryBuilder {
        let directory = self.model_directory();
        info!("Loading model artifacts from {}", directory.display());

        let holistic_path = self.artifact(&self.config.holistic_model);
        if let Some(model) = load_artifact("holistic model", &holistic_path, DenseNetwork::load) {
            info!(
                path = %holistic_path.display(),
                inputs = model.input_len(),
                "Loaded holistic model"
            );
            builder = builder.holistic(Arc::new(model));
        }

        let predictor_path = self.artifact(&self.config.landmark_predictor);
        if let Some(predictor) =
            load_artifact("landmark predictor", &predictor_path, ShapePredictor::load)
        {
            info!(
                path = %predictor_path.display(),
                stages = predictor.num_cascade_stages(),
                "Loaded landmark predictor"
            );
            builder = builder.landmark_predictor(Arc::new(predictor));
        }

        let backbone_path = self.artifact(&self.config.embedding_backbone);
        if let Some(backbone) =
            load_artifact("embedding backbone", &backbone_path, ConvBackbone::load)
        {
            info!(
                path = %backbone_path.display(),
                embedding_len = backbone.embedding_len(),
                "Loaded embedding backbone"
            );
            builder = builder.backbone(Arc::new(backbone));
        }

        let reserved = [holistic_path, predictor_path, backbone_path];
        for (tag, path) in classifier_files(&directory, &reserved) {
            if let Some(classifier) = load_artifact("saved classifier", &path, SavedClassifier::load)
            {
                info!(
                    classifier = %tag,
                    family = classifier.family().long_tag(),
                    "Loaded saved classifier"
                );
                builder = builder.classifier(tag, classifier);
            }
        }

        builder
    }

    /// Registry holding only what is on disk
    pub fn load(&self) -> CapabilityRegistry {
        self.load_into(CapabilityRegistry::builder()).build()
    }

    fn artifact(&self, file: &Path) -> PathBuf {
        self.config.artifact_path(&self.root_folder, file)
    }
}

fn load_artifact<T, E, F>(kind: &str, path: &Path, load: F) -> Option<T>
where
    E: std::fmt::Display,
    F: FnOnce(&Path) -> Result<T, E>,
{
    if !path.exists() {
        warn!(
            artifact = kind,
            path = %path.display(),
            "Model artifact not found, running in degraded mode"
        );
        return None;
    }

    match load(path) {
        Ok(artifact) => Some(artifact),
        Err(e) => {
            warn!(
                artifact = kind,
                path = %path.display(),
                error = %e,
                "Model artifact failed to load, running in degraded mode"
            );
            None
        }
    }
}

/// `(tag, path)` for every `<tag>_model.json`, sorted by tag
///
/// Paths in `reserved` belong to the named artifacts and are never read as
/// classifiers, even when their file name fits the pattern.
fn classifier_files(directory: &Path, reserved: &[PathBuf]) -> Vec<(String, PathBuf)> {
    let entries = match std::fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(
                path = %directory.display(),
                error = %e,
                "Model directory not readable, no saved classifiers"
            );
            return Vec::new();
        }
    };

    let mut files: Vec<(String, PathBuf)> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && !reserved.contains(path))
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?;
            let tag = name.strip_suffix(CLASSIFIER_SUFFIX)?;
            (!tag.is_empty()).then(|| (tag.to_string(), path.clone()))
        })
        .collect();

    files.sort();
    files
}
