//! Core value types shared by extractors, classifiers and the result store

use crate::error::ExtractionError;
use chrono::{DateTime, Utc};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Feature-extraction family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    /// Histogram of oriented gradients (1764 values)
    Hog,
    /// 68-point facial landmark geometry (136 values)
    Dlib,
    /// Deep convolutional embedding
    Resnet,
    /// Grayscale 64×64 pixels (4096 values)
    RawPixels,
    /// Grayscale 64×64 pixels after a JPEG q30 round trip (4096 values)
    CompressedPixels,
}

impl Encoding {
    pub const ALL: [Encoding; 5] = [
        Encoding::Hog,
        Encoding::Dlib,
        Encoding::Resnet,
        Encoding::RawPixels,
        Encoding::CompressedPixels,
    ];

    /// Parse an encoding tag; unrecognized tags yield `None`
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "hog" => Some(Encoding::Hog),
            "dlib" => Some(Encoding::Dlib),
            "resnet" => Some(Encoding::Resnet),
            "raw_pixels" => Some(Encoding::RawPixels),
            "compressed_pixels" => Some(Encoding::CompressedPixels),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Hog => "hog",
            Encoding::Dlib => "dlib",
            Encoding::Resnet => "resnet",
            Encoding::RawPixels => "raw_pixels",
            Encoding::CompressedPixels => "compressed_pixels",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Binary verdict plus the "no decision" value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Truth,
    Lie,
    Unknown,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Truth => "truth",
            Label::Lie => "lie",
            Label::Unknown => "unknown",
        }
    }

    /// Lenient parse used for persisted rows; anything unrecognized is `Unknown`
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "truth" => Label::Truth,
            "lie" => Label::Lie,
            _ => Label::Unknown,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered, finite, non-empty feature values tagged with their encoding
///
/// Absence of features is expressed as `Option<FeatureVector>::None`, never
/// as an empty vector.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    encoding: Encoding,
    values: Vec<f32>,
}

impl FeatureVector {
    pub fn new(encoding: Encoding, values: Vec<f32>) -> Result<Self, ExtractionError> {
        if values.is_empty() {
            return Err(ExtractionError::InvalidFeatures(format!(
                "{} extractor produced no values",
                encoding
            )));
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(ExtractionError::InvalidFeatures(format!(
                "{} value at index {} is not finite",
                encoding, index
            )));
        }
        Ok(Self { encoding, values })
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Image to analyze: a file or an uploaded buffer
#[derive(Debug, Clone)]
pub enum ImageRef {
    Path(PathBuf),
    Bytes {
        /// Display name persisted as the image reference
        name: String,
        /// Client-supplied file name, if any
        filename: Option<String>,
        data: Vec<u8>,
    },
}

impl ImageRef {
    /// Value stored in the `image_path` column
    pub fn display_name(&self) -> String {
        match self {
            ImageRef::Path(path) => path.display().to_string(),
            ImageRef::Bytes { name, .. } => name.clone(),
        }
    }

    /// Value stored in the `original_filename` column
    pub fn original_filename(&self) -> String {
        match self {
            ImageRef::Path(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            ImageRef::Bytes { name, filename, .. } => {
                filename.clone().unwrap_or_else(|| name.clone())
            }
        }
    }

    /// Decode into an in-memory image (format sniffed from content)
    pub fn decode(&self) -> Result<DynamicImage, ExtractionError> {
        match self {
            ImageRef::Path(path) => image::io::Reader::open(path)
                .map_err(|e| ExtractionError::ImageLoad(format!("{}: {}", path.display(), e)))?
                .with_guessed_format()
                .map_err(|e| ExtractionError::ImageLoad(format!("{}: {}", path.display(), e)))?
                .decode()
                .map_err(|e| ExtractionError::ImageLoad(format!("{}: {}", path.display(), e))),
            ImageRef::Bytes { name, data, .. } => image::load_from_memory(data)
                .map_err(|e| ExtractionError::ImageLoad(format!("{}: {}", name, e))),
        }
    }
}

/// Which prediction tier produced a label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionSource {
    Holistic,
    SavedClassifier,
    External,
    Statistical,
    /// No features, or every tier failed
    None,
}

impl PredictionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionSource::Holistic => "holistic",
            PredictionSource::SavedClassifier => "saved_classifier",
            PredictionSource::External => "external",
            PredictionSource::Statistical => "statistical",
            PredictionSource::None => "none",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "holistic" => Some(PredictionSource::Holistic),
            "saved_classifier" => Some(PredictionSource::SavedClassifier),
            "external" => Some(PredictionSource::External),
            "statistical" => Some(PredictionSource::Statistical),
            "none" => Some(PredictionSource::None),
            _ => None,
        }
    }
}

/// Label and confidence in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub label: Label,
    pub confidence: f64,
    pub source: PredictionSource,
}

impl Prediction {
    /// `("unknown", 0.5)`
    pub fn unknown() -> Self {
        Self {
            label: Label::Unknown,
            confidence: 0.5,
            source: PredictionSource::None,
        }
    }
}

/// One completed method for one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub image_path: String,
    pub original_filename: String,
    pub encoding_type: String,
    pub classifier_type: String,
    pub prediction: Label,
    pub confidence: f64,
    /// Seconds spent on image decoding, extraction and prediction
    pub processing_time: f64,
    pub features_extracted: i64,
    pub timestamp: DateTime<Utc>,
    pub model_combination: String,
    /// Absent on rows written before the column existed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction_source: Option<PredictionSource>,
}

/// Persisted record with its row id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: i64,
    #[serde(flatten)]
    pub record: AnalysisRecord,
}
