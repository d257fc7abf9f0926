//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration comes from a single TOML file. Every field has a
//! compiled default, so a missing file (or missing section) never prevents
//! startup; it is logged and defaults are used instead.
//!
//! # Resolution order
//!
//! Config file path:
//! 1. Command-line argument
//! 2. `MXA_CONFIG` environment variable
//! 3. `<user config dir>/mxa/mxa.toml`
//! 4. No file (compiled defaults)
//!
//! Root folder:
//! 1. `MXA_ROOT_FOLDER` environment variable
//! 2. `root_folder` from the TOML file
//! 3. OS-dependent compiled default

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the TOML config file
pub const CONFIG_ENV_VAR: &str = "MXA_CONFIG";

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV_VAR: &str = "MXA_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DEFAULT_DATABASE_FILE: &str = "mxa.db";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database and (by default) the model directory
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Explicit database path; defaults to `<root_folder>/mxa.db`
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub models: ModelsConfig,

    #[serde(default)]
    pub analysis: AnalysisConfig,
}

/// HTTP server bind address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Locations of the optional model artifacts
///
/// Relative file names are resolved against `directory`. A missing artifact
/// is a degraded mode, never a startup failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Directory scanned for artifacts and `<tag>_model.json` classifiers;
    /// defaults to `<root_folder>/models`
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Holistic dense network (JSON)
    #[serde(default = "default_holistic_model")]
    pub holistic_model: PathBuf,

    /// 68-point landmark predictor (bincode)
    #[serde(default = "default_landmark_predictor")]
    pub landmark_predictor: PathBuf,

    /// Convolutional embedding backbone (JSON)
    #[serde(default = "default_embedding_backbone")]
    pub embedding_backbone: PathBuf,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            directory: None,
            holistic_model: default_holistic_model(),
            landmark_predictor: default_landmark_predictor(),
            embedding_backbone: default_embedding_backbone(),
        }
    }
}

impl ModelsConfig {
    /// Resolve an artifact file name against the model directory
    pub fn artifact_path(&self, root_folder: &Path, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.model_directory(root_folder).join(file)
        }
    }

    /// Effective model directory
    pub fn model_directory(&self, root_folder: &Path) -> PathBuf {
        self.directory
            .clone()
            .unwrap_or_else(|| root_folder.join("models"))
    }
}

/// Analysis engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Methods run when a caller does not name any
    #[serde(default = "default_methods")]
    pub default_methods: Vec<String>,

    /// Optional per-extraction deadline in milliseconds
    #[serde(default)]
    pub extraction_timeout_ms: Option<u64>,

    /// Upper bound on lock-contention retries for a batch append
    #[serde(default = "default_max_lock_wait_ms")]
    pub db_max_lock_wait_ms: u64,

    /// Replacement for the built-in method vocabulary file
    #[serde(default)]
    pub methods_file: Option<PathBuf>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            default_methods: default_methods(),
            extraction_timeout_ms: None,
            db_max_lock_wait_ms: default_max_lock_wait_ms(),
            methods_file: None,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5731
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_holistic_model() -> PathBuf {
    PathBuf::from("balanced_model.json")
}

fn default_landmark_predictor() -> PathBuf {
    PathBuf::from("shape_predictor_68_face_landmarks.bin")
}

fn default_embedding_backbone() -> PathBuf {
    PathBuf::from("embedding_backbone.json")
}

fn default_max_lock_wait_ms() -> u64 {
    5000
}

fn default_methods() -> Vec<String> {
    [
        "hog_rf",
        "hog_dt",
        "dlib_rf",
        "dlib_dt",
        "resnet_rf",
        "resnet_dt",
        "resnet_lr",
        "raw_pixels_rf",
        "compressed_pixels_rf",
    ]
    .iter()
    .map(|m| m.to_string())
    .collect()
}

impl TomlConfig {
    /// Parse a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
    }

    /// Resolve and load the configuration, falling back to defaults
    ///
    /// A config file named explicitly (CLI or environment) that cannot be
    /// parsed is an error; a missing default-location file is not.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = cli_path {
            info!("Loading configuration from {}", path.display());
            return Self::from_file(path);
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let path = PathBuf::from(path);
            info!("Loading configuration from {} ({})", path.display(), CONFIG_ENV_VAR);
            return Self::from_file(&path);
        }

        if let Some(path) = default_config_path() {
            if path.exists() {
                info!("Loading configuration from {}", path.display());
                return Self::from_file(&path);
            }
        }

        warn!("No configuration file found, using compiled defaults");
        Ok(Self::default())
    }

    /// Effective root folder (environment → TOML → compiled default)
    pub fn root_folder(&self) -> PathBuf {
        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV_VAR) {
            return PathBuf::from(path);
        }
        self.root_folder
            .clone()
            .unwrap_or_else(default_root_folder)
    }

    /// Effective database path
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.root_folder().join(DEFAULT_DATABASE_FILE))
    }

    /// Serialize and write the configuration (used by `--write-default-config`)
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// `<user config dir>/mxa/mxa.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("mxa").join("mxa.toml"))
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("mxa"))
        .unwrap_or_else(|| PathBuf::from("./mxa_data"))
}
