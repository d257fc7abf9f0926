//! Tracing subscriber initialization
//!
//! `RUST_LOG` directives take precedence over the configured level.

use crate::config::LoggingConfig;
use crate::{Error, Result};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber
///
/// Logs go to stderr unless `logging.file` is set, in which case the file is
/// opened in append mode.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| Error::Config(format!("Invalid log level '{}': {}", config.level, e)))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match &config.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.try_init(),
    };

    installed.map_err(|e| Error::Internal(format!("Tracing already initialized: {}", e)))
}
