//! Configuration Loader
//!
//! Environment-aware loading of [`ConsumerSettings`] with the `config` crate.
//!
//! Sources, lowest precedence first:
//! 1. built-in defaults
//! 2. `<config_dir>/changefeed.toml`
//! 3. `<config_dir>/changefeed.<environment>.toml`
//! 4. environment variables such as `CHANGEFEED__PROCESSOR__BATCH_SIZE`
//!
//! An explicit file given with [`ConfigLoader::with_file`] replaces (2) and (3)
//! and must exist.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::error::{ConfigResult, ConfigurationError};
use super::ChangefeedConfig;
use crate::constants::{
    env, DEFAULT_BATCH_SIZE, DEFAULT_PROGRESS_CHANNEL_BUFFER_SIZE, DEFAULT_PROGRESS_INTERVAL_MS,
};
use crate::store::StoreEndpoint;

/// Everything a deployed consumer needs: where the store is and how to process it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerSettings {
    pub store: StoreEndpoint,
    #[serde(default)]
    pub processor: ChangefeedConfig,
}

impl ConsumerSettings {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.store.uri.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "store.uri",
                "store configuration",
            ));
        }

        if self.store.collection.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "store.collection",
                "store configuration",
            ));
        }

        self.processor.validate()
    }
}

/// Builder for loading [`ConsumerSettings`]
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config_directory: PathBuf,
    environment: String,
    explicit_file: Option<PathBuf>,
    environment_source: Option<config::Map<String, String>>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Loader rooted at `$CHANGEFEED_CONFIG_DIR` (or `./config`) for the detected environment
    pub fn new() -> Self {
        let config_directory = std::env::var(env::CONFIG_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"));

        Self {
            config_directory,
            environment: Self::detect_environment(),
            explicit_file: None,
            environment_source: None,
        }
    }

    /// Detect the deployment environment from `CHANGEFEED_ENV` or `APP_ENV`
    pub fn detect_environment() -> String {
        std::env::var(env::ENVIRONMENT)
            .or_else(|_| std::env::var(env::APP_ENVIRONMENT))
            .unwrap_or_else(|_| "development".to_string())
    }

    pub fn with_config_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.config_directory = directory.into();
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit_file = Some(path.into());
        self
    }

    /// Read overrides from the given map instead of the process environment
    pub fn with_environment_source(mut self, source: config::Map<String, String>) -> Self {
        self.environment_source = Some(source);
        self
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Load, merge and validate the settings
    pub fn load(&self) -> ConfigResult<ConsumerSettings> {
        let load_error = |error: config::ConfigError| {
            ConfigurationError::load_error(self.environment.as_str(), error)
        };

        let mut builder = Config::builder()
            .set_default("processor.batch_size", DEFAULT_BATCH_SIZE as i64)
            .map_err(load_error)?
            .set_default(
                "processor.progress_interval_ms",
                DEFAULT_PROGRESS_INTERVAL_MS as i64,
            )
            .map_err(load_error)?
            .set_default(
                "processor.progress_channel_buffer_size",
                DEFAULT_PROGRESS_CHANNEL_BUFFER_SIZE as i64,
            )
            .map_err(load_error)?;

        match &self.explicit_file {
            Some(path) => {
                if !path.is_file() {
                    return Err(ConfigurationError::config_file_not_found(path.clone()));
                }
                debug!(file = %path.display(), "Loading explicit configuration file");
                builder = builder.add_source(File::from(path.as_path()).required(true));
            }
            None => {
                let base = self.config_directory.join("changefeed.toml");
                let overrides = self
                    .config_directory
                    .join(format!("changefeed.{}.toml", self.environment));
                debug!(
                    base = %base.display(),
                    overrides = %overrides.display(),
                    "Loading configuration files"
                );
                builder = builder
                    .add_source(File::from(base).required(false))
                    .add_source(File::from(overrides).required(false));
            }
        }

        let environment_source = Environment::with_prefix(env::CONFIG_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .source(self.environment_source.clone());

        let settings: ConsumerSettings = builder
            .add_source(environment_source)
            .build()
            .map_err(load_error)?
            .try_deserialize()
            .map_err(load_error)?;

        settings.validate()?;

        info!(
            environment = %self.environment,
            collection = %settings.store.collection,
            batch_size = settings.processor.batch_size,
            progress_interval_ms = settings.processor.progress_interval_ms,
            "Configuration loaded successfully"
        );

        Ok(settings)
    }
}
