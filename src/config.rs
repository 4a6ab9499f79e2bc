use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Smallest training set the engine accepts, whatever the configuration says
pub const MIN_TRAINING_SAMPLES: usize = 10;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Training/inference engine configuration
    #[serde(default)]
    pub engine: EngineConfig,

    /// Snapshot and history storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the embedded defaults, an optional file and environment
    pub fn load() -> Result<Self> {
        let config_path =
            std::env::var("DAMAGE_CLF_CONFIG").unwrap_or_else(|_| "config/local.toml".to_string());

        let config: Config = config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(&config_path).required(false))
            // Override with environment variables, e.g. DAMAGE_CLF_ENGINE__SEED=7
            .add_source(
                config::Environment::with_prefix("DAMAGE_CLF")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        let fraction = self.engine.test_fraction;
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(AppError::Configuration(format!(
                "engine.test_fraction must be in (0, 1), got {}",
                fraction
            )));
        }

        if self.engine.min_training_samples < MIN_TRAINING_SAMPLES {
            return Err(AppError::Configuration(format!(
                "engine.min_training_samples must be at least {}, got {}",
                MIN_TRAINING_SAMPLES, self.engine.min_training_samples
            )));
        }

        if !(self.engine.var_smoothing.is_finite() && self.engine.var_smoothing > 0.0) {
            return Err(AppError::Configuration(format!(
                "engine.var_smoothing must be a positive finite number, got {}",
                self.engine.var_smoothing
            )));
        }

        if self.storage.backend == StorageBackend::Sled && self.storage.path.is_none() {
            return Err(AppError::Configuration(
                "storage.path is required for the sled backend".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Default proportion of samples held out for evaluation
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,

    /// Seed for the stratified split
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Minimum number of labeled samples required to train
    #[serde(default = "default_min_training_samples")]
    pub min_training_samples: usize,

    /// Fraction of the largest feature variance used as the variance floor
    #[serde(default = "default_var_smoothing")]
    pub var_smoothing: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            test_fraction: default_test_fraction(),
            seed: default_seed(),
            min_training_samples: default_min_training_samples(),
            var_smoothing: default_var_smoothing(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage backend type
    #[serde(default)]
    pub backend: StorageBackend,

    /// Path for the embedded database
    pub path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: Some(default_storage_path()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Sled,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

// Default value functions
fn default_test_fraction() -> f64 {
    0.2
}

fn default_seed() -> u64 {
    42
}

fn default_min_training_samples() -> usize {
    10
}

fn default_var_smoothing() -> f64 {
    1e-9
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("./data/model")
}

fn default_log_level() -> String {
    "info".to_string()
}
