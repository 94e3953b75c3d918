//! Configuration management for the loan explanation pipeline

use crate::models::booster::BoosterParams;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub artifacts: ArtifactsConfig,
    pub training: TrainingConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// Where the artifact set and its training data live
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    /// Path of the persisted artifact set (JSON)
    pub path: PathBuf,
    /// CSV used when no artifact set exists yet
    pub dataset_path: PathBuf,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("artifacts/loan_model.json"),
            dataset_path: PathBuf::from("data/loans.csv"),
        }
    }
}

/// Training procedure settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Share of each class held out for evaluation
    pub test_fraction: f64,
    /// Seed of the stratified split
    pub seed: u64,
    /// Gradient boosting hyper-parameters
    pub booster: BoosterParams,
}

fn default_test_fraction() -> f64 {
    0.2
}

fn default_seed() -> u64 {
    42
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_fraction: default_test_fraction(),
            seed: default_seed(),
            booster: BoosterParams::default(),
        }
    }
}

/// Request processing settings for the CLI
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of applications explained concurrently
    pub workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default file plus `LOAN__*` environment
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path. The file is optional;
    /// environment variables such as `LOAN__TRAINING__SEED` override it.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix("LOAN")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config
            .training
            .booster
            .validate()
            .context("Invalid training configuration")?;
        Ok(config)
    }
}
