// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration file support for rnasim
//!
//! Loads configuration from .rnasimrc.toml in current directory or ~/.config/rnasim/config.toml,
//! then applies environment overrides.

use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::distance::{Metric, DEFAULT_CHUNK_SIZE};
use crate::embedding::provider::{
    DEFAULT_DUMMY_DIMENSION, DEFAULT_ENCODER_COMMAND, DEFAULT_MODEL_PATH,
};
use crate::errors::{Error, Result};
use crate::rank::DEFAULT_TOP_K;

/// Encoder provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderProviderType {
    #[default]
    Command,
    Dummy,
}

/// What search does with candidates whose dimension differs from the query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MismatchPolicy {
    /// Leave the candidate out and keep going
    #[default]
    Skip,
    /// Fail the whole search
    Abort,
}

/// Model configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Provider type (command, dummy)
    pub provider: Option<EncoderProviderType>,
    /// Command serving encoder requests
    pub command: Option<String>,
    /// Model weights path forwarded to the command
    pub path: Option<String>,
    /// Device the model runs on (cpu, gpu)
    pub device: Option<String>,
    /// Vector dimension of the dummy provider
    pub dimension: Option<usize>,
}

impl ModelConfig {
    /// Get provider type (defaults to Command)
    pub fn provider(&self) -> EncoderProviderType {
        self.provider.unwrap_or_default()
    }

    /// Get command (defaults to "rnasim-encoder")
    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or(DEFAULT_ENCODER_COMMAND)
    }

    /// Get model path (defaults to "models/model_weights.pth")
    pub fn path(&self) -> &str {
        self.path.as_deref().unwrap_or(DEFAULT_MODEL_PATH)
    }

    /// Get device (defaults to "cpu")
    pub fn device(&self) -> &str {
        self.device.as_deref().unwrap_or("cpu")
    }

    /// Get dummy dimension (defaults to 64)
    pub fn dimension(&self) -> usize {
        self.dimension.unwrap_or(DEFAULT_DUMMY_DIMENSION)
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Structures per batch
    pub batch_size: Option<usize>,
    /// Worker threads used across structures (CPU only)
    pub workers: Option<usize>,
    /// Default window length; unset means whole-structure embeddings
    pub window_length: Option<usize>,
    /// Whether windows pull in out-of-span pairing partners
    pub keep_paired_neighbors: Option<bool>,
}

impl EmbeddingConfig {
    /// Get batch size (defaults to 1)
    pub fn batch_size(&self) -> usize {
        self.batch_size.unwrap_or(1)
    }

    /// Get worker count (defaults to 1)
    pub fn workers(&self) -> usize {
        self.workers.unwrap_or(1)
    }

    /// Get default window length (defaults to none)
    pub fn window_length(&self) -> Option<usize> {
        self.window_length
    }

    /// Get paired-neighbor policy (defaults to false)
    pub fn keep_paired_neighbors(&self) -> bool {
        self.keep_paired_neighbors.unwrap_or(false)
    }
}

/// Search configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Metric name (squared, cosine)
    pub metric: Option<String>,
    /// Number of results to return
    pub top_k: Option<usize>,
    /// Candidates scored per chunk
    pub chunk_size: Option<usize>,
    /// Handling of candidates with a different dimension
    pub on_mismatch: Option<MismatchPolicy>,
}

impl SearchConfig {
    /// Get metric (defaults to squared). Unknown names are configuration errors.
    pub fn metric(&self) -> Result<Metric> {
        match self.metric.as_deref() {
            Some(name) => name.parse(),
            None => Ok(Metric::default()),
        }
    }

    /// Get top k (defaults to 30)
    pub fn top_k(&self) -> usize {
        self.top_k.unwrap_or(DEFAULT_TOP_K)
    }

    /// Get chunk size (defaults to 512)
    pub fn chunk_size(&self) -> usize {
        self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE)
    }

    /// Get mismatch policy (defaults to Skip)
    pub fn on_mismatch(&self) -> MismatchPolicy {
        self.on_mismatch.unwrap_or_default()
    }
}

/// Store configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the candidate database
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    /// Get configured store path, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Configuration loaded from .rnasimrc.toml or ~/.config/rnasim/config.toml
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model configuration
    #[serde(default)]
    pub model: ModelConfig,

    /// Embedding configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Search configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Store configuration
    #[serde(default)]
    pub store: StoreConfig,
}

impl Config {
    /// Load configuration from files, then apply environment overrides
    ///
    /// Precedence (highest to lowest):
    /// 1. Environment (`RNASIM_BATCH_SIZE`, `RNASIM_WORKERS`, `RNASIM_METRIC`, `MODEL_PATH`,
    ///    `RNASIM_ENCODER_COMMAND`)
    /// 2. .rnasimrc.toml in current directory
    /// 3. ~/.config/rnasim/config.toml
    pub fn load() -> Result<Self> {
        let mut config = Self::load_files();
        config.apply_env()?;
        Ok(config)
    }

    fn load_files() -> Self {
        if let Some(config) = Self::load_from_path(Path::new(".rnasimrc.toml")) {
            return config;
        }

        if let Some(home) = dirs::home_dir() {
            let config_path = home.join(".config").join("rnasim").join("config.toml");
            if let Some(config) = Self::load_from_path(&config_path) {
                return config;
            }
        }

        Self::default()
    }

    /// Reads one config file. Missing files and parse failures yield `None`;
    /// parse failures are logged.
    pub fn load_from_path(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match toml::from_str(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Applies environment overrides.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(batch_size) = parse_usize_env("RNASIM_BATCH_SIZE")? {
            self.embedding.batch_size = Some(batch_size);
        }
        if let Some(workers) = parse_usize_env("RNASIM_WORKERS")? {
            self.embedding.workers = Some(workers);
        }
        if let Some(metric) = read_env("RNASIM_METRIC")? {
            metric.parse::<Metric>()?;
            self.search.metric = Some(metric);
        }
        if let Some(path) = read_env("MODEL_PATH")? {
            self.model.path = Some(path);
        }
        if let Some(command) = read_env("RNASIM_ENCODER_COMMAND")? {
            self.model.command = Some(command);
        }
        Ok(())
    }

    /// Checks every value that has a validity constraint.
    pub fn validate(&self) -> Result<()> {
        self.search.metric()?;
        if self.embedding.batch_size() == 0 {
            return Err(Error::config("embedding.batch_size must be greater than 0"));
        }
        if self.embedding.workers() == 0 {
            return Err(Error::config("embedding.workers must be greater than 0"));
        }
        if self.embedding.window_length() == Some(0) {
            return Err(Error::config("embedding.window_length must be greater than 0"));
        }
        if self.search.top_k() == 0 {
            return Err(Error::config("search.top_k must be greater than 0"));
        }
        if self.search.chunk_size() == 0 {
            return Err(Error::config("search.chunk_size must be greater than 0"));
        }
        self.model.device().parse::<crate::embedding::Device>()?;
        Ok(())
    }

    /// Get the model configuration
    pub fn model(&self) -> &ModelConfig {
        &self.model
    }

    /// Get the embedding configuration
    pub fn embedding(&self) -> &EmbeddingConfig {
        &self.embedding
    }

    /// Get the search configuration
    pub fn search(&self) -> &SearchConfig {
        &self.search
    }

    /// Get the store configuration
    pub fn store(&self) -> &StoreConfig {
        &self.store
    }
}

fn read_env(name: &str) -> Result<Option<String>> {
    match env::var(name) {
        Ok(raw) => {
            let value = raw.trim();
            if value.is_empty() {
                Ok(None)
            } else {
                Ok(Some(value.to_string()))
            }
        }
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(Error::config(format!("Failed to read {}: {}", name, err))),
    }
}

fn parse_usize_env(name: &str) -> Result<Option<usize>> {
    match read_env(name)? {
        Some(value) => value
            .parse::<usize>()
            .map(Some)
            .map_err(|_| Error::config(format!("Invalid {} value: {}", name, value))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.model().provider(), EncoderProviderType::Command);
        assert_eq!(config.embedding().batch_size(), 1);
        assert_eq!(config.embedding().window_length(), None);
        assert_eq!(config.search().metric().unwrap(), Metric::Squared);
        assert_eq!(config.search().top_k(), 30);
        assert_eq!(config.search().chunk_size(), 512);
        assert_eq!(config.search().on_mismatch(), MismatchPolicy::Skip);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".rnasimrc.toml");
        std::fs::write(
            &path,
            r#"
[model]
provider = "dummy"
dimension = 8

[embedding]
batch_size = 16
workers = 4
window_length = 20
keep_paired_neighbors = true

[search]
metric = "cosine"
top_k = 5
on_mismatch = "abort"
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.model().provider(), EncoderProviderType::Dummy);
        assert_eq!(config.model().dimension(), 8);
        assert_eq!(config.embedding().workers(), 4);
        assert_eq!(config.embedding().window_length(), Some(20));
        assert!(config.embedding().keep_paired_neighbors());
        assert_eq!(config.search().metric().unwrap(), Metric::Cosine);
        assert_eq!(config.search().on_mismatch(), MismatchPolicy::Abort);
    }

    #[test]
    fn test_invalid_file_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[search\nmetric = ").unwrap();
        assert!(Config::load_from_path(&path).is_none());
    }

    #[test]
    fn test_env_overrides_encoder_command() {
        std::env::set_var("RNASIM_ENCODER_COMMAND", "python3 serve_encoder.py");
        let mut config = Config::default();
        let applied = config.apply_env();
        std::env::remove_var("RNASIM_ENCODER_COMMAND");

        applied.unwrap();
        assert_eq!(config.model().command(), "python3 serve_encoder.py");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.search.metric = Some("manhattan".into());
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));

        let mut config = Config::default();
        config.search.top_k = Some(0);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.embedding.window_length = Some(0);
        assert!(config.validate().is_err());
    }
}
