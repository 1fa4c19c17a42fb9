//! Engine configuration
//!
//! Values come from, in increasing priority: defaults, a TOML file
//! ([`EngineConfig::from_toml_file`]), environment variables
//! ([`EngineConfig::from_env`]) and finally explicit builder calls (the CLI
//! maps its flags onto the builder).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {message}")]
    Read { path: PathBuf, message: String },

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Settings for the HTTP embedding provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Base URL of the embedding service; `None` disables embeddings
    pub endpoint: Option<String>,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
    /// Maximum retry attempts per request
    pub max_retries: u32,
    /// Initial backoff delay in milliseconds
    pub initial_backoff_ms: u64,
    /// Maximum backoff delay in milliseconds
    pub max_backoff_ms: u64,
    /// Backoff multiplier
    pub backoff_multiplier: f64,
    /// Health probes made by the warm-up task before giving up
    pub warmup_attempts: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: 5000,
            max_retries: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 5000,
            backoff_multiplier: 2.0,
            warmup_attempts: 5,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding contract files; `None` means not configured
    pub contracts_dir: Option<PathBuf>,
    /// File extensions picked up from the contracts directory
    pub file_extensions: Vec<String>,
    /// Location of the persistent graph database
    pub graph_path: PathBuf,
    /// Maximum number of concurrently open store sessions
    pub max_sessions: usize,
    /// Result limit when a search does not name one
    pub search_default_limit: usize,
    /// Embedding provider settings
    pub embedding: EmbeddingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            contracts_dir: None,
            file_extensions: vec![
                "json".to_string(),
                "yaml".to_string(),
                "yml".to_string(),
                "toml".to_string(),
            ],
            graph_path: PathBuf::from(".contract-graph"),
            max_sessions: 8,
            search_default_limit: 10,
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Create a new config builder
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }

    /// Load a TOML configuration file; missing keys keep their defaults
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Defaults overlaid with environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().merge_env()
    }

    /// Overlay environment variables onto this configuration
    pub fn merge_env(mut self) -> Result<Self, ConfigError> {
        if let Ok(dir) = std::env::var("CONTRACTS_DIR") {
            if !dir.trim().is_empty() {
                self.contracts_dir = Some(PathBuf::from(dir));
            }
        }
        if let Ok(path) = std::env::var("CONTRACT_GRAPH_DB") {
            self.graph_path = PathBuf::from(path);
        }
        if let Some(max) = parse_env("CONTRACT_GRAPH_MAX_SESSIONS")? {
            self.max_sessions = max;
        }
        if let Ok(endpoint) = std::env::var("EMBEDDING_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                self.embedding.endpoint = Some(endpoint);
            }
        }
        if let Some(timeout) = parse_env("EMBEDDING_TIMEOUT_MS")? {
            self.embedding.timeout_ms = timeout;
        }
        if let Some(retries) = parse_env("EMBEDDING_MAX_RETRIES")? {
            self.embedding.max_retries = retries;
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_sessions == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_sessions".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if !(1..=100).contains(&self.search_default_limit) {
            return Err(ConfigError::InvalidValue {
                key: "search_default_limit".to_string(),
                message: "must be between 1 and 100".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

/// Builder for EngineConfig
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    /// Start from an existing configuration
    pub fn from_config(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn contracts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.contracts_dir = Some(dir.into());
        self
    }

    pub fn file_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.file_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn graph_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.graph_path = path.into();
        self
    }

    pub fn max_sessions(mut self, max: usize) -> Self {
        self.config.max_sessions = max;
        self
    }

    pub fn search_default_limit(mut self, limit: usize) -> Self {
        self.config.search_default_limit = limit;
        self
    }

    pub fn embedding_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.embedding.endpoint = Some(endpoint.into());
        self
    }

    pub fn embedding_timeout_ms(mut self, timeout: u64) -> Self {
        self.config.embedding.timeout_ms = timeout;
        self
    }

    pub fn build(self) -> Result<EngineConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
