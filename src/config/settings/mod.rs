
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 768;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub stackexchange: StackExchangeConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    /// Embedding model
    pub model: String,
    pub chat_model: String,
    pub embedding_dimension: u32,
    pub temperature: f32,
    pub retry_attempts: u32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "nomic-embed-text:latest".to_string(),
            chat_model: "llama3.2:latest".to_string(),
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            temperature: 0.2,
            retry_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StackExchangeConfig {
    pub api_url: String,
    pub site: String,
    /// Public site used to build canonical question and answer links
    pub site_url: String,
    pub api_key: Option<String>,
    pub max_candidates: u32,
}

impl Default for StackExchangeConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.stackexchange.com/2.3/".to_string(),
            site: "stackoverflow".to_string(),
            site_url: "https://stackoverflow.com".to_string(),
            api_key: None,
            max_candidates: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub context_size: usize,
    /// When set, results whose best score is below this value trigger a backfill
    pub min_score: Option<f32>,
    pub backfill_concurrency: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            context_size: 3,
            min_score: None,
            backfill_concurrency: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutConfig {
    pub embedding_seconds: u64,
    pub generation_seconds: u64,
    pub store_seconds: u64,
    pub knowledge_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            embedding_seconds: 60,
            generation_seconds: 120,
            store_seconds: 30,
            knowledge_seconds: 30,
        }
    }
}

impl TimeoutConfig {
    #[inline]
    pub fn embedding(&self) -> Duration {
        Duration::from_secs(self.embedding_seconds)
    }

    #[inline]
    pub fn generation(&self) -> Duration {
        Duration::from_secs(self.generation_seconds)
    }

    #[inline]
    pub fn store(&self) -> Duration {
        Duration::from_secs(self.store_seconds)
    }

    #[inline]
    pub fn knowledge(&self) -> Duration {
        Duration::from_secs(self.knowledge_seconds)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid temperature: {0} (must be between 0.0 and 2.0)")]
    InvalidTemperature(f32),
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("Invalid site name: {0} (cannot be empty)")]
    InvalidSite(String),
    #[error("Invalid max candidates: {0} (must be between 1 and 100)")]
    InvalidMaxCandidates(u32),
    #[error("Invalid top_k: {0} (must be between 1 and 100)")]
    InvalidTopK(usize),
    #[error("Invalid context size: {0} (must be at least 1)")]
    InvalidContextSize(usize),
    #[error("Invalid minimum score: {0} (must be between -1.0 and 1.0)")]
    InvalidMinScore(f32),
    #[error("Invalid backfill concurrency: {0} (must be between 1 and 16)")]
    InvalidBackfillConcurrency(usize),
    #[error("Invalid timeout for {0}: {1} (must be between 1 and 600 seconds)")]
    InvalidTimeout(&'static str, u64),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Default base directory, `~/.stackrag`
    #[inline]
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".stackrag"))
            .or_else(|| dirs::data_dir().map(|data| data.join("stackrag")))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn with_base_dir<P: AsRef<Path>>(config_dir: P) -> Self {
        Self {
            base_dir: config_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self::with_base_dir(config_dir));
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ollama.validate()?;
        self.stackexchange.validate()?;
        self.retrieval.validate()?;
        self.timeouts.validate()?;
        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Get the path for the vector database directory
    #[inline]
    pub fn vector_database_path(&self) -> PathBuf {
        self.get_base_dir().join("vectors")
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        self.ollama.ollama_url()
    }
}

impl OllamaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        if self.host.trim().is_empty() {
            return Err(ConfigError::InvalidUrl(format!(
                "{}://{}:{}",
                self.protocol, self.host, self.port
            )));
        }
        self.ollama_url()?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.chat_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.chat_model.clone()));
        }

        if !(64..=4096).contains(&self.embedding_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding_dimension,
            ));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }

        if !(1..=10).contains(&self.retry_attempts) {
            return Err(ConfigError::InvalidRetryAttempts(self.retry_attempts));
        }

        Ok(())
    }

    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    pub fn set_protocol(&mut self, protocol: String) -> Result<(), ConfigError> {
        if protocol != "http" && protocol != "https" {
            return Err(ConfigError::InvalidProtocol(protocol));
        }
        self.protocol = protocol;
        Ok(())
    }

    pub fn set_host(&mut self, host: String) -> Result<(), ConfigError> {
        let temp_config = OllamaConfig {
            host: host.clone(),
            ..self.clone()
        };
        temp_config.validate()?;
        self.host = host;
        Ok(())
    }

    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }
        self.port = port;
        Ok(())
    }

    pub fn set_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.model = model;
        Ok(())
    }

    pub fn set_chat_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.chat_model = model;
        Ok(())
    }

    pub fn set_embedding_dimension(&mut self, dimension: u32) -> Result<(), ConfigError> {
        if !(64..=4096).contains(&dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(dimension));
        }
        self.embedding_dimension = dimension;
        Ok(())
    }
}

impl StackExchangeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.api_base_url()?;
        Url::parse(&self.site_url).map_err(|_| ConfigError::InvalidUrl(self.site_url.clone()))?;

        if self.site.trim().is_empty() {
            return Err(ConfigError::InvalidSite(self.site.clone()));
        }

        if !(1..=100).contains(&self.max_candidates) {
            return Err(ConfigError::InvalidMaxCandidates(self.max_candidates));
        }

        Ok(())
    }

    /// API base URL, always ending in `/` so relative endpoints join beneath it
    pub fn api_base_url(&self) -> Result<Url, ConfigError> {
        let mut url =
            Url::parse(&self.api_url).map_err(|_| ConfigError::InvalidUrl(self.api_url.clone()))?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    pub fn set_site(&mut self, site: String) -> Result<(), ConfigError> {
        if site.trim().is_empty() {
            return Err(ConfigError::InvalidSite(site));
        }
        self.site = site;
        Ok(())
    }

    pub fn set_max_candidates(&mut self, max_candidates: u32) -> Result<(), ConfigError> {
        if !(1..=100).contains(&max_candidates) {
            return Err(ConfigError::InvalidMaxCandidates(max_candidates));
        }
        self.max_candidates = max_candidates;
        Ok(())
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.top_k) {
            return Err(ConfigError::InvalidTopK(self.top_k));
        }

        if self.context_size == 0 {
            return Err(ConfigError::InvalidContextSize(self.context_size));
        }

        if let Some(min_score) = self.min_score {
            if !(-1.0..=1.0).contains(&min_score) {
                return Err(ConfigError::InvalidMinScore(min_score));
            }
        }

        if !(1..=16).contains(&self.backfill_concurrency) {
            return Err(ConfigError::InvalidBackfillConcurrency(
                self.backfill_concurrency,
            ));
        }

        Ok(())
    }

    pub fn set_top_k(&mut self, top_k: usize) -> Result<(), ConfigError> {
        if !(1..=100).contains(&top_k) {
            return Err(ConfigError::InvalidTopK(top_k));
        }
        self.top_k = top_k;
        Ok(())
    }

    pub fn set_context_size(&mut self, context_size: usize) -> Result<(), ConfigError> {
        if context_size == 0 {
            return Err(ConfigError::InvalidContextSize(context_size));
        }
        self.context_size = context_size;
        Ok(())
    }

    pub fn set_min_score(&mut self, min_score: Option<f32>) -> Result<(), ConfigError> {
        if let Some(score) = min_score {
            if !(-1.0..=1.0).contains(&score) {
                return Err(ConfigError::InvalidMinScore(score));
            }
        }
        self.min_score = min_score;
        Ok(())
    }
}

impl TimeoutConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, seconds) in [
            ("embedding", self.embedding_seconds),
            ("generation", self.generation_seconds),
            ("store", self.store_seconds),
            ("knowledge", self.knowledge_seconds),
        ] {
            if !(1..=600).contains(&seconds) {
                return Err(ConfigError::InvalidTimeout(name, seconds));
            }
        }
        Ok(())
    }
}
