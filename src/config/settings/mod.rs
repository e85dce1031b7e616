
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::conversation::{DEFAULT_HISTORY_WINDOW, PromptTemplate};
use crate::embeddings::DEFAULT_EMBEDDING_DIMENSION;
use crate::records::MalformedRecordPolicy;
use crate::server::DEFAULT_MAX_SESSIONS;

pub const OPENAI_API_KEY_VAR: &str = "OPENAI_API_KEY";
pub const PINECONE_API_KEY_VAR: &str = "PINECONE_API_KEY";
pub const DEFAULT_OUTPUT_MARKER: &str = "\n\nFor the output format,";

const APP_DIR_NAME: &str = "support-rag";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub vector_index: VectorIndexConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub app_description: AppDescriptionConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub embedding_dimension: u32,
    pub temperature: f32,
    pub batch_size: u32,
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            chat_model: "gpt-4".to_string(),
            embedding_model: "text-embedding-ada-002".to_string(),
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            temperature: 0.7,
            batch_size: 100,
            timeout_seconds: 30,
            retry_attempts: 1,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VectorIndexConfig {
    pub controller_url: String,
    pub index_name: String,
    pub cloud: String,
    pub region: String,
    pub timeout_seconds: u64,
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            controller_url: "https://api.pinecone.io".to_string(),
            index_name: "jira-demo".to_string(),
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
            timeout_seconds: 30,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DataConfig {
    pub source_path: PathBuf,
    pub malformed_records: MalformedRecordPolicy,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            source_path: PathBuf::from("./data/data.csv"),
            malformed_records: MalformedRecordPolicy::Abort,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChatConfig {
    pub product_name: String,
    pub top_k: usize,
    /// Exchanges kept per session, `0` keeps everything
    pub history_window: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<Vec<String>>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            product_name: "Hyer".to_string(),
            top_k: 1,
            history_window: DEFAULT_HISTORY_WINDOW,
            instructions: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Chat sessions kept in memory before the least recently used is dropped
    pub max_sessions: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:7860".to_string(),
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppDescriptionConfig {
    pub temperature: f32,
    pub output_markers: Vec<String>,
}

impl Default for AppDescriptionConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            output_markers: vec![DEFAULT_OUTPUT_MARKER.to_string()],
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL: {0} (must be an http or https URL)")]
    InvalidUrl(String),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid embedding dimension: {0} (must be between 1 and 20000)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid temperature: {0} (must be between 0 and 2)")]
    InvalidTemperature(f32),
    #[error("Invalid timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("Invalid index name: {0:?} (lowercase letters, digits and '-' only, at most 45 characters)")]
    InvalidIndexName(String),
    #[error("Invalid top_k: {0} (must be between 1 and 100)")]
    InvalidTopK(usize),
    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Platform config directory for this application
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR_NAME))
            .ok_or(ConfigError::DirectoryError)
    }

    /// Load `config.toml` from `config_dir`, falling back to defaults when the
    /// file does not exist. API keys are taken from the environment.
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;

            toml::from_str(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            Self::default()
        };
        config.base_dir = config_dir.as_ref().to_path_buf();
        config.apply_env();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    /// Fill secrets from `OPENAI_API_KEY` and `PINECONE_API_KEY`.
    #[inline]
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(OPENAI_API_KEY_VAR) {
            self.openai.api_key = Some(key);
        }
        if let Ok(key) = std::env::var(PINECONE_API_KEY_VAR) {
            self.vector_index.api_key = Some(key);
        }
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

    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Source file path, resolved against the config directory when relative
    /// and not present relative to the working directory.
    #[inline]
    pub fn source_path(&self) -> PathBuf {
        let path = &self.data.source_path;
        if path.is_absolute() || path.exists() {
            path.clone()
        } else {
            self.base_dir.join(path)
        }
    }

    #[inline]
    pub fn prompt_template(&self) -> PromptTemplate {
        self.chat.instructions.as_ref().map_or_else(
            || PromptTemplate::support_assistant(&self.chat.product_name),
            |instructions| PromptTemplate::new(instructions.clone()),
        )
    }

    #[inline]
    pub fn bind_address(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .bind
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress(self.server.bind.clone()))
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.openai.validate()?;
        self.vector_index.validate()?;

        if !(1..=100).contains(&self.chat.top_k) {
            return Err(ConfigError::InvalidTopK(self.chat.top_k));
        }

        if !(0.0..=2.0).contains(&self.app_description.temperature) {
            return Err(ConfigError::InvalidTemperature(
                self.app_description.temperature,
            ));
        }

        self.bind_address()?;
        Ok(())
    }
}

fn validate_http_url(url: &str) -> Result<Url, ConfigError> {
    let parsed = Url::parse(url).map_err(|_| ConfigError::InvalidUrl(url.to_string()))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(url.to_string()));
    }
    Ok(parsed)
}

fn validate_timeout(seconds: u64) -> Result<(), ConfigError> {
    if !(1..=600).contains(&seconds) {
        return Err(ConfigError::InvalidTimeout(seconds));
    }
    Ok(())
}

impl OpenAiConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_http_url(&self.base_url)?;

        if self.chat_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.chat_model.clone()));
        }

        if self.embedding_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.embedding_model.clone()));
        }

        if !(1..=20_000).contains(&self.embedding_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding_dimension,
            ));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        validate_timeout(self.timeout_seconds)?;

        if !(1..=10).contains(&self.retry_attempts) {
            return Err(ConfigError::InvalidRetryAttempts(self.retry_attempts));
        }

        Ok(())
    }

    pub fn base_url(&self) -> Result<Url, ConfigError> {
        validate_http_url(&self.base_url)
    }

    pub fn set_chat_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.chat_model = model;
        Ok(())
    }

    pub fn set_embedding_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.embedding_model = model;
        Ok(())
    }

    pub fn set_embedding_dimension(&mut self, dimension: u32) -> Result<(), ConfigError> {
        if !(1..=20_000).contains(&dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(dimension));
        }
        self.embedding_dimension = dimension;
        Ok(())
    }

    pub fn set_temperature(&mut self, temperature: f32) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::InvalidTemperature(temperature));
        }
        self.temperature = temperature;
        Ok(())
    }
}

impl VectorIndexConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_http_url(&self.controller_url)?;
        validate_index_name(&self.index_name)?;
        validate_timeout(self.timeout_seconds)?;
        Ok(())
    }

    pub fn controller_url(&self) -> Result<Url, ConfigError> {
        validate_http_url(&self.controller_url)
    }

    pub fn set_index_name(&mut self, name: String) -> Result<(), ConfigError> {
        validate_index_name(&name)?;
        self.index_name = name;
        Ok(())
    }
}

/// Index names are lowercase alphanumerics and hyphens, up to 45 characters.
pub fn validate_index_name(name: &str) -> Result<(), ConfigError> {
    let valid = !name.is_empty()
        && name.len() <= 45
        && !name.starts_with('-')
        && !name.ends_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidIndexName(name.to_string()))
    }
}
