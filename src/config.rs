//! Configuration management for fylr_search
//!
//! Supports loading configuration from TOML files with CLI and environment
//! overrides. Every field has a default, so an empty file is a valid config.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::semantic::backend::{DEFAULT_OLLAMA_MODEL, DEFAULT_OLLAMA_URL};
use crate::semantic::embeddings::{DEFAULT_BATCH_SIZE, DEFAULT_MAX_INPUT_CHARS};
use crate::semantic::engine::{DEFAULT_QUERY_CACHE_CAPACITY, DEFAULT_SEARCH_K};
use crate::semantic::{
    Embedder, HashingEmbedder, OllamaGenerator, PersistMode, PromptedEmbedder, SearchManager,
    VectorIndexStore,
};

/// Which embedding backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Prompt an Ollama model for JSON embeddings
    #[default]
    Ollama,
    /// Offline feature-hashing embeddings
    Hashing,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Embedding backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,

    /// Ollama server URL
    /// Can be overridden by env var FYLR_OLLAMA_URL
    #[serde(default = "default_ollama_url")]
    pub url: String,

    /// Ollama model name
    /// Can be overridden by env var FYLR_OLLAMA_MODEL
    #[serde(default = "default_ollama_model")]
    pub model: String,

    /// Per-request timeout in seconds (unset: wait indefinitely)
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,

    /// Characters of each text sent to the backend
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,

    /// Texts embedded per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

/// Index storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Path prefix for `<prefix>.index` and `<prefix>.mapping`
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,

    /// Embedding dimension; changing it invalidates existing artifacts
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// `immediate` writes on every change, `deferred` only on flush
    #[serde(default)]
    pub persist_mode: PersistMode,

    /// Largest file the CLI will read for indexing, in bytes (default 10MB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Results returned when the caller does not ask for a number
    #[serde(default = "default_k")]
    pub default_k: usize,

    /// Query embeddings kept in memory (0 disables the cache)
    #[serde(default = "default_query_cache_capacity")]
    pub query_cache_capacity: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum level when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_ollama_url() -> String {
    DEFAULT_OLLAMA_URL.to_string()
}

fn default_ollama_model() -> String {
    DEFAULT_OLLAMA_MODEL.to_string()
}

fn default_max_input_chars() -> usize {
    DEFAULT_MAX_INPUT_CHARS
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_path_prefix() -> String {
    dirs::data_dir()
        .map(|dir| dir.join("fylr_search").join("search_index"))
        .unwrap_or_else(|| PathBuf::from("data").join("search_index"))
        .to_string_lossy()
        .into_owned()
}

fn default_dimension() -> usize {
    384
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024 // 10MB
}

fn default_k() -> usize {
    DEFAULT_SEARCH_K
}

fn default_query_cache_capacity() -> usize {
    DEFAULT_QUERY_CACHE_CAPACITY
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            url: default_ollama_url(),
            model: default_ollama_model(),
            request_timeout_secs: None,
            max_input_chars: default_max_input_chars(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path_prefix: default_path_prefix(),
            dimension: default_dimension(),
            persist_mode: PersistMode::default(),
            max_file_size: default_max_file_size(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_k: default_k(),
            query_cache_capacity: default_query_cache_capacity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl BackendConfig {
    /// Build the configured embedder for vectors of `dimension` elements
    pub fn build_embedder(&self, dimension: usize) -> Result<Box<dyn Embedder>> {
        match self.kind {
            BackendKind::Ollama => {
                let timeout = self.request_timeout_secs.map(Duration::from_secs);
                let generator = OllamaGenerator::new(&self.url, &self.model, timeout)
                    .context("Failed to create Ollama client")?;
                Ok(Box::new(
                    PromptedEmbedder::new(generator, dimension)
                        .with_max_input_chars(self.max_input_chars),
                ))
            }
            BackendKind::Hashing => Ok(Box::new(HashingEmbedder::new(dimension))),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from default locations
    ///
    /// Search order:
    /// 1. FYLR_SEARCH_CONFIG environment variable
    /// 2. ./fylr_search.toml (current directory)
    /// 3. ~/.config/fylr_search/config.toml (user config)
    pub fn from_default_locations() -> Result<Option<(Self, PathBuf)>> {
        if let Ok(env_path) = std::env::var("FYLR_SEARCH_CONFIG") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                let config = Self::from_file(&path)?;
                return Ok(Some((config, path)));
            }
        }

        let local_path = PathBuf::from("fylr_search.toml");
        if local_path.exists() {
            let config = Self::from_file(&local_path)?;
            return Ok(Some((config, local_path)));
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_path = config_dir.join("fylr_search").join("config.toml");
            if user_path.exists() {
                let config = Self::from_file(&user_path)?;
                return Ok(Some((config, user_path)));
            }
        }

        Ok(None)
    }

    /// Generate a template configuration file
    pub fn generate_template() -> String {
        r#"# fylr_search configuration
# Generated template - customize as needed

[backend]
# Embedding backend: "ollama" (prompted LLM) or "hashing" (offline)
kind = "ollama"

# Ollama server and model (env: FYLR_OLLAMA_URL, FYLR_OLLAMA_MODEL)
url = "http://localhost:11434"
model = "mistral"

# Per-request timeout in seconds; leave unset to wait indefinitely
# request_timeout_secs = 120

# Characters of each file sent to the backend (longer content is truncated)
max_input_chars = 8000

# Texts embedded per batch
batch_size = 5

[index]
# Path prefix for the index artifacts (<prefix>.index, <prefix>.mapping)
# Defaults to the platform data directory
# path_prefix = "/var/lib/fylr_search/search_index"

# Embedding dimension. Changing it discards the existing index.
dimension = 384

# "immediate" persists after every change, "deferred" only on flush
persist_mode = "immediate"

# Largest file read for indexing, in bytes (default: 10MB)
max_file_size = 10485760

[search]
# Results returned by default
default_k = 5

# Query embeddings kept in memory (0 disables the cache)
query_cache_capacity = 128

[logging]
# Log level when RUST_LOG is not set
level = "info"
"#
        .to_string()
    }

    /// Write template config to the specified path
    pub fn write_template(path: &Path) -> Result<()> {
        let template = Self::generate_template();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        std::fs::write(path, template)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Merge CLI overrides into the configuration
    pub fn with_overrides(mut self, path_prefix: Option<String>, backend: Option<BackendKind>) -> Self {
        if let Some(prefix) = path_prefix {
            self.index.path_prefix = prefix;
        }
        if let Some(kind) = backend {
            self.backend.kind = kind;
        }
        self
    }

    /// Apply environment variable overrides.
    /// Env vars take precedence over TOML config values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("FYLR_OLLAMA_URL") {
            if !val.is_empty() {
                self.backend.url = val;
            }
        }
        if let Ok(val) = std::env::var("FYLR_OLLAMA_MODEL") {
            if !val.is_empty() {
                self.backend.model = val;
            }
        }
        self
    }

    /// Open the index store and wire it to the configured embedder
    pub fn open_search_manager(&self) -> Result<SearchManager<Box<dyn Embedder>>> {
        anyhow::ensure!(
            self.index.dimension > 0,
            "index.dimension must be greater than zero"
        );

        let store = VectorIndexStore::load_or_create(
            &self.index.path_prefix,
            self.index.dimension,
            self.index.persist_mode,
        );
        let embedder = self.backend.build_embedder(self.index.dimension)?;

        let manager = SearchManager::new(embedder, store)
            .context("Embedder and index disagree on dimension")?;

        Ok(manager.with_query_cache_capacity(self.search.query_cache_capacity))
    }
}
