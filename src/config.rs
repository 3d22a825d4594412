//! TOML configuration parsing and validation.
//!
//! Every setting the pipeline consumes is read from one file and checked
//! once, up front, by [`load_config`] / [`Config::validate`]. Anything
//! missing or inconsistent fails with [`Error::Configuration`] before a
//! database, model or index is touched.
//!
//! The embedding API token is never stored here; providers read it from the
//! environment when constructed.

use std::path::{Path, PathBuf};

use rowdex_core::error::{Error, Result};
use rowdex_core::models::{IndexSpec, Metric};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub source: SourceConfig,
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    /// Connection descriptor, e.g. `sqlite:./data/source.sqlite`.
    pub url: String,
    /// Read-only query producing the rows to index.
    pub query: String,
    /// Positional parameters bound to `?` placeholders in `query`.
    #[serde(default)]
    pub params: Vec<String>,
    /// Column whose value becomes the entry id. Row ordinal when unset.
    #[serde(default)]
    pub key_column: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    pub dims: usize,
    /// Base URL override (Ollama host, or an OpenAI-compatible endpoint).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    /// Cut oversized inputs at `max_input_chars` instead of skipping the record.
    #[serde(default)]
    pub truncate: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// SQLite file holding the vector indexes.
    pub path: PathBuf,
    pub name: String,
    #[serde(default)]
    pub metric: Metric,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_store_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    500
}
fn default_embed_timeout_secs() -> u64 {
    30
}
fn default_store_timeout_secs() -> u64 {
    10
}
fn default_max_concurrency() -> usize {
    4
}
fn default_max_input_chars() -> usize {
    8000
}
fn default_batch_size() -> usize {
    64
}
fn default_top_k() -> usize {
    5
}

impl Config {
    /// Schema the configured index must have.
    pub fn index_spec(&self) -> IndexSpec {
        IndexSpec::new(&self.index.name, self.embedding.dims, self.index.metric)
    }

    pub fn validate(&self) -> Result<()> {
        if self.source.url.trim().is_empty() {
            return Err(config_err("source.url must be set"));
        }
        if self.source.query.trim().is_empty() {
            return Err(config_err("source.query must be set"));
        }
        if let Some(key) = &self.source.key_column {
            if key.trim().is_empty() {
                return Err(config_err("source.key_column must not be empty when set"));
            }
        }

        match self.embedding.provider.as_str() {
            "openai" | "ollama" => {}
            other => {
                return Err(config_err(format!(
                    "unknown embedding provider: '{}'. Must be openai or ollama.",
                    other
                )))
            }
        }
        if self.embedding.model.trim().is_empty() {
            return Err(config_err("embedding.model must be set"));
        }
        if self.embedding.dims == 0 {
            return Err(config_err("embedding.dims must be > 0"));
        }
        if self.embedding.max_attempts == 0 {
            return Err(config_err("embedding.max_attempts must be >= 1"));
        }
        if self.embedding.timeout_secs == 0 {
            return Err(config_err("embedding.timeout_secs must be > 0"));
        }
        if self.embedding.max_concurrency == 0 {
            return Err(config_err("embedding.max_concurrency must be >= 1"));
        }
        if self.embedding.max_input_chars == 0 {
            return Err(config_err("embedding.max_input_chars must be > 0"));
        }

        if self.index.name.trim().is_empty() {
            return Err(config_err("index.name must be set"));
        }
        if self.index.batch_size == 0 {
            return Err(config_err("index.batch_size must be >= 1"));
        }
        if self.index.timeout_secs == 0 {
            return Err(config_err("index.timeout_secs must be > 0"));
        }
        if self.index.max_attempts == 0 {
            return Err(config_err("index.max_attempts must be >= 1"));
        }

        if self.retrieval.top_k == 0 {
            return Err(config_err("retrieval.top_k must be >= 1"));
        }

        Ok(())
    }
}

fn config_err(msg: impl Into<String>) -> Error {
    Error::Configuration(msg.into())
}

/// Parse a config from a TOML string and validate it.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content)
        .map_err(|e| config_err(format!("failed to parse config: {}", e)))?;
    config.validate()?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        config_err(format!(
            "failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;
    parse_config(&content)
}
