//! HTTP embedding providers.
//!
//! Implements [`Embedder`] for:
//! - **[`OpenAIEmbedder`]**: `POST {base}/v1/embeddings` with a bearer token.
//! - **[`OllamaEmbedder`]**: `POST {url}/api/embed` on a local Ollama instance.
//!
//! Both share the retry behaviour in [`retry`], a per-call timeout from
//! `embedding.timeout_secs`, and the [`InputPolicy`] bound on input length.
//!
//! Use [`create_embedder`] to build the provider named in config. Build and
//! query both go through it, which keeps the two paths on the same model.

pub mod retry;

use std::borrow::Cow;
use std::time::Duration;

use async_trait::async_trait;
use rowdex_core::embedding::Embedder;
use rowdex_core::error::{Error, Result};
use rowdex_core::models::Embedding;
use tracing::warn;

use crate::config::EmbeddingConfig;
use retry::{send_json_with_retry, RetryPolicy};

/// Environment variable holding the OpenAI API token.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

const OPENAI_DEFAULT_BASE: &str = "https://api.openai.com";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Bound on input length, and what to do when it is exceeded.
#[derive(Debug, Clone, Copy)]
pub struct InputPolicy {
    pub max_chars: usize,
    pub truncate: bool,
}

impl InputPolicy {
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            max_chars: config.max_input_chars,
            truncate: config.truncate,
        }
    }

    pub fn exceeds(&self, text: &str) -> bool {
        text.chars().count() > self.max_chars
    }

    /// Return the text to send, truncated at a char boundary if allowed.
    ///
    /// # Errors
    ///
    /// [`Error::EmbeddingInputTooLarge`] when the text is over the bound and
    /// truncation is off.
    pub fn apply<'a>(&self, text: &'a str) -> Result<Cow<'a, str>> {
        let len = text.chars().count();
        if len <= self.max_chars {
            return Ok(Cow::Borrowed(text));
        }
        if !self.truncate {
            return Err(Error::EmbeddingInputTooLarge {
                len,
                max: self.max_chars,
            });
        }
        warn!(len, max = self.max_chars, "truncating embedding input");
        Ok(Cow::Owned(text.chars().take(self.max_chars).collect()))
    }
}

fn http_client(config: &EmbeddingConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| Error::Configuration(format!("cannot build HTTP client: {}", e)))
}

// ============ OpenAI ============

/// Embedding provider using the OpenAI embeddings API.
///
/// `embedding.url` overrides the base URL for OpenAI-compatible services.
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dims: usize,
    retry: RetryPolicy,
    input: InputPolicy,
}

impl OpenAIEmbedder {
    /// Create the provider, reading the token from `OPENAI_API_KEY`.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if the token is not set.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var(OPENAI_API_KEY_ENV).map_err(|_| {
            Error::Configuration(format!("{} environment variable not set", OPENAI_API_KEY_ENV))
        })?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &EmbeddingConfig, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::Configuration("OpenAI API key is empty".to_string()));
        }
        let base = config
            .url
            .as_deref()
            .unwrap_or(OPENAI_DEFAULT_BASE)
            .trim_end_matches('/');

        Ok(Self {
            client: http_client(config)?,
            endpoint: format!("{}/v1/embeddings", base),
            api_key,
            model: config.model.clone(),
            dims: config.dims,
            retry: RetryPolicy::new(config.max_attempts, config.backoff_base_ms),
            input: InputPolicy::from_config(config),
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        let input = self.input.apply(text)?;
        let body = serde_json::json!({
            "model": self.model,
            "input": [input],
        });

        let json = send_json_with_retry("OpenAI", self.retry, || {
            self.client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;

        parse_openai_response(&json)?
            .into_iter()
            .next()
            .ok_or_else(|| service_err("OpenAI response contained no embeddings"))
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Embedding>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| service_err("invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .unwrap_or(pos as u64);
        let embedding = item
            .get("embedding")
            .ok_or_else(|| service_err("invalid OpenAI response: missing embedding"))?;
        indexed.push((index, parse_vector(embedding)?));
    }

    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama ============

/// Embedding provider using a local Ollama instance.
///
/// Requires Ollama to be running with the model pulled
/// (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dims: usize,
    retry: RetryPolicy,
    input: InputPolicy,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let url = config
            .url
            .as_deref()
            .unwrap_or(OLLAMA_DEFAULT_URL)
            .trim_end_matches('/');

        Ok(Self {
            client: http_client(config)?,
            endpoint: format!("{}/api/embed", url),
            model: config.model.clone(),
            dims: config.dims,
            retry: RetryPolicy::new(config.max_attempts, config.backoff_base_ms),
            input: InputPolicy::from_config(config),
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        let input = self.input.apply(text)?;
        let body = serde_json::json!({
            "model": self.model,
            "input": [input],
        });

        let json = send_json_with_retry("Ollama", self.retry, || {
            self.client.post(&self.endpoint).json(&body)
        })
        .await?;

        parse_ollama_response(&json)?
            .into_iter()
            .next()
            .ok_or_else(|| service_err("Ollama response contained no embeddings"))
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Embedding>> {
    json.get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| service_err("invalid Ollama response: missing embeddings array"))?
        .iter()
        .map(parse_vector)
        .collect()
}

fn parse_vector(value: &serde_json::Value) -> Result<Embedding> {
    value
        .as_array()
        .ok_or_else(|| service_err("invalid response: embedding is not an array"))?
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| service_err("invalid response: non-numeric embedding value"))
        })
        .collect()
}

fn service_err(msg: &str) -> Error {
    Error::EmbeddingService {
        attempts: 1,
        message: msg.to_string(),
    }
}

/// Create the [`Embedder`] named by `embedding.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"openai"` | [`OpenAIEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAIEmbedder::new(config)?)),
        "ollama" => Ok(Box::new(OllamaEmbedder::new(config)?)),
        other => Err(Error::Configuration(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_policy_strict() {
        let policy = InputPolicy {
            max_chars: 5,
            truncate: false,
        };
        assert_eq!(policy.apply("hello").unwrap(), "hello");
        let err = policy.apply("hello!").unwrap_err();
        assert!(matches!(err, Error::EmbeddingInputTooLarge { len: 6, max: 5 }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_input_policy_truncates_on_char_boundary() {
        let policy = InputPolicy {
            max_chars: 3,
            truncate: true,
        };
        assert_eq!(policy.apply("héllo").unwrap(), "hél");
        assert!(policy.exceeds("héllo"));
        assert!(!policy.exceeds("hé"));
    }

    #[test]
    fn test_parse_openai_orders_by_index() {
        let json = serde_json::json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0] },
                { "index": 0, "embedding": [1.0, 0.0] }
            ]
        });
        let vecs = parse_openai_response(&json).unwrap();
        assert_eq!(vecs, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_openai_response(&serde_json::json!({ "error": "x" })).is_err());
        let bad = serde_json::json!({ "embeddings": [["a", "b"]] });
        assert!(parse_ollama_response(&bad).is_err());
    }

    #[test]
    fn test_parse_ollama() {
        let json = serde_json::json!({ "embeddings": [[0.5, -0.5]] });
        assert_eq!(parse_ollama_response(&json).unwrap(), vec![vec![0.5, -0.5]]);
    }
}
