//! Embedding trait, similarity metrics and vector utilities.
//!
//! Defines the [`Embedder`] trait every embedding backend implements, the
//! per-build [`CachingEmbedder`] wrapper, and pure helpers for vector
//! serialization and similarity scoring.
//!
//! Concrete HTTP providers (OpenAI, Ollama) live in the `rowdex` app crate.
//!
//! The same embedder instance must serve both index builds and queries:
//! vectors produced by different models are not comparable.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::models::{Embedding, Metric};

/// An embedding backend.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed one text. Used for documents and queries alike.
    async fn embed(&self, text: &str) -> Result<Embedding>;
}

/// Memoises embeddings by SHA-256 of the input text.
///
/// Wrap the provider in one of these for the lifetime of a build so that
/// repeated inputs within the build always map to the same vector.
pub struct CachingEmbedder<E> {
    inner: E,
    cache: Mutex<HashMap<String, Embedding>>,
}

impl<E: Embedder> CachingEmbedder<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Number of distinct texts embedded so far.
    pub fn cached(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn into_inner(self) -> E {
        self.inner
    }
}

#[async_trait]
impl<E: Embedder> Embedder for CachingEmbedder<E> {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dims(&self) -> usize {
        self.inner.dims()
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        let key = hash_text(text);
        if let Some(hit) = self.cache.lock().ok().and_then(|c| c.get(&key).cloned()) {
            return Ok(hit);
        }

        let vector = self.inner.embed(text).await?;
        if let Ok(mut cache) = self.cache.lock() {
            // First writer wins so concurrent misses on one text agree.
            let stored = cache.entry(key).or_insert(vector);
            return Ok(stored.clone());
        }
        Ok(vector)
    }
}

#[async_trait]
impl<E: Embedder + ?Sized> Embedder for std::sync::Arc<E> {
    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn dims(&self) -> usize {
        (**self).dims()
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        (**self).embed(text).await
    }
}

#[async_trait]
impl<E: Embedder + ?Sized> Embedder for Box<E> {
    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn dims(&self) -> usize {
        (**self).dims()
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        (**self).embed(text).await
    }
}

/// Hex SHA-256 of a text.
pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use rowdex_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors of
/// different lengths, or zero-magnitude vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Similarity score under `metric`. Higher always means closer.
///
/// Euclidean distance is mapped to `1 / (1 + d)` so that it ranks the same
/// way as the other metrics.
pub fn similarity(metric: Metric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        Metric::Cosine => cosine_similarity(a, b),
        Metric::Dot => dot_product(a, b),
        Metric::Euclidean => {
            if a.len() != b.len() {
                return 0.0;
            }
            1.0 / (1.0 + euclidean_distance(a, b))
        }
    }
}
