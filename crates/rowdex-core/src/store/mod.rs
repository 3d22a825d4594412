//! Vector store abstraction.
//!
//! The [`VectorStore`] trait is the boundary between rowdex and whatever
//! holds the vectors (SQLite in the app crate, [`memory::InMemoryStore`]
//! here). Implementations must be `Send + Sync` to work with async runtimes.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`describe`](VectorStore::describe) | Schema and size of a named index, if it exists |
//! | [`create`](VectorStore::create) | Create an index with fixed dims and metric |
//! | [`upsert`](VectorStore::upsert) | Insert-or-replace a batch of entries atomically |
//! | [`query`](VectorStore::query) | Top-k nearest neighbours under the index metric |
//! | [`count`](VectorStore::count) | Entry count of an existing index |
//!
//! Schema validation (dims, metric) is the index manager's job; stores
//! persist what they are given. Deleting an index is an administrative
//! concern outside this trait.

pub mod memory;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::{Embedding, IndexEntry, IndexSpec, QueryHit};

/// Schema plus current size of an existing index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexInfo {
    pub spec: IndexSpec,
    pub entries: u64,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Returns the index schema and entry count, or `None` if absent.
    async fn describe(&self, name: &str) -> Result<Option<IndexInfo>>;

    /// Create an index. Creating one that already exists is an error at this layer.
    async fn create(&self, spec: &IndexSpec) -> Result<()>;

    /// Write a batch as a single atomic unit. Returns the number of entries written.
    async fn upsert(&self, name: &str, entries: &[IndexEntry]) -> Result<usize>;

    /// Up to `top_k` hits ordered by descending score.
    async fn query(&self, name: &str, vector: &Embedding, top_k: usize) -> Result<Vec<QueryHit>>;

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.describe(name).await?.is_some())
    }

    /// Number of entries in an existing index.
    async fn count(&self, name: &str) -> Result<u64> {
        self.describe(name)
            .await?
            .map(|info| info.entries)
            .ok_or_else(|| Error::IndexNotFound(name.to_string()))
    }
}
