//! In-memory [`VectorStore`] implementation for tests and embedding in
//! other programs.
//!
//! Uses `HashMap` behind `std::sync::RwLock`. Search is brute-force over all
//! stored vectors under the index metric.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::similarity;
use crate::error::{Error, Result};
use crate::models::{Embedding, IndexEntry, IndexSpec, QueryHit, Record};
use crate::search::rank_hits;

use super::{IndexInfo, VectorStore};

struct StoredIndex {
    spec: IndexSpec,
    entries: HashMap<String, (Embedding, Record)>,
}

/// In-memory vector store.
pub struct InMemoryStore {
    indexes: RwLock<HashMap<String, StoredIndex>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            indexes: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::VectorStore("in-memory store lock poisoned".to_string())
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn describe(&self, name: &str) -> Result<Option<IndexInfo>> {
        let indexes = self.indexes.read().map_err(poisoned)?;
        Ok(indexes.get(name).map(|idx| IndexInfo {
            spec: idx.spec.clone(),
            entries: idx.entries.len() as u64,
        }))
    }

    async fn create(&self, spec: &IndexSpec) -> Result<()> {
        let mut indexes = self.indexes.write().map_err(poisoned)?;
        if indexes.contains_key(&spec.name) {
            return Err(Error::VectorStore(format!(
                "index '{}' already exists",
                spec.name
            )));
        }
        indexes.insert(
            spec.name.clone(),
            StoredIndex {
                spec: spec.clone(),
                entries: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn upsert(&self, name: &str, entries: &[IndexEntry]) -> Result<usize> {
        let mut indexes = self.indexes.write().map_err(poisoned)?;
        let index = indexes
            .get_mut(name)
            .ok_or_else(|| Error::IndexNotFound(name.to_string()))?;
        for entry in entries {
            index.entries.insert(
                entry.id.clone(),
                (entry.vector.clone(), entry.metadata.clone()),
            );
        }
        Ok(entries.len())
    }

    async fn query(&self, name: &str, vector: &Embedding, top_k: usize) -> Result<Vec<QueryHit>> {
        let indexes = self.indexes.read().map_err(poisoned)?;
        let index = indexes
            .get(name)
            .ok_or_else(|| Error::IndexNotFound(name.to_string()))?;

        let hits = index
            .entries
            .iter()
            .map(|(id, (stored, metadata))| QueryHit {
                id: id.clone(),
                score: similarity(index.spec.metric, vector, stored),
                metadata: metadata.clone(),
            })
            .collect();

        Ok(rank_hits(hits, top_k))
    }
}
