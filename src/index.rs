//! Vector index manager.
//!
//! Owns the lifecycle of named indexes on top of any [`VectorStore`]:
//!
//! ```text
//!   Absent ──ensure_ready──▶ Creating ──▶ Ready ──upsert──▶ Ready
//! ```
//!
//! - [`ensure_ready`](IndexManager::ensure_ready) creates a missing index and
//!   is a no-op for an existing one with the same dims and metric. Any
//!   mismatch is an [`Error::IndexSchemaConflict`]; it is never reconciled.
//! - [`upsert`](IndexManager::upsert) validates every vector against the
//!   index dims before writing anything, then writes in batches. Each batch
//!   is one store call (atomic at the store) retried whole on failure.
//! - Every store call is bounded by a timeout; a timeout counts as a failed
//!   attempt.
//!
//! Only one build per index may run at a time. The manager does not lock;
//! callers must not run concurrent builds of the same index.

use std::future::Future;
use std::time::Duration;

use rowdex_core::error::{Error, Result};
use rowdex_core::models::{Embedding, IndexEntry, IndexSpec, QueryHit};
use rowdex_core::store::{IndexInfo, VectorStore};
use tracing::{debug, info, warn};

use crate::config::IndexConfig;
use crate::embedding::retry::RetryPolicy;

/// Observable lifecycle state of a named index.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexState {
    Absent,
    Ready(IndexInfo),
}

#[derive(Debug, Clone, Copy)]
pub struct StoreSettings {
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub batch_size: usize,
}

impl StoreSettings {
    pub fn from_config(config: &IndexConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            retry: RetryPolicy::new(config.max_attempts, config.backoff_base_ms),
            batch_size: config.batch_size.max(1),
        }
    }
}

pub struct IndexManager<S> {
    store: S,
    settings: StoreSettings,
}

impl<S: VectorStore> IndexManager<S> {
    pub fn new(store: S, settings: StoreSettings) -> Self {
        Self { store, settings }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    pub async fn state(&self, name: &str) -> Result<IndexState> {
        Ok(match self.call("describe", || self.store.describe(name)).await? {
            Some(info) => IndexState::Ready(info),
            None => IndexState::Absent,
        })
    }

    /// Schema and size of an existing index.
    ///
    /// # Errors
    ///
    /// [`Error::IndexNotFound`] if the index was never created.
    pub async fn describe(&self, name: &str) -> Result<IndexInfo> {
        match self.state(name).await? {
            IndexState::Ready(info) => Ok(info),
            IndexState::Absent => Err(Error::IndexNotFound(name.to_string())),
        }
    }

    /// Make sure `spec.name` exists with exactly `spec.dims` and `spec.metric`.
    pub async fn ensure_ready(&self, spec: &IndexSpec) -> Result<IndexInfo> {
        if let IndexState::Ready(info) = self.state(&spec.name).await? {
            check_schema(spec, &info.spec)?;
            debug!(index = %spec.name, entries = info.entries, "index ready");
            return Ok(info);
        }

        info!(index = %spec.name, dims = spec.dims, metric = %spec.metric, "creating index");
        let created = self.call("create", || self.store.create(spec)).await;

        // Another process may have created it between describe and create.
        match (created, self.state(&spec.name).await?) {
            (_, IndexState::Ready(info)) => {
                check_schema(spec, &info.spec)?;
                Ok(info)
            }
            (Err(e), IndexState::Absent) => Err(e),
            (Ok(()), IndexState::Absent) => Err(Error::VectorStore(format!(
                "index '{}' missing immediately after creation",
                spec.name
            ))),
        }
    }

    /// Write `entries` to an existing index. Returns the number written.
    ///
    /// # Errors
    ///
    /// - [`Error::IndexNotFound`] if the index is absent.
    /// - [`Error::IndexSchemaConflict`] if any vector has the wrong length;
    ///   nothing is written in that case.
    /// - [`Error::VectorStore`] once a batch has exhausted its retries.
    ///   Batches before it stay written.
    pub async fn upsert(&self, name: &str, entries: &[IndexEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Err(Error::VectorStore(format!(
                "upsert to '{}' called with no entries",
                name
            )));
        }

        let info = self.describe(name).await?;
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != info.spec.dims) {
            return Err(Error::schema_conflict(
                name,
                format!(
                    "entry '{}' has {} dimensions, index expects {}",
                    bad.id,
                    bad.vector.len(),
                    info.spec.dims
                ),
            ));
        }

        let mut written = 0;
        for batch in entries.chunks(self.settings.batch_size) {
            written += self.call("upsert", || self.store.upsert(name, batch)).await?;
        }
        debug!(index = %name, written, "upsert complete");
        Ok(written)
    }

    /// Top-k nearest entries to `vector` under the index metric.
    pub async fn query(&self, name: &str, vector: &Embedding, top_k: usize) -> Result<Vec<QueryHit>> {
        let info = self.describe(name).await?;
        self.query_described(&info, vector, top_k).await
    }

    /// [`query`](Self::query) against an index already looked up with
    /// [`describe`](Self::describe).
    pub async fn query_described(
        &self,
        info: &IndexInfo,
        vector: &Embedding,
        top_k: usize,
    ) -> Result<Vec<QueryHit>> {
        let name = info.spec.name.as_str();
        if vector.len() != info.spec.dims {
            return Err(Error::schema_conflict(
                name,
                format!(
                    "query vector has {} dimensions, index expects {}",
                    vector.len(),
                    info.spec.dims
                ),
            ));
        }
        self.call("query", || self.store.query(name, vector, top_k))
            .await
    }

    /// Run one store operation with timeout and bounded retries.
    ///
    /// Only [`Error::VectorStore`] failures and timeouts are retried; every
    /// other error kind is returned as is.
    async fn call<T, F, Fut>(&self, op: &str, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let policy = self.settings.retry;
        let mut last_err = String::new();

        for attempt in 1..=policy.max_attempts {
            let delay = policy.delay(attempt, None);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match tokio::time::timeout(self.settings.timeout, f()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(Error::VectorStore(msg))) => {
                    warn!(op, attempt, error = %msg, "vector store call failed");
                    last_err = msg;
                }
                Ok(Err(other)) => return Err(other),
                Err(_) => {
                    warn!(op, attempt, timeout_ms = self.settings.timeout.as_millis() as u64, "vector store call timed out");
                    last_err = format!("timed out after {:?}", self.settings.timeout);
                }
            }
        }

        Err(Error::VectorStore(format!(
            "{} failed after {} attempt(s): {}",
            op, policy.max_attempts, last_err
        )))
    }
}

pub(crate) fn check_schema(wanted: &IndexSpec, existing: &IndexSpec) -> Result<()> {
    if wanted.dims != existing.dims {
        return Err(Error::schema_conflict(
            &wanted.name,
            format!(
                "existing index has {} dimensions, requested {}",
                existing.dims, wanted.dims
            ),
        ));
    }
    if wanted.metric != existing.metric {
        return Err(Error::schema_conflict(
            &wanted.name,
            format!(
                "existing index uses metric {}, requested {}",
                existing.metric, wanted.metric
            ),
        ));
    }
    Ok(())
}
