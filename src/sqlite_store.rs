//! SQLite-backed [`VectorStore`] implementation.
//!
//! Index schemas live in `vector_indexes`, entries in `index_entries` with
//! vectors stored as little-endian f32 BLOBs. Each upsert batch is one
//! transaction, so a batch is either fully applied or not at all.
//! Search is brute-force scoring in Rust over every entry of the index.

use async_trait::async_trait;
use rowdex_core::embedding::{blob_to_vec, similarity, vec_to_blob};
use rowdex_core::error::{Error, Result};
use rowdex_core::models::{Embedding, IndexEntry, IndexSpec, Metric, QueryHit, Record};
use rowdex_core::search::rank_hits;
use rowdex_core::store::{IndexInfo, VectorStore};
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db::{self, store_err};
use crate::migrate;

/// SQLite implementation of the [`VectorStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured index database and make sure the schema exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// All index names with their schema and size, sorted by name.
    pub async fn list(&self) -> Result<Vec<IndexInfo>> {
        let rows = sqlx::query(
            r#"
            SELECT v.name, v.dims, v.metric, COUNT(e.id) AS entries
            FROM vector_indexes v
            LEFT JOIN index_entries e ON e.index_name = v.name
            GROUP BY v.name
            ORDER BY v.name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.iter()
            .map(|row| {
                let entries: i64 = row.get("entries");
                Ok(IndexInfo {
                    spec: spec_from_row(row)?,
                    entries: entries as u64,
                })
            })
            .collect()
    }

    /// Schema of `name` without counting its entries.
    async fn spec(&self, name: &str) -> Result<Option<IndexSpec>> {
        sqlx::query("SELECT name, dims, metric FROM vector_indexes WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?
            .as_ref()
            .map(spec_from_row)
            .transpose()
    }

    /// Unix timestamp of the most recent write to `name`, if any.
    pub async fn last_write(&self, name: &str) -> Result<Option<i64>> {
        sqlx::query_scalar("SELECT MAX(updated_at) FROM index_entries WHERE index_name = ?")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)
    }
}

fn spec_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<IndexSpec> {
    let name: String = row.get("name");
    let dims: i64 = row.get("dims");
    let metric: String = row.get("metric");
    let metric: Metric = metric
        .parse()
        .map_err(|_| Error::VectorStore(format!("index '{}' has unknown metric '{}'", name, metric)))?;
    Ok(IndexSpec::new(name, dims as usize, metric))
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn describe(&self, name: &str) -> Result<Option<IndexInfo>> {
        let row = sqlx::query("SELECT name, dims, metric FROM vector_indexes WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let entries: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM index_entries WHERE index_name = ?")
                .bind(name)
                .fetch_one(&self.pool)
                .await
                .map_err(store_err)?;

        Ok(Some(IndexInfo {
            spec: spec_from_row(&row)?,
            entries: entries as u64,
        }))
    }

    async fn create(&self, spec: &IndexSpec) -> Result<()> {
        sqlx::query(
            "INSERT INTO vector_indexes (name, dims, metric, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&spec.name)
        .bind(spec.dims as i64)
        .bind(spec.metric.as_str())
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn upsert(&self, name: &str, entries: &[IndexEntry]) -> Result<usize> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO index_entries (index_name, id, embedding, metadata_json, updated_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(index_name, id) DO UPDATE SET
                    embedding = excluded.embedding,
                    metadata_json = excluded.metadata_json,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(name)
            .bind(&entry.id)
            .bind(vec_to_blob(&entry.vector))
            .bind(entry.metadata.to_json())
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        }

        tx.commit().await.map_err(store_err)?;
        Ok(entries.len())
    }

    async fn query(&self, name: &str, vector: &Embedding, top_k: usize) -> Result<Vec<QueryHit>> {
        let spec = self
            .spec(name)
            .await?
            .ok_or_else(|| Error::IndexNotFound(name.to_string()))?;

        let rows = sqlx::query(
            "SELECT id, embedding, metadata_json FROM index_entries WHERE index_name = ?",
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.get("id");
            let blob: Vec<u8> = row.get("embedding");
            let metadata_json: String = row.get("metadata_json");
            let metadata = Record::from_json(&metadata_json).map_err(|e| {
                Error::VectorStore(format!("corrupt metadata for entry '{}': {}", id, e))
            })?;
            hits.push(QueryHit {
                score: similarity(spec.metric, vector, &blob_to_vec(&blob)),
                id,
                metadata,
            });
        }

        Ok(rank_hits(hits, top_k))
    }
}
