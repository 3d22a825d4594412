use rowdex_core::error::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db::{self, store_err};

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the vector store schema on an open pool. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // One row per named index; dims and metric never change after insert.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vector_indexes (
            name TEXT PRIMARY KEY,
            dims INTEGER NOT NULL,
            metric TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(store_err)?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_entries (
            index_name TEXT NOT NULL,
            id TEXT NOT NULL,
            embedding BLOB NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (index_name, id),
            FOREIGN KEY (index_name) REFERENCES vector_indexes(name)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(store_err)?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_index_entries_updated_at ON index_entries(index_name, updated_at DESC)",
    )
    .execute(pool)
    .await
    .map_err(store_err)?;

    Ok(())
}
