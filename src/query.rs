//! Query engine: text → embedding → top-k hits from a named index.
//!
//! The query text goes through the same [`Embedder`] configuration as the
//! build, so query and document vectors come from one model. Results are
//! ordered by descending score, ties broken by ascending id, and hold at
//! most `top_k` hits.

use rowdex_core::embedding::Embedder;
use rowdex_core::error::{Error, Result};
use rowdex_core::models::QueryResult;
use rowdex_core::search::rank_hits;
use rowdex_core::store::VectorStore;
use tracing::debug;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::index::{IndexManager, StoreSettings};
use crate::sqlite_store::SqliteStore;

/// Run a similarity query against `index`.
///
/// # Errors
///
/// - [`Error::Configuration`] if `top_k` is zero.
/// - [`Error::IndexNotFound`] if the index was never created.
/// - [`Error::IndexSchemaConflict`] if the embedder's output length does not
///   match the index dims.
/// - [`Error::EmbeddingService`] / [`Error::EmbeddingInputTooLarge`] from the
///   embedder, and [`Error::VectorStore`] from the store.
///
/// An index that exists but holds no entries yields an empty result.
pub async fn query_index<E, S>(
    embedder: &E,
    manager: &IndexManager<S>,
    index: &str,
    text: &str,
    top_k: usize,
) -> Result<QueryResult>
where
    E: Embedder + ?Sized,
    S: VectorStore,
{
    if top_k == 0 {
        return Err(Error::Configuration("top_k must be >= 1".to_string()));
    }

    let info = manager.describe(index).await?;
    if info.entries == 0 {
        debug!(index, "index is empty");
        return Ok(Vec::new());
    }

    let vector = embedder.embed(text).await?;
    let hits = manager.query_described(&info, &vector, top_k).await?;
    Ok(rank_hits(hits, top_k))
}

/// `rowdex query`: embed `text`, query the configured index, print hits.
pub async fn run_query(config: &Config, text: &str, top_k: Option<usize>, json: bool) -> Result<QueryResult> {
    let embedder = create_embedder(&config.embedding)?;
    let store = SqliteStore::open(config).await?;
    let manager = IndexManager::new(store, StoreSettings::from_config(&config.index));
    let top_k = top_k.unwrap_or(config.retrieval.top_k);

    let result = query_index(embedder.as_ref(), &manager, &config.index.name, text, top_k).await;
    manager.store().close().await;
    let hits = result?;

    if json {
        let out = serde_json::to_string_pretty(&hits)
            .map_err(|e| Error::Configuration(format!("cannot serialize results: {}", e)))?;
        println!("{}", out);
        return Ok(hits);
    }

    if hits.is_empty() {
        println!("No results.");
        return Ok(hits);
    }

    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [{:.4}] {}", i + 1, hit.score, hit.id);
        for (column, value) in hit.metadata.iter() {
            let shown = value
                .canonical()
                .unwrap_or_else(|| "<binary>".to_string());
            println!("    {}: {}", column, shown.replace('\n', " "));
        }
        println!();
    }

    Ok(hits)
}
