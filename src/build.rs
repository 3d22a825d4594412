//! Index build pipeline: rows → documents → embeddings → index.
//!
//! # Steps
//!
//! 1. Make sure the index exists with the configured schema (created if absent).
//! 2. Load rows from the [`RowSource`]. A load failure aborts; zero rows is a
//!    successful empty build.
//! 3. Normalize every row. Rows that fail are skipped and counted. When two
//!    rows share an id, the later row in source order wins.
//! 4. Per batch of `index.batch_size` documents: embed on a bounded worker
//!    pool, assemble each `(id, vector, metadata)` triple inside the task
//!    that produced the vector, then upsert the batch in source order.
//! 5. Between batches, honour cancellation. Batches already written stay.
//!
//! Per-record problems ([`Error::Normalization`],
//! [`Error::EmbeddingInputTooLarge`]) land in the [`BuildReport`]. Everything
//! else aborts the build and is returned.

use std::collections::HashMap;
use std::sync::Arc;

use rowdex_core::embedding::{CachingEmbedder, Embedder};
use rowdex_core::error::{Error, Result};
use rowdex_core::models::{Document, IndexEntry, IndexSpec, Record};
use rowdex_core::normalize::normalize;
use rowdex_core::store::VectorStore;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::embedding::{create_embedder, InputPolicy};
use crate::index::{check_schema, IndexManager, IndexState, StoreSettings};
use crate::loader::{RowSource, SqliteRowSource};
use crate::progress::{format_number, BuildProgressEvent, BuildProgressReporter};
use crate::sqlite_store::SqliteStore;

/// Knobs for one build, usually taken from [`Config`].
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub query: String,
    pub params: Vec<String>,
    pub key_column: Option<String>,
    pub batch_size: usize,
    pub max_concurrency: usize,
    pub input: InputPolicy,
    /// Load and normalize only; no index creation, embedding or writes.
    pub dry_run: bool,
}

impl BuildOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            query: config.source.query.clone(),
            params: config.source.params.clone(),
            key_column: config.source.key_column.clone(),
            batch_size: config.index.batch_size.max(1),
            max_concurrency: config.embedding.max_concurrency.max(1),
            input: InputPolicy::from_config(&config.embedding),
            dry_run: false,
        }
    }
}

/// A record left out of the index, and why.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedRecord {
    pub id: String,
    pub kind: &'static str,
    pub reason: String,
}

/// Outcome of a build that did not abort.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
    pub index: String,
    pub rows_loaded: u64,
    pub indexed: u64,
    pub skipped_normalization: u64,
    pub skipped_oversized: u64,
    /// Rows dropped because a later row carried the same id.
    pub duplicates: u64,
    pub truncated: u64,
    pub batches: u64,
    pub cancelled: bool,
    pub dry_run: bool,
    pub skipped: Vec<SkippedRecord>,
}

impl BuildReport {
    pub fn skipped_total(&self) -> u64 {
        self.skipped_normalization + self.skipped_oversized
    }

    fn skip(&mut self, id: String, err: &Error) {
        match err {
            Error::EmbeddingInputTooLarge { .. } => self.skipped_oversized += 1,
            _ => self.skipped_normalization += 1,
        }
        warn!(index = %self.index, record = %id, error = %err, "skipping record");
        self.skipped.push(SkippedRecord {
            id,
            kind: err.kind(),
            reason: err.to_string(),
        });
    }
}

/// Run a full build of `spec` from `source`.
///
/// The caller must ensure no other build of the same index runs concurrently.
pub async fn build_index<R, S>(
    source: &R,
    embedder: Arc<dyn Embedder>,
    manager: &IndexManager<S>,
    spec: &IndexSpec,
    options: &BuildOptions,
    cancel: &CancellationToken,
    progress: &dyn BuildProgressReporter,
) -> Result<BuildReport>
where
    R: RowSource + ?Sized,
    S: VectorStore,
{
    if embedder.dims() != spec.dims {
        return Err(Error::Configuration(format!(
            "embedder '{}' produces {} dimensions but index '{}' is configured for {}",
            embedder.model_name(),
            embedder.dims(),
            spec.name,
            spec.dims
        )));
    }

    let mut report = BuildReport {
        index: spec.name.clone(),
        dry_run: options.dry_run,
        ..Default::default()
    };

    if options.dry_run {
        if let IndexState::Ready(info) = manager.state(&spec.name).await? {
            check_schema(spec, &info.spec)?;
        }
    } else {
        manager.ensure_ready(spec).await?;
    }

    progress.report(BuildProgressEvent::Loading {
        index: spec.name.clone(),
    });
    let rows = source.fetch(&options.query, &options.params).await?;
    report.rows_loaded = rows.len() as u64;

    if rows.is_empty() {
        info!(index = %spec.name, "no data to index");
        return Ok(report);
    }

    let mut documents: Vec<(Document, Record)> = Vec::with_capacity(rows.len());
    for (ordinal, record) in rows.into_iter().enumerate() {
        match normalize(ordinal, &record, options.key_column.as_deref()) {
            Ok(doc) => documents.push((doc, record)),
            Err(e) => {
                let id = match &e {
                    Error::Normalization { record, .. } => record.clone(),
                    _ => ordinal.to_string(),
                };
                report.skip(id, &e);
            }
        }
    }

    let documents = drop_duplicate_ids(documents, &mut report);

    if options.dry_run {
        info!(
            index = %spec.name,
            rows = report.rows_loaded,
            documents = documents.len(),
            "dry run complete"
        );
        return Ok(report);
    }

    let embedder = Arc::new(CachingEmbedder::new(embedder));
    let semaphore = Arc::new(Semaphore::new(options.max_concurrency.max(1)));
    let total = documents.len() as u64;

    for batch in documents.chunks(options.batch_size.max(1)) {
        if cancel.is_cancelled() {
            warn!(index = %spec.name, indexed = report.indexed, "build cancelled");
            report.cancelled = true;
            break;
        }

        let entries = embed_batch(batch, &embedder, &semaphore, options.input, &mut report).await?;
        if !entries.is_empty() {
            report.indexed += manager.upsert(&spec.name, &entries).await? as u64;
            report.batches += 1;
        }

        progress.report(BuildProgressEvent::Indexing {
            index: spec.name.clone(),
            n: report.indexed + report.skipped_oversized,
            total,
        });
    }

    info!(
        index = %spec.name,
        rows = report.rows_loaded,
        indexed = report.indexed,
        skipped = report.skipped_total(),
        cancelled = report.cancelled,
        "build finished"
    );
    Ok(report)
}

/// Keep only the last row for each id, in source order.
fn drop_duplicate_ids(
    documents: Vec<(Document, Record)>,
    report: &mut BuildReport,
) -> Vec<(Document, Record)> {
    let mut last: HashMap<String, usize> = HashMap::with_capacity(documents.len());
    for (pos, (doc, _)) in documents.iter().enumerate() {
        last.insert(doc.id.clone(), pos);
    }
    if last.len() == documents.len() {
        return documents;
    }

    documents
        .into_iter()
        .enumerate()
        .filter_map(|(pos, (doc, record))| {
            if last.get(&doc.id) == Some(&pos) {
                return Some((doc, record));
            }
            report.duplicates += 1;
            warn!(index = %report.index, record = %doc.id, "duplicate id, a later row replaces this one");
            None
        })
        .collect()
}

/// Embed one batch concurrently and assemble its index entries.
///
/// Entries come back in batch order whatever order the workers finish in.
async fn embed_batch<E>(
    batch: &[(Document, Record)],
    embedder: &Arc<E>,
    semaphore: &Arc<Semaphore>,
    input: InputPolicy,
    report: &mut BuildReport,
) -> Result<Vec<IndexEntry>>
where
    E: Embedder + 'static,
{
    let mut tasks = JoinSet::new();

    for (pos, (doc, record)) in batch.iter().enumerate() {
        let text = match input.apply(&doc.text) {
            Ok(text) => {
                if input.exceeds(&doc.text) {
                    report.truncated += 1;
                }
                text.into_owned()
            }
            Err(e) => {
                report.skip(doc.id.clone(), &e);
                continue;
            }
        };

        let id = doc.id.clone();
        let metadata = record.clone();
        let embedder = Arc::clone(embedder);
        let semaphore = Arc::clone(semaphore);

        tasks.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| Error::EmbeddingService {
                    attempts: 0,
                    message: format!("worker pool closed: {}", e),
                })?;
            let vector = embedder.embed(&text).await;
            Ok::<_, Error>((pos, id, vector, metadata))
        });
    }

    let mut entries = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        let (pos, id, vector, metadata) = joined.map_err(|e| Error::EmbeddingService {
            attempts: 0,
            message: format!("embedding task failed: {}", e),
        })??;

        match vector {
            Ok(vector) => entries.push((
                pos,
                IndexEntry {
                    id,
                    vector,
                    metadata,
                },
            )),
            Err(e) if e.is_recoverable() => report.skip(id, &e),
            Err(e) => {
                tasks.abort_all();
                return Err(e);
            }
        }
    }

    entries.sort_by_key(|(pos, _)| *pos);
    Ok(entries.into_iter().map(|(_, entry)| entry).collect())
}

/// `rowdex build`: open the source and index databases, run the pipeline,
/// print the report on stdout.
pub async fn run_build(
    config: &Config,
    options: &BuildOptions,
    progress: &dyn BuildProgressReporter,
    cancel: &CancellationToken,
    json: bool,
) -> Result<BuildReport> {
    let embedder: Arc<dyn Embedder> = Arc::from(create_embedder(&config.embedding)?);
    let source = SqliteRowSource::open(config).await?;
    let store = SqliteStore::open(config).await?;
    let manager = IndexManager::new(store, StoreSettings::from_config(&config.index));

    let result = build_index(
        &source,
        embedder,
        &manager,
        &config.index_spec(),
        options,
        cancel,
        progress,
    )
    .await;

    source.close().await;
    manager.store().close().await;
    let report = result?;

    if json {
        let out = serde_json::to_string_pretty(&report)
            .map_err(|e| Error::Configuration(format!("cannot serialize report: {}", e)))?;
        println!("{}", out);
    } else {
        print_report(&report);
    }
    Ok(report)
}

fn print_report(report: &BuildReport) {
    let verb = if report.dry_run { "Dry run" } else { "Build" };
    println!("{} of index '{}'", verb, report.index);
    println!("  rows loaded:   {}", format_number(report.rows_loaded));
    if !report.dry_run {
        println!("  indexed:       {}", format_number(report.indexed));
        println!("  batches:       {}", report.batches);
    }
    println!(
        "  skipped:       {} ({} normalization, {} oversized)",
        report.skipped_total(),
        report.skipped_normalization,
        report.skipped_oversized
    );
    if report.duplicates > 0 {
        println!("  duplicate ids: {} (later rows kept)", report.duplicates);
    }
    if report.truncated > 0 {
        println!("  truncated:     {}", report.truncated);
    }
    for s in &report.skipped {
        println!("    - {} [{}] {}", s.id, s.kind, s.reason);
    }
    if report.cancelled {
        println!("  cancelled before completion; entries written so far are kept");
    }
}
