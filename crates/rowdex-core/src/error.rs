//! Error taxonomy for the build and query pipelines.
//!
//! Every failure the pipeline can produce maps to one [`Error`] variant.
//! Two variants are recoverable per record ([`Error::Normalization`] and
//! [`Error::EmbeddingInputTooLarge`]): the build skips the record, counts it
//! and carries on. Every other variant aborts the current build or query.

use thiserror::Error;

/// Convenience alias used across rowdex.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A required setting is missing or inconsistent. Raised before any work starts.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The relational source could not produce rows. No partial build follows.
    #[error("row load failed: {0}")]
    RowLoad(String),

    /// A single record could not be turned into a document.
    #[error("cannot normalize record {record}: {reason}")]
    Normalization { record: String, reason: String },

    /// The embedding service failed after all retry attempts.
    #[error("embedding service error after {attempts} attempt(s): {message}")]
    EmbeddingService { attempts: u32, message: String },

    /// Input text exceeds the model bound and no truncation policy is set.
    #[error("embedding input too large: {len} chars exceeds limit of {max}")]
    EmbeddingInputTooLarge { len: usize, max: usize },

    /// Dimensionality or metric disagrees with the index schema.
    #[error("schema conflict on index '{index}': {detail}")]
    IndexSchemaConflict { index: String, detail: String },

    /// The named index was never created.
    #[error("index '{0}' not found")]
    IndexNotFound(String),

    /// The vector store failed after all retry attempts.
    #[error("vector store error: {0}")]
    VectorStore(String),
}

impl Error {
    /// Whether the build may skip the offending record and continue.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Normalization { .. } | Error::EmbeddingInputTooLarge { .. }
        )
    }

    /// Short machine-readable kind, used in build reports and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Configuration(_) => "configuration",
            Error::RowLoad(_) => "row_load",
            Error::Normalization { .. } => "normalization",
            Error::EmbeddingService { .. } => "embedding_service",
            Error::EmbeddingInputTooLarge { .. } => "embedding_input_too_large",
            Error::IndexSchemaConflict { .. } => "index_schema_conflict",
            Error::IndexNotFound(_) => "index_not_found",
            Error::VectorStore(_) => "vector_store",
        }
    }

    pub fn schema_conflict(index: &str, detail: impl Into<String>) -> Self {
        Error::IndexSchemaConflict {
            index: index.to_string(),
            detail: detail.into(),
        }
    }
}
