//! # rowdex core
//!
//! Shared logic for rowdex: record and index models, the document
//! normalizer, the error taxonomy, the vector store abstraction, similarity
//! metrics and result ranking.
//!
//! This crate contains no tokio, sqlx, HTTP clients or filesystem I/O.
//! Application code supplies a [`store::VectorStore`] and an
//! [`embedding::Embedder`]; everything here is pure or trait-bound.

pub mod embedding;
pub mod error;
pub mod models;
pub mod normalize;
pub mod search;
pub mod store;

pub use error::{Error, Result};
