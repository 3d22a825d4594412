//! # rowdex
//!
//! Turns the rows of a relational query into a searchable vector index.
//!
//! Rows are normalized into `column=value` documents, embedded through an
//! external model API, and upserted into a named index that is created on
//! first use. Queries embed a text with the same model and return the top-k
//! closest rows.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌──────────┐   ┌──────────────┐
//! │ RowSource│──▶│ normalize │──▶│ Embedder │──▶│ IndexManager │
//! │ (SQLite) │   │ (core)    │   │ (HTTP)   │   │ + VectorStore│
//! └──────────┘   └───────────┘   └──────────┘   └──────┬───────┘
//!                                                      │
//!                                   query text ──▶ Query engine
//! ```
//!
//! Domain types, the error taxonomy, normalization and the store trait live
//! in `rowdex-core`; this crate holds the I/O: SQLite, HTTP, CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | SQLite connections for source and index databases |
//! | [`migrate`] | Index database schema |
//! | [`loader`] | Row loading from the relational source |
//! | [`embedding`] | OpenAI / Ollama embedding providers with retry |
//! | [`sqlite_store`] | SQLite-backed vector store |
//! | [`index`] | Index lifecycle, schema checks, batched upserts |
//! | [`build`] | The build pipeline |
//! | [`query`] | Top-k similarity queries |
//! | [`progress`] | Build progress on stderr |
//! | [`stats`] | Index statistics |
//! | [`logging`] | `tracing` subscriber setup |

pub mod build;
pub mod config;
pub mod db;
pub mod embedding;
pub mod index;
pub mod loader;
pub mod logging;
pub mod migrate;
pub mod progress;
pub mod query;
pub mod sqlite_store;
pub mod stats;

pub use rowdex_core::error::{Error, Result};
