use std::str::FromStr;
use std::time::Duration;

use rowdex_core::error::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::config::Config;

/// Open (creating if needed) the SQLite database that holds the vector indexes.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.index.path;

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            Error::VectorStore(format!("cannot create {}: {}", parent.display(), e))
        })?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
        .map_err(store_err)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(config.index.timeout_secs))
        .connect_with(options)
        .await
        .map_err(store_err)
}

/// Open the relational source read-only. The file must already exist.
pub async fn connect_source(config: &Config) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.source.url)
        .map_err(|e| Error::Configuration(format!("invalid source.url: {}", e)))?
        .read_only(true)
        .create_if_missing(false);

    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(|e| Error::RowLoad(format!("cannot open source database: {}", e)))
}

pub(crate) fn store_err(e: sqlx::Error) -> Error {
    Error::VectorStore(e.to_string())
}
