//! Row loader: runs a read-only query and returns [`Record`]s.
//!
//! The pipeline talks to the relational source through [`RowSource`], so any
//! backend that can answer a query with rows plugs in. [`SqliteRowSource`]
//! is the bundled implementation over sqlx.
//!
//! Queries must be read-oriented. Statements whose first keyword is not
//! `SELECT`, `WITH`, `VALUES` or `EXPLAIN` are rejected before reaching the
//! driver, and the SQLite connection itself is opened read-only. Driver
//! errors (syntax, missing table) surface immediately as
//! [`Error::RowLoad`]; there is no retry. An empty result set is an empty
//! `Vec`, not an error.

use async_trait::async_trait;
use rowdex_core::error::{Error, Result};
use rowdex_core::models::{Record, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, SqlitePool, TypeInfo, ValueRef};
use tracing::debug;

use crate::config::Config;
use crate::db;

#[async_trait]
pub trait RowSource: Send + Sync {
    /// Execute `query` with positional `params` and return every row in order.
    async fn fetch(&self, query: &str, params: &[String]) -> Result<Vec<Record>>;
}

/// sqlx-backed SQLite row source.
pub struct SqliteRowSource {
    pool: SqlitePool,
}

impl SqliteRowSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn open(config: &Config) -> Result<Self> {
        Ok(Self::new(db::connect_source(config).await?))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl RowSource for SqliteRowSource {
    async fn fetch(&self, query: &str, params: &[String]) -> Result<Vec<Record>> {
        ensure_read_only(query)?;

        let mut q = sqlx::query(query);
        for p in params {
            q = q.bind(p);
        }

        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::RowLoad(e.to_string()))?;

        debug!(rows = rows.len(), "source query returned");
        rows.iter().map(row_to_record).collect()
    }
}

/// Reject statements that are not plain reads.
pub fn ensure_read_only(query: &str) -> Result<()> {
    let first = query
        .trim_start()
        .split(|c: char| c.is_whitespace() || c == '(')
        .find(|w| !w.is_empty())
        .unwrap_or("")
        .to_ascii_uppercase();

    match first.as_str() {
        "SELECT" | "WITH" | "VALUES" | "EXPLAIN" => Ok(()),
        "" => Err(Error::RowLoad("source query is empty".to_string())),
        other => Err(Error::RowLoad(format!(
            "source query must be read-only; refusing statement starting with '{}'",
            other
        ))),
    }
}

fn row_to_record(row: &SqliteRow) -> Result<Record> {
    let mut record = Record::new();
    for (i, column) in row.columns().iter().enumerate() {
        record.push(column.name(), column_value(row, i)?);
    }
    Ok(record)
}

/// Map one SQLite value to a [`Value`] by its runtime storage class.
fn column_value(row: &SqliteRow, i: usize) -> Result<Value> {
    let raw = row
        .try_get_raw(i)
        .map_err(|e| Error::RowLoad(e.to_string()))?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_string();

    let decoded = match type_name.as_str() {
        "INTEGER" => row.try_get::<i64, _>(i).map(Value::Integer),
        "REAL" => row.try_get::<f64, _>(i).map(Value::Float),
        "BOOLEAN" => row.try_get::<bool, _>(i).map(Value::Bool),
        "BLOB" => row.try_get::<Vec<u8>, _>(i).map(Value::Bytes),
        _ => row.try_get::<String, _>(i).map(Value::Text),
    };

    decoded.map_err(|e| {
        Error::RowLoad(format!(
            "cannot decode column {} ({}): {}",
            i, type_name, e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn seeded() -> SqliteRowSource {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT, price REAL, note TEXT, photo BLOB)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO items VALUES (1, 'a', 1.5, NULL, NULL), (2, 'b', 2.0, 'x', X'00FF')")
            .execute(&pool)
            .await
            .unwrap();
        SqliteRowSource::new(pool)
    }

    #[test]
    fn test_read_only_guard() {
        assert!(ensure_read_only("SELECT * FROM t").is_ok());
        assert!(ensure_read_only("  with x as (select 1) select * from x").is_ok());
        assert!(ensure_read_only("(SELECT 1)").is_ok());
        assert!(ensure_read_only("DELETE FROM t").is_err());
        assert!(ensure_read_only("insert into t values (1)").is_err());
        assert!(ensure_read_only("   ").is_err());
    }

    #[tokio::test]
    async fn test_fetch_maps_storage_classes() {
        let source = seeded().await;
        let rows = source
            .fetch("SELECT id, name, price, note, photo FROM items ORDER BY id", &[])
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        let first = &rows[0];
        let columns: Vec<&str> = first.iter().map(|(c, _)| c).collect();
        assert_eq!(columns, vec!["id", "name", "price", "note", "photo"]);
        assert_eq!(first.get("id"), Some(&Value::Integer(1)));
        assert_eq!(first.get("price"), Some(&Value::Float(1.5)));
        assert_eq!(first.get("note"), Some(&Value::Null));
        assert_eq!(rows[1].get("photo"), Some(&Value::Bytes(vec![0x00, 0xFF])));
    }

    #[tokio::test]
    async fn test_params_are_bound() {
        let source = seeded().await;
        let rows = source
            .fetch("SELECT name FROM items WHERE name = ?", &["b".to_string()])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("name"), Some(&Value::from("b")));
    }

    #[tokio::test]
    async fn test_empty_result_is_ok() {
        let source = seeded().await;
        let rows = source
            .fetch("SELECT * FROM items WHERE id > 100", &[])
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_syntax_error_is_row_load_error() {
        let source = seeded().await;
        let err = source.fetch("SELECT FROM WHERE", &[]).await.unwrap_err();
        assert_eq!(err.kind(), "row_load");
    }
}
