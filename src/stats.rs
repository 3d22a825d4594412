//! Index statistics.
//!
//! Quick summary of what the index database holds: every index with its
//! schema, entry count and last write. Used by `rowdex stats` to confirm a
//! build landed where expected.

use rowdex_core::error::Result;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

/// Run the stats command: query the index database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let indexes = store.list().await?;

    let db_size = std::fs::metadata(&config.index.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("rowdex: index stats");
    println!("===================");
    println!();
    println!("  Database:    {}", config.index.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Indexes:     {}", indexes.len());

    if !indexes.is_empty() {
        println!();
        println!(
            "  {:<24} {:>6} {:<10} {:>10}   {}",
            "INDEX", "DIMS", "METRIC", "ENTRIES", "LAST WRITE"
        );
        println!("  {}", "-".repeat(72));

        for info in &indexes {
            let last = match store.last_write(&info.spec.name).await? {
                Some(ts) => format_ts_relative(ts),
                None => "never".to_string(),
            };
            let marker = if info.spec.name == config.index.name { "*" } else { "" };
            println!(
                "  {:<24} {:>6} {:<10} {:>10}   {}",
                format!("{}{}", info.spec.name, marker),
                info.spec.dims,
                info.spec.metric.as_str(),
                info.entries,
                last
            );
        }
    }

    println!();
    store.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp relative to now (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
