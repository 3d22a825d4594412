//! Drives the `rowdex` binary end to end against temp databases and a mock
//! Ollama server.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Output;

use axum::routing::post;
use axum::{Json, Router};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tempfile::TempDir;
use tokio::process::Command;

fn rowdex_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("rowdex");
    path
}

/// Letter counts for a, b and c: just enough structure for stable rankings.
async fn mock_embed(Json(body): Json<serde_json::Value>) -> Json<serde_json::Value> {
    let text = body["input"][0].as_str().unwrap_or_default();
    let count = |ch: char| text.chars().filter(|c| *c == ch).count() as f32;
    Json(serde_json::json!({ "embeddings": [[count('a'), count('b'), count('c')]] }))
}

async fn serve_mock() -> String {
    let app = Router::new().route("/api/embed", post(mock_embed));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn seed_source(path: &Path) {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();
    sqlx::query("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO items (id, name) VALUES (1, 'a'), (2, 'b'), (3, 'c')")
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;
}

async fn setup_test_env(embed_url: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    seed_source(&root.join("source.sqlite")).await;

    let config_path = config_dir.join("rowdex.toml");
    fs::write(
        &config_path,
        format!(
            r#"
[source]
url = "sqlite:{source}"
query = "SELECT id, name FROM items WHERE id <= ? ORDER BY id"
params = ["100"]
key_column = "id"

[embedding]
provider = "ollama"
model = "letters"
dims = 3
url = "{embed_url}"
backoff_base_ms = 1

[index]
path = "{index}"
name = "items"
batch_size = 2
"#,
            source = root.join("source.sqlite").display(),
            index = root.join("data").join("rowdex.sqlite").display(),
        ),
    )
    .unwrap();

    (tmp, config_path)
}

async fn run(config: &Path, args: &[&str]) -> Output {
    Command::new(rowdex_binary())
        .arg("--config")
        .arg(config)
        .args(args)
        .output()
        .await
        .expect("failed to run rowdex")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({}): {}",
            e,
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

#[tokio::test]
async fn test_init_build_query_stats() {
    let url = serve_mock().await;
    let (_tmp, config) = setup_test_env(&url).await;

    let out = run(&config, &["init"]).await;
    assert!(out.status.success(), "init failed: {}", String::from_utf8_lossy(&out.stderr));

    let out = run(&config, &["build", "--json"]).await;
    assert!(out.status.success(), "build failed: {}", String::from_utf8_lossy(&out.stderr));
    let report = stdout_json(&out);
    assert_eq!(report["rows_loaded"], 3);
    assert_eq!(report["indexed"], 3);
    assert_eq!(report["batches"], 2);
    assert_eq!(report["cancelled"], false);

    let out = run(&config, &["query", "b", "--top-k", "2", "--json"]).await;
    assert!(out.status.success(), "query failed: {}", String::from_utf8_lossy(&out.stderr));
    let hits = stdout_json(&out);
    let hits = hits.as_array().unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0]["id"], "2");
    // Remaining entries tie at zero; lower id first.
    assert_eq!(hits[1]["id"], "1");
    assert_eq!(hits[0]["metadata"]["name"], "b");

    let out = run(&config, &["stats"]).await;
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("items*"));
    assert!(stdout.contains("cosine"));
}

#[tokio::test]
async fn test_param_override_limits_rows() {
    let url = serve_mock().await;
    let (_tmp, config) = setup_test_env(&url).await;

    let out = run(&config, &["build", "--param", "2", "--json"]).await;
    assert!(out.status.success(), "build failed: {}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(stdout_json(&out)["indexed"], 2);
}

#[tokio::test]
async fn test_dry_run_leaves_no_index() {
    let url = serve_mock().await;
    let (_tmp, config) = setup_test_env(&url).await;

    let out = run(&config, &["build", "--dry-run", "--json"]).await;
    assert!(out.status.success());
    let report = stdout_json(&out);
    assert_eq!(report["dry_run"], true);
    assert_eq!(report["rows_loaded"], 3);
    assert_eq!(report["indexed"], 0);

    let out = run(&config, &["query", "b"]).await;
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("index 'items' not found"), "stderr: {}", stderr);
}

#[tokio::test]
async fn test_query_human_output() {
    let url = serve_mock().await;
    let (_tmp, config) = setup_test_env(&url).await;

    assert!(run(&config, &["build"]).await.status.success());
    let out = run(&config, &["query", "c", "-k", "1"]).await;
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.starts_with("1. ["), "stdout: {}", stdout);
    assert!(stdout.contains("name: c"));
}

#[tokio::test]
async fn test_invalid_config_fails() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("bad.toml");
    fs::write(&config, "[source]\nurl = \"sqlite:x\"\n").unwrap();

    let out = run(&config, &["stats"]).await;
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("configuration error"));
}

#[tokio::test]
async fn test_completions_need_no_config() {
    let out = run(Path::new("/nonexistent/rowdex.toml"), &["completions", "bash"]).await;
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("rowdex"));
}
