//! HTTP embedding providers against a local mock server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use rowdex::config::{parse_config, EmbeddingConfig};
use rowdex::embedding::{OllamaEmbedder, OpenAIEmbedder};
use rowdex::Error;
use rowdex_core::embedding::Embedder;

/// Replies with `statuses[n]` on the n-th call, then 200 with a fixed vector.
struct Mock {
    calls: AtomicUsize,
    statuses: Vec<StatusCode>,
    last_auth: Mutex<Option<String>>,
    last_body: Mutex<Option<serde_json::Value>>,
}

impl Mock {
    fn new(statuses: Vec<StatusCode>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            statuses,
            last_auth: Mutex::new(None),
            last_body: Mutex::new(None),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record(&self, headers: &HeaderMap, body: serde_json::Value) -> Option<StatusCode> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_auth.lock().unwrap() = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        *self.last_body.lock().unwrap() = Some(body);
        self.statuses.get(n).copied()
    }
}

async fn openai(State(mock): State<Arc<Mock>>, headers: HeaderMap, Json(body): Json<serde_json::Value>) -> Response {
    if let Some(status) = mock.record(&headers, body) {
        return (status, "upstream unhappy").into_response();
    }
    Json(serde_json::json!({
        "object": "list",
        "data": [{ "object": "embedding", "index": 0, "embedding": [0.6, 0.8] }],
        "model": "text-embedding-3-small"
    }))
    .into_response()
}

async fn ollama(State(mock): State<Arc<Mock>>, headers: HeaderMap, Json(body): Json<serde_json::Value>) -> Response {
    if let Some(status) = mock.record(&headers, body) {
        return (status, "model not loaded").into_response();
    }
    Json(serde_json::json!({ "model": "nomic-embed-text", "embeddings": [[1.0, 0.0]] })).into_response()
}

async fn serve(mock: Arc<Mock>) -> String {
    let app = Router::new()
        .route("/v1/embeddings", post(openai))
        .route("/api/embed", post(ollama))
        .with_state(mock);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn embedding_config(provider: &str, url: &str, max_input_chars: usize) -> EmbeddingConfig {
    let content = format!(
        r#"
[source]
url = "sqlite:./unused.sqlite"
query = "SELECT 1"

[embedding]
provider = "{provider}"
model = "text-embedding-3-small"
dims = 2
url = "{url}"
max_attempts = 3
backoff_base_ms = 1
timeout_secs = 5
max_input_chars = {max_input_chars}

[index]
path = "./unused-index.sqlite"
name = "unused"
"#
    );
    parse_config(&content).unwrap().embedding
}

#[tokio::test]
async fn test_openai_retries_after_429() {
    let mock = Mock::new(vec![StatusCode::TOO_MANY_REQUESTS]);
    let url = serve(mock.clone()).await;
    let embedder = OpenAIEmbedder::with_api_key(&embedding_config("openai", &url, 1000), "sk-test").unwrap();

    let vector = embedder.embed("id=1 name=a").await.unwrap();
    assert_eq!(vector, vec![0.6, 0.8]);
    assert_eq!(mock.calls(), 2);
    assert_eq!(mock.last_auth.lock().unwrap().as_deref(), Some("Bearer sk-test"));

    let body = mock.last_body.lock().unwrap().clone().unwrap();
    assert_eq!(body["model"], "text-embedding-3-small");
    assert_eq!(body["input"][0], "id=1 name=a");
}

#[tokio::test]
async fn test_openai_client_error_fails_fast() {
    let mock = Mock::new(vec![StatusCode::BAD_REQUEST]);
    let url = serve(mock.clone()).await;
    let embedder = OpenAIEmbedder::with_api_key(&embedding_config("openai", &url, 1000), "sk-test").unwrap();

    let err = embedder.embed("hello").await.unwrap_err();
    assert!(matches!(err, Error::EmbeddingService { attempts: 1, .. }));
    assert!(err.to_string().contains("400"));
    assert_eq!(mock.calls(), 1);
}

#[tokio::test]
async fn test_openai_server_errors_exhaust_attempts() {
    let mock = Mock::new(vec![StatusCode::INTERNAL_SERVER_ERROR; 10]);
    let url = serve(mock.clone()).await;
    let embedder = OpenAIEmbedder::with_api_key(&embedding_config("openai", &url, 1000), "sk-test").unwrap();

    let err = embedder.embed("hello").await.unwrap_err();
    assert!(matches!(err, Error::EmbeddingService { attempts: 3, .. }));
    assert!(!err.is_recoverable());
    assert_eq!(mock.calls(), 3);
}

#[tokio::test]
async fn test_oversized_input_never_sent() {
    let mock = Mock::new(Vec::new());
    let url = serve(mock.clone()).await;
    let embedder = OpenAIEmbedder::with_api_key(&embedding_config("openai", &url, 4), "sk-test").unwrap();

    let err = embedder.embed("too long").await.unwrap_err();
    assert!(matches!(err, Error::EmbeddingInputTooLarge { len: 8, max: 4 }));
    assert_eq!(mock.calls(), 0);
}

#[tokio::test]
async fn test_ollama_embed() {
    let mock = Mock::new(vec![StatusCode::SERVICE_UNAVAILABLE]);
    let url = serve(mock.clone()).await;
    let embedder = OllamaEmbedder::new(&embedding_config("ollama", &url, 1000)).unwrap();

    assert_eq!(embedder.embed("hello").await.unwrap(), vec![1.0, 0.0]);
    assert_eq!(mock.calls(), 2);
    assert!(mock.last_auth.lock().unwrap().is_none());
}

#[tokio::test]
async fn test_unreachable_service_is_embedding_error() {
    // Bind then drop to get a port nobody listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let embedder = OllamaEmbedder::new(&embedding_config("ollama", &url, 1000)).unwrap();
    let err = embedder.embed("hello").await.unwrap_err();
    assert_eq!(err.kind(), "embedding_service");
}
