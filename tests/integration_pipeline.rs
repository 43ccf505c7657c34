#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end ingest and retrieval tests against a mocked embedding server
// Run with: cargo test --test integration_pipeline

use portfolio_qa::config::Config;
use portfolio_qa::embeddings::EmbeddingClient;
use portfolio_qa::index::EmbeddingIndex;
use portfolio_qa::prompt;
use portfolio_qa::retriever::Retriever;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const TEST_DIMENSION: usize = 8;

/// Deterministic stand-in for a sentence-embedding model: each keyword
/// claims one axis, so texts about the same topic land near each other.
fn vector_for(text: &str) -> Vec<f32> {
    let lowered = text.to_lowercase();
    let mut vector = vec![0.0f32; TEST_DIMENSION];
    if lowered.contains("python") {
        vector[0] = 1.0;
    }
    if lowered.contains("hiking") {
        vector[1] = 1.0;
    }
    if lowered.contains("rust") {
        vector[2] = 1.0;
    }
    if vector.iter().all(|v| *v == 0.0) {
        vector[TEST_DIMENSION - 1] = 1.0;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    for v in &mut vector {
        *v /= norm;
    }
    vector
}

/// Answers both request shapes of the embedding endpoint: batch
/// (`input` array) and single (`prompt` string).
struct EmbedResponder;

impl Respond for EmbedResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let Ok(body) = serde_json::from_slice::<serde_json::Value>(&request.body) else {
            return ResponseTemplate::new(400);
        };

        if let Some(inputs) = body.get("input").and_then(|v| v.as_array()) {
            let embeddings: Vec<Vec<f32>> = inputs
                .iter()
                .map(|v| vector_for(v.as_str().unwrap_or_default()))
                .collect();
            return ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "embeddings": embeddings }));
        }

        if let Some(prompt) = body.get("prompt").and_then(|v| v.as_str()) {
            return ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "embedding": vector_for(prompt) }));
        }

        ResponseTemplate::new(400)
    }
}

/// Fails batch requests so ingestion has to fall back to one request
/// per document.
struct BatchFailingResponder;

impl Respond for BatchFailingResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let Ok(body) = serde_json::from_slice::<serde_json::Value>(&request.body) else {
            return ResponseTemplate::new(400);
        };

        if body.get("input").is_some() {
            return ResponseTemplate::new(500);
        }

        if let Some(prompt) = body.get("prompt").and_then(|v| v.as_str()) {
            return ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "embedding": vector_for(prompt) }));
        }

        ResponseTemplate::new(400)
    }
}

async fn start_embedding_server(responder: impl Respond + 'static) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(responder)
        .mount(&server)
        .await;
    server
}

fn test_config(base_dir: &Path, server: &MockServer) -> Config {
    let mut config = Config {
        base_dir: base_dir.to_path_buf(),
        data_dir: base_dir.join("data"),
        ..Config::default()
    };
    config.embedding.host = server.address().ip().to_string();
    config.embedding.port = server.address().port();
    config.embedding.dimension = TEST_DIMENSION as u32;
    config
}

fn write_portfolio(data_dir: &Path) {
    fs::create_dir_all(data_dir).expect("should create data dir");
    fs::write(
        data_dir.join("profile.json"),
        r#"{"name":"Sarah","skills":["Python","SQL"]}"#,
    )
    .expect("should write profile");
    fs::write(
        data_dir.join("hobbies.md"),
        "Sarah enjoys hiking and photography on weekends.",
    )
    .expect("should write hobbies");
}

#[tokio::test(flavor = "multi_thread")]
async fn ingest_populates_index_from_data_folder() {
    let server = start_embedding_server(EmbedResponder).await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = test_config(temp_dir.path(), &server);
    write_portfolio(&config.data_dir);

    let embedder = EmbeddingClient::new(&config.embedding).expect("should create embedder");
    let index = EmbeddingIndex::new(&config)
        .await
        .expect("should create index");

    let ingested = index
        .ensure_populated(&config.data_dir, &embedder)
        .await
        .expect("ingest should succeed");
    assert_eq!(ingested, 2);
    assert_eq!(index.count().await.expect("should count"), 2);

    // A populated index is left untouched on the next startup
    let ingested = index
        .ensure_populated(&config.data_dir, &embedder)
        .await
        .expect("ensure should succeed");
    assert_eq!(ingested, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn retrieval_feeds_document_text_into_the_prompt() {
    let server = start_embedding_server(EmbedResponder).await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = test_config(temp_dir.path(), &server);
    write_portfolio(&config.data_dir);

    let embedder = EmbeddingClient::new(&config.embedding).expect("should create embedder");
    let index = EmbeddingIndex::new(&config)
        .await
        .expect("should create index");
    index
        .ensure_populated(&config.data_dir, &embedder)
        .await
        .expect("ingest should succeed");

    let retriever = Retriever::new(Arc::new(index), Arc::new(embedder));
    let question = "What Python experience does she have?";
    let snippets = retriever.search(question, 1).await;

    assert_eq!(snippets.len(), 1);
    assert!(
        snippets[0].text.contains("Python"),
        "top snippet should be the skills document, got: {}",
        snippets[0].text
    );

    let texts: Vec<String> = snippets.into_iter().map(|s| s.text).collect();
    let composed = prompt::compose(question, &texts);
    assert!(composed.contains("CONTEXT:"));
    assert!(composed.contains("Python"));
    assert!(composed.contains(question));
}

#[tokio::test(flavor = "multi_thread")]
async fn reload_reflects_data_folder_changes() {
    let server = start_embedding_server(EmbedResponder).await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = test_config(temp_dir.path(), &server);
    write_portfolio(&config.data_dir);

    let embedder = EmbeddingClient::new(&config.embedding).expect("should create embedder");
    let index = EmbeddingIndex::new(&config)
        .await
        .expect("should create index");
    index
        .ensure_populated(&config.data_dir, &embedder)
        .await
        .expect("ingest should succeed");

    fs::write(
        config.data_dir.join("projects.md"),
        "Sarah is rewriting her data pipeline in Rust.",
    )
    .expect("should write projects");

    // Without a reload the new file is invisible
    let ingested = index
        .ensure_populated(&config.data_dir, &embedder)
        .await
        .expect("ensure should succeed");
    assert_eq!(ingested, 2);

    let reloaded = index
        .reload(&config.data_dir, &embedder)
        .await
        .expect("reload should succeed");
    assert_eq!(reloaded, 3);

    let retriever = Retriever::new(Arc::new(index), Arc::new(embedder));
    let snippets = retriever.search("Does she know Rust?", 1).await;
    assert_eq!(snippets.len(), 1);
    assert!(snippets[0].text.contains("Rust"));
}

#[tokio::test(flavor = "multi_thread")]
async fn batch_failure_falls_back_to_single_requests() {
    let server = start_embedding_server(BatchFailingResponder).await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = test_config(temp_dir.path(), &server);
    write_portfolio(&config.data_dir);

    let embedder = EmbeddingClient::new(&config.embedding)
        .expect("should create embedder")
        .with_retry_attempts(1);
    let index = EmbeddingIndex::new(&config)
        .await
        .expect("should create index");

    let ingested = index
        .ensure_populated(&config.data_dir, &embedder)
        .await
        .expect("ingest should survive batch failure");
    assert_eq!(ingested, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_data_folder_yields_empty_index() {
    let server = start_embedding_server(EmbedResponder).await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = test_config(temp_dir.path(), &server);
    fs::create_dir_all(&config.data_dir).expect("should create data dir");

    let embedder = EmbeddingClient::new(&config.embedding).expect("should create embedder");
    let index = EmbeddingIndex::new(&config)
        .await
        .expect("should create index");

    let ingested = index
        .ensure_populated(&config.data_dir, &embedder)
        .await
        .expect("ingest should succeed");
    assert_eq!(ingested, 0);
    assert_eq!(index.count().await.expect("should count"), 0);
}
