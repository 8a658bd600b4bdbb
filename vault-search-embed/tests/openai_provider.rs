//! OpenAI provider against a local fake of the `/embeddings` endpoint.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use vault_search_embed::{
    EmbedConfig, EmbedError, EmbeddingAdapter, EmbeddingProvider, OpenAiEmbedder, OpenAiProvider,
};

#[derive(Default)]
struct FakeOpenAi {
    requests: Mutex<Vec<(Option<String>, Value)>>,
    reject: bool,
    short_by_one: bool,
}

async fn embeddings(
    State(state): State<Arc<FakeOpenAi>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let auth = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    state.requests.lock().unwrap().push((auth, body.clone()));

    if state.reject {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": {"message": "Incorrect API key provided: sk-fake-key"}})),
        );
    }

    let inputs = body["input"].as_array().cloned().unwrap_or_default();
    let mut count = inputs.len();
    if state.short_by_one {
        count -= 1;
    }

    // Reverse order so the client has to sort by index
    let data: Vec<Value> = inputs
        .iter()
        .take(count)
        .enumerate()
        .rev()
        .map(|(index, input)| {
            let length = input.as_str().map(str::len).unwrap_or(0) as f32;
            json!({"object": "embedding", "index": index, "embedding": [length, index as f32]})
        })
        .collect();

    (
        StatusCode::OK,
        Json(json!({"object": "list", "data": data, "model": body["model"]})),
    )
}

async fn spawn_fake(state: Arc<FakeOpenAi>) -> String {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init()
        .ok(); // Ignore if already initialized

    let router = Router::new()
        .route("/v1/embeddings", post(embeddings))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}/v1")
}

fn config(base_url: &str) -> EmbedConfig {
    EmbedConfig::openai("sk-fake-key").with_base_url(base_url)
}

#[tokio::test]
async fn test_embeddings_returned_in_input_order() {
    let state = Arc::new(FakeOpenAi::default());
    let base_url = spawn_fake(state.clone()).await;
    let provider = OpenAiProvider::new(&config(&base_url)).unwrap();

    let texts = vec!["a".to_string(), "bbb".to_string(), "cc".to_string()];
    let vectors = provider.embed_texts(&texts).await.unwrap();

    assert_eq!(vectors, vec![vec![1.0, 0.0], vec![3.0, 1.0], vec![2.0, 2.0]]);

    let requests = state.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let (auth, body) = &requests[0];
    assert_eq!(auth.as_deref(), Some("Bearer sk-fake-key"));
    assert_eq!(body["model"], "text-embedding-3-small");
    assert_eq!(body["input"].as_array().unwrap().len(), 3);
    assert!(body.get("dimensions").is_none());
}

#[tokio::test]
async fn test_provider_error_does_not_expose_key() {
    let state = Arc::new(FakeOpenAi {
        reject: true,
        ..Default::default()
    });
    let base_url = spawn_fake(state).await;
    let provider = OpenAiProvider::new(&config(&base_url)).unwrap();

    let error = provider
        .embed_texts(&["hello".to_string()])
        .await
        .unwrap_err();

    assert!(matches!(error, EmbedError::EmbeddingGeneration { .. }));
    let message = error.to_string();
    assert!(message.contains("401"));
    assert!(!message.contains("sk-fake-key"));
}

#[tokio::test]
async fn test_short_response_is_an_error() {
    let state = Arc::new(FakeOpenAi {
        short_by_one: true,
        ..Default::default()
    });
    let base_url = spawn_fake(state).await;
    let provider = OpenAiProvider::new(&config(&base_url)).unwrap();

    let result = provider
        .embed_texts(&["one".to_string(), "two".to_string()])
        .await;
    assert!(matches!(result, Err(EmbedError::EmbeddingGeneration { .. })));
}

#[tokio::test]
async fn test_unreachable_provider_is_generation_error() {
    let provider = OpenAiProvider::new(&config("http://127.0.0.1:1/v1")).unwrap();
    let result = provider.embed_texts(&["hello".to_string()]).await;
    assert!(matches!(result, Err(EmbedError::EmbeddingGeneration { .. })));
}

#[tokio::test]
async fn test_openai_embedder_chunks_and_embeds_document() {
    let state = Arc::new(FakeOpenAi::default());
    let base_url = spawn_fake(state.clone()).await;
    let embedder =
        OpenAiEmbedder::from_config(&config(&base_url).with_chunking(20, 5)).unwrap();

    let paragraph = "Vault search keeps an index of every note so that related ideas can be found by meaning rather than by exact words.";
    let document = format!("{paragraph}\n\n{paragraph}\n\n{paragraph}");

    let result = embedder
        .generate_chunks_and_embeddings(&document)
        .await
        .unwrap();

    assert!(result.chunks.len() >= 3);
    assert_eq!(result.chunks.len(), result.vectors.len());
    assert_eq!(state.requests.lock().unwrap().len(), 1);
    assert_eq!(embedder.adapter_name(), "openai");
}
