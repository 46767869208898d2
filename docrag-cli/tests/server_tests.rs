//! HTTP contract tests for `docrag serve`.

use std::net::SocketAddr;
use std::sync::Arc;

use docrag::{DocumentHandle, HashEmbeddingProvider, InMemoryVectorStore, RagEngine};
use docrag_cli::{AppState, RagResponse, app_router};
use reqwest::StatusCode;
use serde_json::{Value, json};

const STEAK: &str = "Sear the ribeye in a very hot cast iron pan for three minutes per side, \
then let the steak rest for five minutes before slicing.";

fn engine() -> Arc<RagEngine> {
    let engine = RagEngine::builder()
        .embedding_provider(Arc::new(HashEmbeddingProvider::default()))
        .vector_store(Arc::new(InMemoryVectorStore::new()))
        .build()
        .expect("engine");
    Arc::new(engine)
}

async fn spawn(engine: Arc<RagEngine>) -> SocketAddr {
    let app = app_router(AppState { engine });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    addr
}

#[tokio::test]
async fn health_reports_readiness_after_indexing() {
    let engine = engine();
    let addr = spawn(engine.clone()).await;
    let client = reqwest::Client::new();

    let body: Value = client
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["ready"], false);
    assert_eq!(body["records"], 0);

    engine.index(&[DocumentHandle::inline("steak.txt", STEAK)]).await.unwrap();

    let body: Value = client
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["ready"], true);
    assert_eq!(body["records"], 1);
}

#[tokio::test]
async fn blank_or_missing_prompt_is_rejected() {
    let addr = spawn(engine()).await;
    let client = reqwest::Client::new();
    let url = format!("http://{addr}/api/rag");

    for payload in [json!({ "prompt": "   " }), json!({}), json!({ "k": 2 })] {
        let response = client.post(&url).json(&payload).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "payload {payload}");
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "invalid_query");
    }

    let response = client
        .post(&url)
        .header("content-type", "application/json")
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn zero_k_is_an_invalid_query() {
    let engine = engine();
    engine.index(&[DocumentHandle::inline("steak.txt", STEAK)]).await.unwrap();
    let addr = spawn(engine).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/api/rag"))
        .json(&json!({ "prompt": "how long should steak rest?", "k": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn empty_index_is_service_unavailable() {
    let addr = spawn(engine()).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/api/rag"))
        .json(&json!({ "prompt": "how long should steak rest?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "no_context");
}

#[tokio::test]
async fn answers_carry_their_sources() {
    let engine = engine();
    engine.index(&[DocumentHandle::inline("steak.txt", STEAK)]).await.unwrap();
    let addr = spawn(engine).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/api/rag"))
        .json(&json!({
            "prompt": "how long should the steak rest?",
            "k": 1,
            "history": [{ "question": "what pan?", "answer": "cast iron" }],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: RagResponse = response.json().await.unwrap();
    assert!(!body.text.is_empty());
    assert_eq!(body.sources.len(), 1);
    assert_eq!(body.sources[0].source, "steak.txt");
}
