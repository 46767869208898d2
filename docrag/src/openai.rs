//! OpenAI embedding provider and chat model.
//!
//! This module is only available when the `openai` feature is enabled. Both
//! types talk to any OpenAI-compatible API; point them elsewhere with
//! `with_base_url`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::{EmbeddingProvider, validate_embeddings};
use crate::error::{RagError, Result};
use crate::http::{endpoint, failure_detail, is_retryable_status};
use crate::synthesis::{LanguageModel, Prompt};

/// The default OpenAI API base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// The default model for OpenAI embeddings.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// The default chat model.
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

const PROVIDER: &str = "OpenAI";

/// Output size of the known OpenAI embedding models.
fn model_dimensions(model: &str) -> usize {
    match model {
        "text-embedding-3-large" => 3072,
        _ => 1536,
    }
}

fn api_key_from_env() -> Result<String> {
    std::env::var("OPENAI_API_KEY")
        .map_err(|_| RagError::ConfigError("OPENAI_API_KEY environment variable not set".into()))
}

fn check_api_key(api_key: &str) -> Result<()> {
    if api_key.trim().is_empty() {
        return Err(RagError::ConfigError("OpenAI API key must not be empty".into()));
    }
    Ok(())
}

/// An [`EmbeddingProvider`] backed by the OpenAI embeddings API.
///
/// Uses `reqwest` to call the `/embeddings` endpoint directly.
///
/// # Configuration
///
/// - `model` – defaults to `text-embedding-3-small`.
/// - `dimensions` – optional Matryoshka dimension override.
/// - `api_key` – from the constructor or the `OPENAI_API_KEY` environment variable.
/// - `base_url` – defaults to `https://api.openai.com/v1`.
///
/// # Example
///
/// ```rust,ignore
/// use docrag::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::new("sk-...")?;
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
    /// If set, passed to the API for Matryoshka dimension truncation.
    request_dimensions: Option<usize>,
}

impl OpenAIEmbeddingProvider {
    /// Create a new provider with the given API key.
    ///
    /// Uses the default model (`text-embedding-3-small`) and dimensions (1536).
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        check_api_key(&api_key)?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: OPENAI_BASE_URL.into(),
            model: DEFAULT_EMBEDDING_MODEL.into(),
            dimensions: model_dimensions(DEFAULT_EMBEDDING_MODEL),
            request_dimensions: None,
        })
    }

    /// Create a new provider using the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        Self::new(api_key_from_env()?)
    }

    /// Set the model name (e.g. `text-embedding-3-large`).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        if self.request_dimensions.is_none() {
            self.dimensions = model_dimensions(&self.model);
        }
        self
    }

    /// Set the output dimensions (Matryoshka support).
    ///
    /// When set, the API returns embeddings truncated to this size.
    /// This also updates the value returned by [`dimensions()`](EmbeddingProvider::dimensions).
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = Some(dims);
        self
    }

    /// Send requests to an OpenAI-compatible API at `base_url`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn unavailable(message: String, retryable: bool) -> RagError {
        RagError::EmbeddingUnavailable { provider: PROVIDER.into(), message, retryable }
    }
}

// ── OpenAI API request/response types ──────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

// ── EmbeddingProvider implementation ───────────────────────────────

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, text_len = text.len(), "embedding single text");

        let results = self.embed_batch(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| Self::unavailable("API returned empty response".into(), false))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            provider = PROVIDER,
            batch_size = texts.len(),
            model = %self.model,
            "embedding batch"
        );

        let request_body = EmbeddingRequest {
            model: &self.model,
            input: texts.to_vec(),
            dimensions: self.request_dimensions,
        };

        let response = self
            .client
            .post(endpoint(&self.base_url, "embeddings"))
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "request failed");
                Self::unavailable(format!("request failed: {e}"), true)
            })?;

        if !response.status().is_success() {
            let (status, detail) = failure_detail(response).await;
            error!(provider = PROVIDER, %status, "API error");
            return Err(Self::unavailable(
                format!("API returned {status}: {detail}"),
                is_retryable_status(status),
            ));
        }

        let embedding_response: EmbeddingResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            Self::unavailable(format!("failed to parse response: {e}"), false)
        })?;

        let embeddings: Vec<Vec<f32>> =
            embedding_response.data.into_iter().map(|d| d.embedding).collect();
        validate_embeddings(PROVIDER, texts.len(), self.dimensions, &embeddings)?;
        Ok(embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// A [`LanguageModel`] backed by the OpenAI chat completions API.
pub struct OpenAIChatModel {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OpenAIChatModel {
    /// Create a chat model with the given API key, using `gpt-4o-mini` at
    /// temperature 0.2.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        check_api_key(&api_key)?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: OPENAI_BASE_URL.into(),
            model: DEFAULT_CHAT_MODEL.into(),
            temperature: 0.2,
        })
    }

    /// Create a chat model using the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        Self::new(api_key_from_env()?)
    }

    /// Set the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Send requests to an OpenAI-compatible API at `base_url`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn failure(&self, message: String, retryable: bool) -> RagError {
        RagError::Synthesis { synthesizer: self.model.clone(), message, retryable }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[async_trait]
impl LanguageModel for OpenAIChatModel {
    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        let mut messages = vec![ChatMessage { role: "system", content: &prompt.system }];
        for turn in &prompt.history {
            messages.push(ChatMessage { role: "user", content: &turn.question });
            messages.push(ChatMessage { role: "assistant", content: &turn.answer });
        }
        messages.push(ChatMessage { role: "user", content: &prompt.user });

        debug!(provider = PROVIDER, model = %self.model, messages = messages.len(), "chat completion");

        let body = ChatRequest { model: &self.model, messages, temperature: self.temperature };
        let response = self
            .client
            .post(endpoint(&self.base_url, "chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "request failed");
                self.failure(format!("request failed: {e}"), true)
            })?;

        if !response.status().is_success() {
            let (status, detail) = failure_detail(response).await;
            error!(provider = PROVIDER, %status, "API error");
            return Err(self.failure(
                format!("API returned {status}: {detail}"),
                is_retryable_status(status),
            ));
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| self.failure(format!("failed to parse response: {e}"), false))?;

        reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| self.failure("model returned no text".into(), false))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};

    use super::*;

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{addr}/v1")
    }

    #[test]
    fn empty_api_key_is_rejected() {
        assert!(matches!(OpenAIEmbeddingProvider::new(" "), Err(RagError::ConfigError(_))));
    }

    #[tokio::test]
    async fn embeds_batches_in_order() {
        let router = Router::new().route(
            "/v1/embeddings",
            post(|Json(body): Json<Value>| async move {
                let inputs = body["input"].as_array().cloned().unwrap_or_default();
                let data: Vec<Value> = inputs
                    .iter()
                    .enumerate()
                    .map(|(i, _)| json!({ "embedding": [i as f32, 1.0, 0.0] }))
                    .collect();
                Json(json!({ "data": data }))
            }),
        );
        let provider = OpenAIEmbeddingProvider::new("sk-test")
            .unwrap()
            .with_dimensions(3)
            .with_base_url(spawn(router).await);

        let vectors = provider.embed_batch(&["a", "b"]).await.unwrap();
        assert_eq!(vectors, vec![vec![0.0, 1.0, 0.0], vec![1.0, 1.0, 0.0]]);
    }

    #[tokio::test]
    async fn wrong_dimensions_are_malformed_output() {
        let router = Router::new().route(
            "/v1/embeddings",
            post(|| async { Json(json!({ "data": [{ "embedding": [1.0, 2.0] }] })) }),
        );
        let provider =
            OpenAIEmbeddingProvider::new("sk-test").unwrap().with_base_url(spawn(router).await);

        let err = provider.embed("text").await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingUnavailable { retryable: false, .. }));
    }

    #[tokio::test]
    async fn rate_limits_are_retryable_and_auth_failures_are_not() {
        let router = Router::new()
            .route(
                "/busy/embeddings",
                post(|| async {
                    (
                        StatusCode::TOO_MANY_REQUESTS,
                        Json(json!({ "error": { "message": "slow down" } })),
                    )
                }),
            )
            .route("/denied/embeddings", post(|| async { StatusCode::UNAUTHORIZED }));
        let base = spawn(router).await.trim_end_matches("/v1").to_string();

        let busy = OpenAIEmbeddingProvider::new("sk").unwrap().with_base_url(format!("{base}/busy"));
        match busy.embed("x").await.unwrap_err() {
            RagError::EmbeddingUnavailable { retryable, message, .. } => {
                assert!(retryable);
                assert!(message.contains("slow down"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let denied =
            OpenAIEmbeddingProvider::new("sk").unwrap().with_base_url(format!("{base}/denied"));
        assert!(!denied.embed("x").await.unwrap_err().is_retryable());
    }

    #[tokio::test]
    async fn chat_model_sends_history_and_returns_content() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|Json(body): Json<Value>| async move {
                let roles: Vec<String> = body["messages"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|m| m["role"].as_str().unwrap().to_string())
                    .collect();
                Json(json!({ "choices": [{ "message": { "content": roles.join(",") } }] }))
            }),
        );
        let model = OpenAIChatModel::new("sk").unwrap().with_base_url(spawn(router).await);
        let prompt = Prompt {
            system: "be brief".into(),
            history: vec![crate::document::Turn { question: "q".into(), answer: "a".into() }],
            user: "now?".into(),
        };

        assert_eq!(model.complete(&prompt).await.unwrap(), "system,user,assistant,user");
    }
}
