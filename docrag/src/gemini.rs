//! Gemini embedding provider and language model over the Generative Language
//! REST API.
//!
//! This module is only available when the `gemini` feature is enabled.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::{EmbeddingProvider, validate_embeddings};
use crate::error::{RagError, Result};
use crate::http::{endpoint, failure_detail, is_retryable_status};
use crate::synthesis::{LanguageModel, Prompt};

/// The default Generative Language API base URL.
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// The default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";

/// The default generation model.
pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";

const PROVIDER: &str = "Gemini";

/// Task type sent with every embedding request. Documents and questions use
/// the same one so that `embed` stays a pure function of its text.
const TASK_TYPE: &str = "RETRIEVAL_DOCUMENT";

fn api_key_from_env() -> Result<String> {
    std::env::var("GEMINI_API_KEY")
        .map_err(|_| RagError::ConfigError("GEMINI_API_KEY environment variable not set".into()))
}

fn check_api_key(api_key: &str) -> Result<()> {
    if api_key.trim().is_empty() {
        return Err(RagError::ConfigError("Gemini API key must not be empty".into()));
    }
    Ok(())
}

/// An [`EmbeddingProvider`] backed by the Gemini embedding API.
///
/// # Configuration
///
/// - `model` – defaults to `text-embedding-004` (768 dimensions).
/// - `output_dimensionality` – optional truncation of the output vector.
/// - `base_url` – defaults to the public Generative Language endpoint.
///
/// # Example
///
/// ```rust,ignore
/// use docrag::gemini::GeminiEmbeddingProvider;
///
/// let provider = GeminiEmbeddingProvider::new("your-api-key")?;
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct GeminiEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    output_dimensionality: Option<usize>,
    dimensions: usize,
}

impl GeminiEmbeddingProvider {
    /// Default embedding dimensions for `text-embedding-004`.
    pub const DEFAULT_DIMENSIONS: usize = 768;

    /// Create a new provider using the given API key and the default
    /// `text-embedding-004` model.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        check_api_key(&api_key)?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: GEMINI_BASE_URL.into(),
            model: DEFAULT_EMBEDDING_MODEL.into(),
            output_dimensionality: None,
            dimensions: Self::DEFAULT_DIMENSIONS,
        })
    }

    /// Create a new provider using the `GEMINI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        Self::new(api_key_from_env()?)
    }

    /// Set the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the output dimensionality (truncates the embedding vector).
    pub fn with_output_dimensionality(mut self, dims: usize) -> Self {
        self.output_dimensionality = Some(dims);
        self.dimensions = dims;
        self
    }

    /// Send requests to a compatible API at `base_url`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn request<'a>(&'a self, model: &'a str, text: &'a str) -> EmbedRequest<'a> {
        EmbedRequest {
            model,
            content: Content { role: None, parts: vec![Part { text }] },
            task_type: TASK_TYPE,
            output_dimensionality: self.output_dimensionality,
        }
    }

    fn unavailable(message: String, retryable: bool) -> RagError {
        RagError::EmbeddingUnavailable { provider: PROVIDER.into(), message, retryable }
    }

    async fn post<B: Serialize + ?Sized>(&self, method: &str, body: &B) -> Result<reqwest::Response> {
        let url = endpoint(&self.base_url, &format!("models/{}:{method}", self.model));
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "embedding request failed");
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
        Ok(response)
    }
}

// ── Gemini API request/response types ──────────────────────────────

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: ContentEmbedding,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

// ── EmbeddingProvider implementation ───────────────────────────────

#[async_trait]
impl EmbeddingProvider for GeminiEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, text_len = text.len(), "embedding single text");

        let model = format!("models/{}", self.model);
        let response = self.post("embedContent", &self.request(&model, text)).await?;
        let parsed: EmbedResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            Self::unavailable(format!("failed to parse response: {e}"), false)
        })?;

        let embeddings = vec![parsed.embedding.values];
        validate_embeddings(PROVIDER, 1, self.dimensions, &embeddings)?;
        Ok(embeddings.into_iter().next().unwrap_or_default())
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(provider = PROVIDER, batch_size = texts.len(), model = %self.model, "embedding batch");

        let model = format!("models/{}", self.model);
        let body = BatchEmbedRequest {
            requests: texts.iter().map(|text| self.request(&model, text)).collect(),
        };
        let response = self.post("batchEmbedContents", &body).await?;
        let parsed: BatchEmbedResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            Self::unavailable(format!("failed to parse response: {e}"), false)
        })?;

        let embeddings: Vec<Vec<f32>> = parsed.embeddings.into_iter().map(|e| e.values).collect();
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

/// A [`LanguageModel`] backed by Gemini `generateContent`.
pub struct GeminiLanguageModel {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
}

impl GeminiLanguageModel {
    /// Create a model with the given API key, using `gemini-2.5-flash` at
    /// temperature 0.2.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        check_api_key(&api_key)?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: GEMINI_BASE_URL.into(),
            model: DEFAULT_CHAT_MODEL.into(),
            temperature: 0.2,
        })
    }

    /// Create a model using the `GEMINI_API_KEY` environment variable.
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

    /// Send requests to a compatible API at `base_url`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn failure(&self, message: String, retryable: bool) -> RagError {
        RagError::Synthesis { synthesizer: self.model.clone(), message, retryable }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

fn message(role: &'static str, text: &str) -> Content<'_> {
    Content { role: Some(role), parts: vec![Part { text }] }
}

#[async_trait]
impl LanguageModel for GeminiLanguageModel {
    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        let mut contents = Vec::with_capacity(prompt.history.len() * 2 + 1);
        for turn in &prompt.history {
            contents.push(message("user", &turn.question));
            contents.push(message("model", &turn.answer));
        }
        contents.push(message("user", &prompt.user));

        debug!(provider = PROVIDER, model = %self.model, contents = contents.len(), "generate content");

        let body = GenerateRequest {
            system_instruction: Content { role: None, parts: vec![Part { text: &prompt.system }] },
            contents,
            generation_config: GenerationConfig { temperature: self.temperature },
        };
        let url = endpoint(&self.base_url, &format!("models/{}:generateContent", self.model));
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "generate request failed");
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

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| self.failure(format!("failed to parse response: {e}"), false))?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(self.failure("model returned no text".into(), false));
        }
        Ok(text)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};

    use super::*;

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{addr}/v1beta")
    }

    #[tokio::test]
    async fn batch_requests_carry_task_type_and_key() {
        let router = Router::new().route(
            "/v1beta/models/{method}",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(headers["x-goog-api-key"], "key");
                let requests = body["requests"].as_array().cloned().unwrap_or_default();
                let embeddings: Vec<Value> = requests
                    .iter()
                    .map(|r| {
                        assert_eq!(r["taskType"], "RETRIEVAL_DOCUMENT");
                        assert_eq!(r["model"], "models/text-embedding-004");
                        json!({ "values": [1.0, 0.0] })
                    })
                    .collect();
                Json(json!({ "embeddings": embeddings }))
            }),
        );
        let provider = GeminiEmbeddingProvider::new("key")
            .unwrap()
            .with_output_dimensionality(2)
            .with_base_url(spawn(router).await);

        let vectors = provider.embed_batch(&["a", "b", "c"]).await.unwrap();
        assert_eq!(vectors.len(), 3);
    }

    #[tokio::test]
    async fn server_errors_are_retryable() {
        let router = Router::new()
            .route("/v1beta/models/{method}", post(|| async { StatusCode::SERVICE_UNAVAILABLE }));
        let provider = GeminiEmbeddingProvider::new("key").unwrap().with_base_url(spawn(router).await);

        let err = provider.embed("x").await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingUnavailable { retryable: true, .. }));
    }

    #[tokio::test]
    async fn generate_content_joins_candidate_parts() {
        let router = Router::new().route(
            "/v1beta/models/{method}",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["generationConfig"]["temperature"], json!(0.2));
                assert_eq!(body["contents"].as_array().unwrap().len(), 1);
                Json(json!({
                    "candidates": [{ "content": { "parts": [{ "text": "Rest " }, { "text": "it." }] } }]
                }))
            }),
        );
        let model = GeminiLanguageModel::new("key").unwrap().with_base_url(spawn(router).await);
        let prompt = Prompt { system: "s".into(), history: Vec::new(), user: "q".into() };

        assert_eq!(model.complete(&prompt).await.unwrap(), "Rest it.");
    }

    #[tokio::test]
    async fn empty_candidates_are_a_synthesis_error() {
        let router = Router::new()
            .route("/v1beta/models/{method}", post(|| async { Json(json!({ "candidates": [] })) }));
        let model = GeminiLanguageModel::new("key").unwrap().with_base_url(spawn(router).await);
        let prompt = Prompt { system: "s".into(), history: Vec::new(), user: "q".into() };

        let err = model.complete(&prompt).await.unwrap_err();
        assert!(matches!(err, RagError::Synthesis { retryable: false, .. }));
    }
}
