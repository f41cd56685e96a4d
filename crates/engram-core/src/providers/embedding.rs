//! Embedding provider clients
//!
//! `Embedder::embed(text)` returns a fixed-dimension float vector. The
//! adapter is CPU/network only - it never touches SQLite.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::config::{ResolvedKind, ResolvedProvider};

/// Per-request timeout for embedding calls
const EMBED_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Embedding call error
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    /// Transport-level failure
    #[error("Embedding request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Non-success HTTP status
    #[error("Embedding provider returned status {status}: {body}")]
    Status { status: u16, body: String },
    /// Reply did not carry a vector
    #[error("Embedding reply malformed: {0}")]
    Malformed(String),
    /// Provider returned a vector of the wrong length
    #[error("Embedding dimension mismatch: got {got}, expected {expected}")]
    Dimension { got: usize, expected: usize },
    /// Bridge worker is gone
    #[error("Embedding bridge unavailable: {0}")]
    Bridge(String),
}

// ============================================================================
// TRAIT
// ============================================================================

/// Opaque embedding provider with a fixed output dimension
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Output vector length; the pool's collection dimension
    fn dimensions(&self) -> usize;

    /// Embed one text
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

fn check_dims(vector: Vec<f32>, expected: usize) -> Result<Vec<f32>, EmbeddingError> {
    if vector.len() != expected {
        return Err(EmbeddingError::Dimension {
            got: vector.len(),
            expected,
        });
    }
    Ok(vector)
}

fn parse_floats(value: &serde_json::Value) -> Option<Vec<f32>> {
    value
        .as_array()
        .map(|a| a.iter().filter_map(|v| v.as_f64()).map(|f| f as f32).collect())
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(EMBED_TIMEOUT)
        .build()
        .unwrap_or_default()
}

// ============================================================================
// OPENAI
// ============================================================================

/// OpenAI `/embeddings` client
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
        base_url: Option<String>,
    ) -> Self {
        Self {
            client: http_client(),
            api_key: api_key.into(),
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model: model.into(),
            dimensions,
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let endpoint = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({"model": self.model, "input": text}))
            .send()
            .await?;

        let status = response.status();
        let body: serde_json::Value = response.json().await?;
        if !status.is_success() {
            return Err(EmbeddingError::Status {
                status: status.as_u16(),
                body: body.to_string(),
            });
        }

        let vector = parse_floats(&body["data"][0]["embedding"])
            .ok_or_else(|| EmbeddingError::Malformed(format!("missing data[0].embedding: {body}")))?;
        check_dims(vector, self.dimensions)
    }
}

// ============================================================================
// GEMINI
// ============================================================================

/// Gemini `embedContent` client
pub struct GeminiEmbedder {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl GeminiEmbedder {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
        base_url: Option<String>,
    ) -> Self {
        Self {
            client: http_client(),
            api_key: api_key.into(),
            base_url: base_url
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string()),
            model: model.into(),
            dimensions,
        }
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let endpoint = format!(
            "{}/models/{}:embedContent?key={}",
            self.base_url.trim_end_matches('/'),
            self.model,
            self.api_key,
        );
        let response = self
            .client
            .post(endpoint)
            .json(&json!({"content": {"parts": [{"text": text}]}}))
            .send()
            .await?;

        let status = response.status();
        let body: serde_json::Value = response.json().await?;
        if !status.is_success() {
            return Err(EmbeddingError::Status {
                status: status.as_u16(),
                body: body.to_string(),
            });
        }

        let vector = parse_floats(&body["embedding"]["values"])
            .ok_or_else(|| EmbeddingError::Malformed(format!("missing embedding.values: {body}")))?;
        check_dims(vector, self.dimensions)
    }
}

// ============================================================================
// OLLAMA
// ============================================================================

/// Ollama `/api/embeddings` client for local models
pub struct OllamaEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl OllamaEmbedder {
    pub fn new(model: impl Into<String>, dimensions: usize, base_url: Option<String>) -> Self {
        Self {
            client: http_client(),
            base_url: base_url.unwrap_or_else(|| "http://localhost:11434".to_string()),
            model: model.into(),
            dimensions,
        }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let endpoint = format!("{}/api/embeddings", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(endpoint)
            .json(&json!({"model": self.model, "prompt": text}))
            .send()
            .await?;

        let status = response.status();
        let body: serde_json::Value = response.json().await?;
        if !status.is_success() {
            return Err(EmbeddingError::Status {
                status: status.as_u16(),
                body: body.to_string(),
            });
        }

        let vector = parse_floats(&body["embedding"])
            .ok_or_else(|| EmbeddingError::Malformed(format!("missing embedding: {body}")))?;
        check_dims(vector, self.dimensions)
    }
}

// ============================================================================
// FACTORY
// ============================================================================

/// Build the embedder for a resolved provider selection.
///
/// Anthropic exposes no embedding API, so it never appears here; config
/// resolution already routed embeddings elsewhere.
pub fn build_embedder(provider: &ResolvedProvider, dimensions: usize) -> std::sync::Arc<dyn Embedder> {
    let api_key = provider.api_key.clone().unwrap_or_default();
    match provider.kind {
        ResolvedKind::Gemini => std::sync::Arc::new(GeminiEmbedder::new(
            api_key,
            provider.model.clone(),
            dimensions,
            provider.base_url.clone(),
        )),
        ResolvedKind::Ollama => std::sync::Arc::new(OllamaEmbedder::new(
            provider.model.clone(),
            dimensions,
            provider.base_url.clone(),
        )),
        // OpenAI, and the default for anything else that slipped through
        _ => std::sync::Arc::new(OpenAiEmbedder::new(
            api_key,
            provider.model.clone(),
            dimensions,
            provider.base_url.clone(),
        )),
    }
}
