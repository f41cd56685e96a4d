//! Language-model provider clients
//!
//! `LanguageModel::create_message` is the only contract the core consumes:
//! messages in, one text completion out. The HTTP clients below speak the
//! native chat APIs of OpenAI, Anthropic, Gemini and Ollama.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::{ResolvedKind, ResolvedProvider};

/// Per-request timeout for chat calls
const CHAT_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Language-model call error
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Transport-level failure (connect, timeout)
    #[error("LM request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Non-success HTTP status
    #[error("LM returned status {status}: {body}")]
    Status { status: u16, body: String },
    /// Reply did not carry the expected fields
    #[error("LM reply malformed: {0}")]
    Malformed(String),
}

impl LlmError {
    /// Timeouts and 5xx are transient; callers fall back to the safe default
    /// for their call site either way, this only affects log level.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Request(e) => e.is_timeout() || e.is_connect(),
            LlmError::Status { status, .. } => *status >= 500,
            LlmError::Malformed(_) => false,
        }
    }
}

// ============================================================================
// MESSAGE TYPES
// ============================================================================

/// Role in a chat conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::Tool => "tool",
        }
    }
}

/// A single message in a chat conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Request handed to `create_message`
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    /// Single-user-message request, the common shape for pipeline prompts
    pub fn prompt(content: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::user(content)],
            ..Default::default()
        }
    }
}

/// Completion returned by a provider
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
}

// ============================================================================
// TRAIT
// ============================================================================

/// Opaque language-model provider
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn create_message(&self, request: ChatRequest) -> Result<ChatResponse, LlmError>;
}

// ============================================================================
// OPENAI
// ============================================================================

/// OpenAI `/chat/completions` client (also serves OpenAI-compatible hosts)
pub struct OpenAiChat {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiChat {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            client: http_client(),
            api_key: api_key.into(),
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model: model.into(),
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAiChat {
    async fn create_message(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let mut messages: Vec<serde_json::Value> = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({"role": "system", "content": system}));
        }
        for m in &request.messages {
            messages.push(json!({"role": m.role.as_str(), "content": m.content}));
        }

        let mut payload = json!({"model": self.model, "messages": messages});
        if let Some(t) = request.temperature {
            payload["temperature"] = json!(t);
        }
        if let Some(m) = request.max_tokens {
            payload["max_tokens"] = json!(m);
        }

        let endpoint = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body: serde_json::Value = response.json().await?;
        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: body.to_string(),
            });
        }

        body["choices"][0]["message"]["content"]
            .as_str()
            .map(|content| ChatResponse {
                content: content.to_string(),
            })
            .ok_or_else(|| LlmError::Malformed(format!("missing choices[0].message.content: {body}")))
    }
}

// ============================================================================
// ANTHROPIC
// ============================================================================

/// Anthropic `/v1/messages` client
pub struct AnthropicChat {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl AnthropicChat {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            client: http_client(),
            api_key: api_key.into(),
            base_url: base_url.unwrap_or_else(|| "https://api.anthropic.com".to_string()),
            model: model.into(),
        }
    }
}

#[async_trait]
impl LanguageModel for AnthropicChat {
    async fn create_message(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
            .collect();

        let mut payload = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": request.max_tokens.unwrap_or(2048),
        });
        if let Some(system) = &request.system {
            payload["system"] = json!(system);
        }
        if let Some(t) = request.temperature {
            payload["temperature"] = json!(t);
        }

        let endpoint = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body: serde_json::Value = response.json().await?;
        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: body.to_string(),
            });
        }

        body["content"][0]["text"]
            .as_str()
            .map(|content| ChatResponse {
                content: content.to_string(),
            })
            .ok_or_else(|| LlmError::Malformed(format!("missing content[0].text: {body}")))
    }
}

// ============================================================================
// GEMINI
// ============================================================================

/// Gemini `generateContent` client
pub struct GeminiChat {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiChat {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            client: http_client(),
            api_key: api_key.into(),
            base_url: base_url
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string()),
            model: model.into(),
        }
    }
}

#[async_trait]
impl LanguageModel for GeminiChat {
    async fn create_message(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let contents: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    ChatRole::Assistant => "model",
                    _ => "user",
                };
                json!({"role": role, "parts": [{"text": m.content}]})
            })
            .collect();

        let mut payload = json!({"contents": contents});
        if let Some(system) = &request.system {
            payload["systemInstruction"] = json!({"parts": [{"text": system}]});
        }
        if let Some(t) = request.temperature {
            payload["generationConfig"] = json!({"temperature": t});
        }

        let endpoint = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url.trim_end_matches('/'),
            self.model,
            self.api_key,
        );
        let response = self.client.post(endpoint).json(&payload).send().await?;

        let status = response.status();
        let body: serde_json::Value = response.json().await?;
        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: body.to_string(),
            });
        }

        body["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(|content| ChatResponse {
                content: content.to_string(),
            })
            .ok_or_else(|| LlmError::Malformed(format!("missing candidates[0] text: {body}")))
    }
}

// ============================================================================
// OLLAMA
// ============================================================================

/// Ollama `/api/chat` client for local models
pub struct OllamaChat {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaChat {
    pub fn new(model: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            client: http_client(),
            base_url: base_url.unwrap_or_else(|| "http://localhost:11434".to_string()),
            model: model.into(),
        }
    }
}

#[async_trait]
impl LanguageModel for OllamaChat {
    async fn create_message(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let mut messages: Vec<serde_json::Value> = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({"role": "system", "content": system}));
        }
        for m in &request.messages {
            messages.push(json!({"role": m.role.as_str(), "content": m.content}));
        }

        let payload = json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
        });

        let endpoint = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let response = self.client.post(endpoint).json(&payload).send().await?;

        let status = response.status();
        let body: serde_json::Value = response.json().await?;
        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: body.to_string(),
            });
        }

        body["message"]["content"]
            .as_str()
            .map(|content| ChatResponse {
                content: content.to_string(),
            })
            .ok_or_else(|| LlmError::Malformed(format!("missing message.content: {body}")))
    }
}

// ============================================================================
// FACTORY
// ============================================================================

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(CHAT_TIMEOUT)
        .build()
        .unwrap_or_default()
}

/// Build the chat client for a resolved provider selection
pub fn build_language_model(provider: &ResolvedProvider) -> std::sync::Arc<dyn LanguageModel> {
    let api_key = provider.api_key.clone().unwrap_or_default();
    match provider.kind {
        ResolvedKind::OpenAi => std::sync::Arc::new(OpenAiChat::new(
            api_key,
            provider.model.clone(),
            provider.base_url.clone(),
        )),
        ResolvedKind::Anthropic => std::sync::Arc::new(AnthropicChat::new(
            api_key,
            provider.model.clone(),
            provider.base_url.clone(),
        )),
        ResolvedKind::Gemini => std::sync::Arc::new(GeminiChat::new(
            api_key,
            provider.model.clone(),
            provider.base_url.clone(),
        )),
        ResolvedKind::Ollama => std::sync::Arc::new(OllamaChat::new(
            provider.model.clone(),
            provider.base_url.clone(),
        )),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_prompt_shape() {
        let request = ChatRequest::prompt("extract facts");
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, ChatRole::User);
        assert!(request.system.is_none());
    }

    #[test]
    fn test_transient_classification() {
        let err = LlmError::Status {
            status: 503,
            body: "overloaded".into(),
        };
        assert!(err.is_transient());

        let err = LlmError::Status {
            status: 401,
            body: "bad key".into(),
        };
        assert!(!err.is_transient());

        assert!(!LlmError::Malformed("not json".into()).is_transient());
    }
}
