//! Provider adapters
//!
//! The core treats the language model and the embedding model as opaque
//! services behind two traits. HTTP clients for OpenAI, Anthropic, Gemini
//! and Ollama ship here; anything implementing the traits plugs in the same
//! way (tests use scripted fakes).

mod bridge;
mod embedding;
mod llm;

pub use bridge::EmbeddingBridge;
pub use embedding::{
    build_embedder, Embedder, EmbeddingError, GeminiEmbedder, OllamaEmbedder, OpenAiEmbedder,
};
pub use llm::{
    build_language_model, AnthropicChat, ChatMessage, ChatRequest, ChatResponse, ChatRole,
    GeminiChat, LanguageModel, LlmError, OllamaChat, OpenAiChat,
};
