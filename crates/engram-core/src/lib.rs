//! # Engram Core
//!
//! Personal-memory engine for conversational assistants. Ingests user
//! utterances, distils durable facts from noise, stores them in a hybrid
//! (vector + keyword) local SQLite index, and re-injects the most relevant
//! facts into subsequent prompts so the assistant remembers the user across
//! sessions.
//!
//! The engine is the memory substrate:
//!
//! - **Hybrid Vector Store**: one SQLite file per instance, embedding table
//!   + payload table per collection, global FTS5 index, weighted
//!   vector/BM25 merge
//! - **Write-time quality control**: every new fact is ruled
//!   ADD/UPDATE/DELETE/NONE by a language model against its nearest
//!   existing memories; failures fall back to ADD, data is never lost
//! - **Three-scope lifecycle**: session working memory, per-user persisted
//!   JSON stores (episodic / preference / plan), process-wide system memory
//!   (skills, TTL+LRU cache)
//! - **TTL / visibility discipline**: expiring memories are swept, private
//!   memories never reach prompt injection
//! - **Persona projection**: behaviour + emotion + plans + explicit cards
//!   aggregated into one token-bounded prompt block
//!
//! The language model and the embedding model are opaque providers behind
//! the [`providers::LanguageModel`] and [`providers::Embedder`] traits;
//! HTTP clients for OpenAI, Anthropic, Gemini and Ollama ship in
//! [`providers`], selected by environment auto-detection in [`config`].
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use engram_core::prelude::*;
//!
//! let pool = registry().pool()?;
//! let quality = registry().quality_controller()?;
//! let mut manager = MemoryManager::new(pool, quality, Some("user_1"), None);
//!
//! let card = manager
//!     .create_memory_card(CardDraft::new("称呼: 良哥", MemoryCardCategory::Other))
//!     .await?;
//!
//! let cards = manager.search_memory_cards("称呼", None, 5).await;
//! ```

#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod config;
pub mod extraction;
pub mod manager;
pub mod memory;
pub mod persona;
pub mod pool;
pub mod providers;
pub mod registry;
pub mod retrieval;
pub mod scoped;
pub mod session;
pub mod store;
pub mod system;
pub mod update;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Data model
pub use memory::{
    CardDraft, ConstraintHint, DayOfWeek, EmotionHint, Fragment, GoalHint, IdentityHint,
    LongTermCategory, LongTermMemory, MemoryCard, MemoryCardCategory, MemoryMetadata,
    MemoryPayload, MemorySource, MemoryType, MemoryVisibility, PreferenceHint, RelationHint,
    RetrievedMemory, TaskHint, TimeHint, TimeSlot, TodoHint, ToolHint, TopicHint,
};

// Storage layer
pub use store::{
    sanitize_fts5_query, CollectionInfo, HistoryEntry, HistoryStore, ScoredPoint, StoreError,
    UpsertRecord, VectorStore,
};

// Pool
pub use pool::{AddOptions, AddResult, AppliedEvent, HealthStatus, MemoryPool, PREFETCH_FACTOR};

// Configuration
pub use config::{
    detect_providers, ConfigError, EnvSnapshot, MemoryConfig, ProviderKind, ProviderSelection,
    ResolvedKind, ResolvedProvider,
};

// Providers
pub use providers::{
    build_embedder, build_language_model, ChatMessage, ChatRequest, ChatResponse, ChatRole,
    Embedder, EmbeddingBridge, EmbeddingError, LanguageModel, LlmError,
};

// Extraction
pub use extraction::{resolve_deadline, FactExtractor, FragmentExtractor};

// Update pipeline
pub use update::{
    ConflictKind, ConflictPolicy, ConflictResolution, DecisionEntry, ExistingMemory, MemoryConflict,
    MemoryEvent, QualityController, TtlStatus, UpdateDecider, UpdateDecision,
};

// Tiers
pub use manager::{LlmContext, ManagerError, MemoryManager};
pub use scoped::{
    Episode, EpisodicMemory, PlanDocument, PlanMemory, PlanStep, PreferenceMemory, SessionSummary,
    StepDraft,
};
pub use session::WorkingMemory;
pub use system::{CacheMemory, SkillMemory};

// Retrieval post-processing
pub use retrieval::{format_memories_for_prompt, FormatOptions, Language, RerankService};

// Persona
pub use persona::{
    BehaviorSummary, EmotionSnapshot, HeuristicTokenOracle, PersonaBuilder, PlanSummary,
    ReminderSummary, TokenOracle, UserPersona,
};

// Process registry
pub use registry::{registry, ProcessRegistry};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        registry, AddOptions, CardDraft, ChatMessage, ConflictPolicy, EnvSnapshot, MemoryCard,
        MemoryCardCategory, MemoryConfig, MemoryEvent, MemoryManager, MemoryPool, MemoryType,
        MemoryVisibility, QualityController, RetrievedMemory, StepDraft, UpdateDecider,
        WorkingMemory,
    };
}
