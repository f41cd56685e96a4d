//! Memory Manager
//!
//! Per-user façade over the three memory tiers: one working memory for the
//! session, lazily constructed per-user persistent stores, and the shared
//! pool for long-term vector memory. The explicit memory-card API routes
//! every write through the quality controller so the decider rules on
//! ADD/UPDATE/DELETE/NONE before anything lands in the store.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::memory::{CardDraft, MemoryCard, MemoryCardCategory, MemoryType};
use crate::persona::{HeuristicTokenOracle, PersonaBuilder, TokenOracle};
use crate::pool::MemoryPool;
use crate::scoped::{Episode, EpisodicMemory, PlanMemory, PreferenceMemory};
use crate::session::WorkingMemory;
use crate::system::{CacheMemory, SkillMemory};
use crate::update::{MemoryEvent, QualityController, UpdateDecision};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Manager error
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    /// An operation that needs a bound user was called without one
    #[error("user_id is required for this operation")]
    MissingUser,
    /// The content failed the format pre-filter
    #[error("content rejected: {0}")]
    Rejected(&'static str),
}

// ============================================================================
// CONTEXT ASSEMBLY
// ============================================================================

/// Context bundle handed to the prompt assembler
#[derive(Debug, Clone, Default)]
pub struct LlmContext {
    pub messages: Vec<Value>,
    pub tool_history: Vec<Value>,
    pub metadata: Map<String, Value>,
    pub similar_episodes: Option<Vec<Value>>,
    pub user_persona: Option<String>,
}

// ============================================================================
// MANAGER
// ============================================================================

/// Unified per-user memory manager
pub struct MemoryManager {
    user_id: Option<String>,
    storage_dir: Option<PathBuf>,

    pool: Arc<MemoryPool>,
    quality: Arc<QualityController>,
    persona_builder: PersonaBuilder,

    /// Session tier: exactly one working memory
    pub working: WorkingMemory,

    // User tier, lazily constructed
    episodic: Option<EpisodicMemory>,
    preference: Option<PreferenceMemory>,
    plan: Option<PlanMemory>,

    // System tier, lazily constructed
    skill: Option<SkillMemory>,
    cache: Option<CacheMemory>,
}

impl MemoryManager {
    pub fn new(
        pool: Arc<MemoryPool>,
        quality: Arc<QualityController>,
        user_id: Option<&str>,
        storage_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            user_id: user_id.map(String::from),
            storage_dir,
            pool,
            quality,
            persona_builder: PersonaBuilder::new(),
            working: WorkingMemory::new(),
            episodic: None,
            preference: None,
            plan: None,
            skill: None,
            cache: None,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    fn require_user(&self) -> Result<&str, ManagerError> {
        self.user_id.as_deref().ok_or(ManagerError::MissingUser)
    }

    // ========================================================================
    // LAZY TIER ACCESS
    // ========================================================================

    /// Episodic store, constructed on first access
    pub fn episodic(&mut self) -> &mut EpisodicMemory {
        let (user_id, dir) = (self.user_id.clone(), self.storage_dir.clone());
        self.episodic
            .get_or_insert_with(|| EpisodicMemory::new(user_id.as_deref(), dir.as_deref()))
    }

    /// Preference store, constructed on first access
    pub fn preference(&mut self) -> &mut PreferenceMemory {
        let (user_id, dir) = (self.user_id.clone(), self.storage_dir.clone());
        self.preference
            .get_or_insert_with(|| PreferenceMemory::new(user_id.as_deref(), dir.as_deref()))
    }

    /// Plan store, constructed on first access
    pub fn plan(&mut self) -> &mut PlanMemory {
        let (user_id, dir) = (self.user_id.clone(), self.storage_dir.clone());
        self.plan
            .get_or_insert_with(|| PlanMemory::new(user_id.as_deref(), dir.as_deref()))
    }

    /// Skill registry, constructed on first access
    pub fn skill(&mut self) -> &mut SkillMemory {
        self.skill.get_or_insert_with(SkillMemory::new)
    }

    /// System cache, constructed on first access
    pub fn cache(&mut self) -> &mut CacheMemory {
        self.cache.get_or_insert_with(CacheMemory::default)
    }

    // ========================================================================
    // TASK LIFECYCLE
    // ========================================================================

    /// Begin a task: clear the session tier and stamp task metadata
    pub fn start_task(&mut self, task_id: &str, user_intent: &str) {
        self.working.clear();
        self.working.update_metadata("task_id", task_id);
        self.working.update_metadata("user_intent", user_intent);
        self.working
            .update_metadata("start_time", Utc::now().to_rfc3339());
        if let Some(user_id) = &self.user_id {
            self.working.update_metadata("user_id", user_id.clone());
        }
        tracing::debug!(task_id, "task started");
    }

    /// End a task, optionally rolling it into the episodic store
    pub async fn end_task(&mut self, result: Value, save_to_episodic: bool) {
        let task_id = self
            .working
            .get_metadata_str("task_id", "unknown")
            .to_string();
        let user_intent = self
            .working
            .get_metadata_str("user_intent", "")
            .to_string();
        let metadata = self.working.metadata().clone();

        if save_to_episodic {
            let episodic = self.episodic();
            if !episodic.is_initialized() {
                let _ = episodic.initialize().await;
            }
            episodic
                .add_episode(task_id.clone(), user_intent, result, None, metadata)
                .await;
        }
        tracing::debug!(task_id = %task_id, "task ended");
    }

    /// Drop session-tier state
    pub fn clear_session(&mut self) {
        self.working.clear();
    }

    /// Drop every tier this manager has touched
    pub async fn clear_all(&mut self) {
        self.working.clear();
        if let Some(episodic) = &mut self.episodic {
            episodic.clear().await;
        }
        if let Some(preference) = &mut self.preference {
            preference.clear().await;
        }
        if let Some(plan) = &mut self.plan {
            plan.clear().await;
        }
        if let Some(skill) = &mut self.skill {
            skill.clear();
        }
        if let Some(cache) = &mut self.cache {
            cache.clear();
        }
    }

    // ========================================================================
    // MEMORY CARDS
    // ========================================================================

    /// Create an explicit memory card.
    ///
    /// The decider rules against the top-5 similar memories: DELETE removes
    /// the contradicted records, UPDATE rewrites the matched record in place
    /// (the card id becomes that record's id), ADD lands one new record
    /// whose store id the returned card carries, NONE returns an
    /// unpersisted card with a synthetic `noop_` id. The draft's content may
    /// come back rewritten by the decider.
    pub async fn create_memory_card(&mut self, draft: CardDraft) -> Result<MemoryCard, ManagerError> {
        let user_id = self.require_user()?.to_string();

        if draft.check_sensitive && self.quality.should_reject(&draft.content) {
            return Err(ManagerError::Rejected("empty or too short"));
        }

        let similar = if draft.check_conflicts {
            self.pool.search(&user_id, &draft.content, Some(5), 0.0).await
        } else {
            vec![]
        };

        let decision = if draft.check_sensitive || draft.check_conflicts {
            self.quality.analyze_update(&draft.content, &similar).await
        } else {
            UpdateDecision::fallback_add(&draft.content, &[])
        };
        let actions = self.quality.extract_update_actions(decision);

        let stamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let short: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();

        let mut content = draft.content.clone();
        let mut extra_metadata = draft.metadata.clone();

        let (card_id, event) = if !actions.delete.is_empty() {
            let targets: Vec<String> = actions.delete.iter().map(|e| e.id.clone()).collect();
            for target in &targets {
                self.pool.delete(target);
            }
            tracing::info!(user_id = %user_id, targets = targets.len(), "conflicting memories deleted");
            if let Some(text) = actions.delete.first().and_then(|e| {
                (!e.text.trim().is_empty()).then(|| e.text.clone())
            }) {
                content = text;
            }
            extra_metadata.insert("update_targets".into(), json!(targets));
            (format!("deleted_{stamp}_{short}"), MemoryEvent::Delete)
        } else if !actions.update.is_empty() {
            let mut targets = Vec::new();
            for entry in &actions.update {
                if self.pool.update(&entry.id, &entry.text).await {
                    targets.push(entry.id.clone());
                }
            }
            tracing::info!(user_id = %user_id, targets = targets.len(), "memories rewritten");
            if let Some(first) = actions.update.first() {
                content = first.text.clone();
            }
            extra_metadata.insert("update_targets".into(), json!(targets));
            let id = targets
                .first()
                .cloned()
                .unwrap_or_else(|| format!("updated_{stamp}_{short}"));
            (id, MemoryEvent::Update)
        } else if !actions.add.is_empty() {
            if let Some(first) = actions.add.first() {
                content = first.text.clone();
            }
            // The card id IS the store record id
            (Uuid::new_v4().to_string(), MemoryEvent::Add)
        } else {
            (format!("noop_{stamp}_{short}"), MemoryEvent::None)
        };

        let mut card = MemoryCard::new(&card_id, &user_id, content, draft.category)
            .with_ttl(draft.ttl_minutes);
        card.title = draft.title;
        card.tags = draft.tags;
        card.visibility = draft.visibility;
        card.metadata = extra_metadata;

        if event == MemoryEvent::Add {
            let persisted = self
                .pool
                .insert_memory(&card.id, &user_id, &card.content, card.to_record_metadata())
                .await;
            if persisted {
                card.metadata
                    .insert("store_id".into(), Value::String(card.id.clone()));
            }
        } else {
            card.metadata
                .insert("update_action".into(), Value::String(event.as_str().into()));
        }

        tracing::info!(
            user_id = %user_id,
            card_id = %card.id,
            category = %card.category,
            action = event.as_str(),
            "memory card created"
        );
        Ok(card)
    }

    /// List the user's memory cards, newest first
    pub async fn list_memory_cards(
        &self,
        category: Option<MemoryCardCategory>,
        limit: usize,
        include_expired: bool,
    ) -> Vec<MemoryCard> {
        let Ok(user_id) = self.require_user() else {
            return vec![];
        };

        let memories = self.pool.get_all(user_id, Some(200)).await;
        let mut cards: Vec<MemoryCard> = memories
            .iter()
            .filter_map(MemoryCard::from_retrieved)
            .filter(|card| category.is_none_or(|c| card.category == c))
            .filter(|card| include_expired || !card.is_expired())
            .collect();

        cards.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        cards.truncate(limit);
        cards
    }

    /// Hybrid-search the user's explicit memories
    pub async fn search_memory_cards(
        &self,
        query: &str,
        category: Option<MemoryCardCategory>,
        limit: usize,
    ) -> Vec<MemoryCard> {
        let Ok(user_id) = self.require_user() else {
            return vec![];
        };

        let memories = self.pool.search(user_id, query, Some(limit * 2), 0.0).await;
        let mut cards: Vec<MemoryCard> = memories
            .iter()
            .filter_map(MemoryCard::from_retrieved)
            .filter(|card| category.is_none_or(|c| card.category == c))
            .collect();
        cards.truncate(limit);
        cards
    }

    /// Fetch one card by its card id or underlying store id
    pub async fn get_memory_card(&self, card_id: &str) -> Option<MemoryCard> {
        let cards = self.list_memory_cards(None, 200, true).await;
        cards
            .into_iter()
            .find(|card| card.id == card_id || card.store_id() == card_id)
    }

    /// Delete one card, resolving the underlying store record
    pub async fn delete_memory_card(&self, card_id: &str) -> bool {
        let Some(card) = self.get_memory_card(card_id).await else {
            tracing::warn!(card_id, "memory card not found");
            return false;
        };
        let deleted = self.pool.delete(card.store_id());
        if deleted {
            tracing::info!(card_id, store_id = card.store_id(), "memory card deleted");
        }
        deleted
    }

    /// Sweep expired long-term memories
    pub async fn clean_expired_memories(&self, memory_types: Option<&[MemoryType]>) -> usize {
        let Ok(user_id) = self.require_user() else {
            return 0;
        };
        self.quality
            .clean_expired_memories(user_id, memory_types)
            .await
    }

    /// TTL report for this user
    pub async fn get_memory_ttl_status(&self) -> crate::update::TtlStatus {
        let Ok(user_id) = self.require_user() else {
            return crate::update::TtlStatus::default();
        };
        self.quality.get_memory_ttl_status(user_id).await
    }

    // ========================================================================
    // CONTEXT ASSEMBLY
    // ========================================================================

    /// Assemble the context bundle for the next LLM call
    pub async fn get_context_for_llm(
        &mut self,
        include_episodic: bool,
        include_persona: bool,
        max_persona_tokens: Option<usize>,
    ) -> LlmContext {
        let mut context = LlmContext {
            messages: self
                .working
                .get_messages(None)
                .iter()
                .filter_map(|m| serde_json::to_value(m).ok())
                .collect(),
            tool_history: self
                .working
                .get_tool_history(None)
                .iter()
                .filter_map(|t| serde_json::to_value(t).ok())
                .collect(),
            metadata: self.working.metadata().clone(),
            ..Default::default()
        };

        if include_episodic {
            let user_intent = self
                .working
                .get_metadata_str("user_intent", "")
                .to_string();
            if !user_intent.is_empty() {
                let episodic = self.episodic();
                if !episodic.is_initialized() {
                    let _ = episodic.initialize().await;
                }
                let similar: Vec<Value> = episodic
                    .get_similar_episodes(&user_intent, 2)
                    .into_iter()
                    .filter_map(|e: &Episode| serde_json::to_value(e).ok())
                    .collect();
                if !similar.is_empty() {
                    context.similar_episodes = Some(similar);
                }
            }
        }

        if include_persona && self.user_id.is_some() {
            let cards = self.list_memory_cards(None, 10, false).await;
            let user_id = self.user_id.clone().unwrap_or_default();
            let persona = self
                .persona_builder
                .build_persona(&user_id, &[], None, None, &[], &[]);
            let oracle: &dyn TokenOracle = &HeuristicTokenOracle;
            context.user_persona = self.persona_builder.render_prompt_section(
                &persona,
                &cards,
                max_persona_tokens,
                oracle,
            );
        }

        context
    }

    // ========================================================================
    // USER SWITCH
    // ========================================================================

    /// Rebind to another user: every lazy per-user handle is dropped and
    /// reconstructed for the new user on next access
    pub fn switch_user(&mut self, user_id: &str) {
        self.user_id = Some(user_id.to_string());
        self.episodic = None;
        self.preference = None;
        self.plan = None;
        tracing::debug!(user_id, "user switched");
    }

    /// One-line status for diagnostics
    pub fn summary(&self) -> String {
        format!(
            "MemoryManager(user_id={:?}, working={}, episodic={}, plan={}, skill={})",
            self.user_id,
            self.working.summary(),
            if self.episodic.is_some() { "loaded" } else { "not_loaded" },
            if self.plan.is_some() { "loaded" } else { "not_loaded" },
            if self.skill.is_some() { "loaded" } else { "not_loaded" },
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================
