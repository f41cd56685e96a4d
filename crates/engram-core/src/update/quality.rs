//! Quality Controller
//!
//! Single-writer gatekeeper for explicit additions. Format checks are the
//! only fast path here; every semantic judgement (conflict, duplication,
//! categorisation) goes through the update decider.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::memory::{MemoryType, RetrievedMemory};
use crate::pool::MemoryPool;
use crate::update::{DecisionEntry, ExistingMemory, MemoryEvent, UpdateDecider, UpdateDecision};

/// "Expiring soon" horizon for the TTL status report
const EXPIRING_SOON_DAYS: i64 = 7;

// ============================================================================
// CONFLICTS
// ============================================================================

/// What kind of disagreement the decider surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// The new content refines/changes an existing entry (decider: UPDATE)
    PreferenceChange,
    /// The new content contradicts an existing entry (decider: DELETE)
    FactContradiction,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictKind::PreferenceChange => "preference_change",
            ConflictKind::FactContradiction => "fact_contradiction",
        }
    }
}

/// One detected conflict between a new memory and an existing one
#[derive(Debug, Clone)]
pub struct MemoryConflict {
    pub kind: ConflictKind,
    /// Id of the existing memory involved
    pub memory_id: String,
    pub existing: String,
    pub incoming: String,
    pub suggestion: String,
}

/// Resolution policy for a detected conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Explicit user statements win: delete the old memory
    ExplicitFirst,
    /// Newest information wins: rewrite the old memory's text
    NewestFirst,
    /// Keep both, flag for human review
    KeepBoth,
    /// Rewrite the old memory in place
    UpdateOld,
}

/// Outcome of a resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictResolution {
    Deleted { memory_id: String },
    Rewritten { memory_id: String },
    NeedsReview,
}

// ============================================================================
// DECISION ENVELOPE
// ============================================================================

/// The four action lists split out of one decision, plus the temp-id map
#[derive(Debug, Clone, Default)]
pub struct UpdateActions {
    pub add: Vec<DecisionEntry>,
    pub update: Vec<DecisionEntry>,
    pub delete: Vec<DecisionEntry>,
    pub none: Vec<DecisionEntry>,
    pub id_map: HashMap<String, String>,
}

// ============================================================================
// TTL STATUS
// ============================================================================

/// Per-type TTL counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TtlTypeCounts {
    pub with_ttl: usize,
    pub expired: usize,
    pub expiring_soon: usize,
}

/// TTL report for one user's memories
#[derive(Debug, Clone, Default)]
pub struct TtlStatus {
    pub total: usize,
    pub with_ttl: usize,
    pub expired: usize,
    pub expiring_soon: usize,
    pub by_type: HashMap<String, TtlTypeCounts>,
}

// ============================================================================
// CONTROLLER
// ============================================================================

/// Write-time gatekeeper over the pool and the update decider
pub struct QualityController {
    pool: Arc<MemoryPool>,
    decider: UpdateDecider,
}

impl QualityController {
    pub fn new(pool: Arc<MemoryPool>, llm: Arc<dyn crate::providers::LanguageModel>) -> Self {
        Self {
            pool,
            decider: UpdateDecider::new(llm),
        }
    }

    /// Format pre-filter ONLY: empty or shorter than 5 characters. Anything
    /// semantic is the decider's call, which may still rule NONE.
    pub fn should_reject(&self, content: &str) -> bool {
        let trimmed = content.trim();
        trimmed.is_empty() || trimmed.chars().count() < 5
    }

    /// Run the decider against already-retrieved similar memories
    pub async fn analyze_update(
        &self,
        new_memory: &str,
        existing: &[RetrievedMemory],
    ) -> UpdateDecision {
        let pairs: Vec<ExistingMemory> = existing
            .iter()
            .map(|m| ExistingMemory {
                id: m.id.clone(),
                text: m.memory.clone(),
            })
            .collect();
        self.decider.decide(new_memory, &pairs).await
    }

    /// Split one decision into its four action lists
    pub fn extract_update_actions(&self, decision: UpdateDecision) -> UpdateActions {
        let mut actions = UpdateActions {
            id_map: decision.id_map,
            ..Default::default()
        };
        for entry in decision.entries {
            match entry.event {
                MemoryEvent::Add => actions.add.push(entry),
                MemoryEvent::Update => actions.update.push(entry),
                MemoryEvent::Delete => actions.delete.push(entry),
                MemoryEvent::None => actions.none.push(entry),
            }
        }
        actions
    }

    /// Query the pool for the top-5 similar memories and surface one
    /// conflict record per UPDATE and per DELETE the decider rules.
    pub async fn detect_conflicts(&self, user_id: &str, new_memory: &str) -> Vec<MemoryConflict> {
        let similar = self.pool.search(user_id, new_memory, Some(5), 0.0).await;
        if similar.is_empty() {
            return vec![];
        }

        let decision = self.analyze_update(new_memory, &similar).await;
        let actions = self.extract_update_actions(decision);

        let mut conflicts = Vec::new();
        for entry in &actions.update {
            conflicts.push(MemoryConflict {
                kind: ConflictKind::PreferenceChange,
                memory_id: entry.id.clone(),
                existing: entry.old_memory.clone().unwrap_or_default(),
                incoming: entry.text.clone(),
                suggestion: format!(
                    "replace \"{}\" with \"{}\"",
                    entry.old_memory.clone().unwrap_or_default(),
                    entry.text
                ),
            });
        }
        for entry in &actions.delete {
            conflicts.push(MemoryConflict {
                kind: ConflictKind::FactContradiction,
                memory_id: entry.id.clone(),
                existing: entry.old_memory.clone().unwrap_or_default(),
                incoming: new_memory.to_string(),
                suggestion: format!(
                    "\"{}\" contradicts the new statement; remove it",
                    entry.old_memory.clone().unwrap_or_default()
                ),
            });
        }

        if !conflicts.is_empty() {
            tracing::info!(
                user_id,
                conflicts = conflicts.len(),
                "memory conflicts detected"
            );
        }
        conflicts
    }

    /// Resolve one conflict under a policy
    pub async fn resolve_conflict(
        &self,
        user_id: &str,
        conflict: &MemoryConflict,
        policy: ConflictPolicy,
    ) -> ConflictResolution {
        match policy {
            ConflictPolicy::ExplicitFirst => {
                self.pool.delete(&conflict.memory_id);
                tracing::info!(user_id, memory_id = %conflict.memory_id, "conflict resolved by deletion");
                ConflictResolution::Deleted {
                    memory_id: conflict.memory_id.clone(),
                }
            }
            ConflictPolicy::NewestFirst | ConflictPolicy::UpdateOld => {
                self.pool.update(&conflict.memory_id, &conflict.incoming).await;
                tracing::info!(user_id, memory_id = %conflict.memory_id, "conflict resolved by rewrite");
                ConflictResolution::Rewritten {
                    memory_id: conflict.memory_id.clone(),
                }
            }
            ConflictPolicy::KeepBoth => {
                tracing::info!(user_id, memory_id = %conflict.memory_id, "conflict kept for review");
                ConflictResolution::NeedsReview
            }
        }
    }

    /// Sweep expired memories, optionally restricted to some types.
    /// Returns how many were removed.
    pub async fn clean_expired_memories(
        &self,
        user_id: &str,
        memory_types: Option<&[MemoryType]>,
    ) -> usize {
        let now = Utc::now();
        let memories = self.pool.get_all(user_id, Some(1000)).await;
        let mut removed = 0;
        for memory in memories {
            if !memory.metadata.is_expired_at(now) {
                continue;
            }
            if let Some(types) = memory_types {
                let ty = memory.metadata.memory_type.unwrap_or_default();
                if !types.contains(&ty) {
                    continue;
                }
            }
            if self.pool.delete(&memory.id) {
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!(user_id, removed, "expired memories swept");
        }
        removed
    }

    /// Totals and per-type counts for TTL-carrying memories
    pub async fn get_memory_ttl_status(&self, user_id: &str) -> TtlStatus {
        let now = Utc::now();
        let soon = now + Duration::days(EXPIRING_SOON_DAYS);
        let memories = self.pool.get_all(user_id, Some(1000)).await;

        let mut status = TtlStatus {
            total: memories.len(),
            ..Default::default()
        };
        for memory in &memories {
            let Some(expires_at) = memory.metadata.expires_at else {
                continue;
            };
            let type_name = memory
                .metadata
                .memory_type
                .unwrap_or_default()
                .as_str()
                .to_string();
            let counts = status.by_type.entry(type_name).or_default();

            status.with_ttl += 1;
            counts.with_ttl += 1;
            if expires_at < now {
                status.expired += 1;
                counts.expired += 1;
            } else if expires_at <= soon {
                status.expiring_soon += 1;
                counts.expiring_soon += 1;
            }
        }
        status
    }
}

// ============================================================================
// TESTS
// ============================================================================
