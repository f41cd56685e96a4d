//! Memory Pool
//!
//! Process-wide handle owning the vector store, the embedder, the
//! language-model client and the history audit log. All reads degrade to
//! empty results and all writes to no-ops when the store is unavailable -
//! the assistant never fails a turn because the memory substrate did.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::json;

use crate::config::MemoryConfig;
use crate::extraction::FactExtractor;
use crate::memory::{MemoryMetadata, MemoryPayload, MemorySource, MemoryType, MemoryVisibility, RetrievedMemory};
use crate::providers::{ChatMessage, Embedder, LanguageModel};
use crate::store::{HistoryStore, ScoredPoint, UpsertRecord, VectorStore};
use crate::update::{ExistingMemory, MemoryEvent, UpdateDecider};

/// Both retrieval sides prefetch `limit * PREFETCH_FACTOR` before merging
pub const PREFETCH_FACTOR: usize = 2;

/// How many similar memories the decider sees per new fact
const DECISION_NEIGHBORS: usize = 5;

// ============================================================================
// OPTIONS / RESULTS
// ============================================================================

/// Classification options for `add`
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    pub metadata: Option<MemoryMetadata>,
    pub memory_type: Option<MemoryType>,
    pub source: Option<MemorySource>,
    pub visibility: Option<MemoryVisibility>,
    pub ttl_minutes: Option<i64>,
}

impl AddOptions {
    /// Fold the classification fields into one metadata document and stamp
    /// the TTL expiry
    fn into_metadata(self, created_at: chrono::DateTime<Utc>) -> MemoryMetadata {
        let mut metadata = self.metadata.unwrap_or_default();
        if self.memory_type.is_some() {
            metadata.memory_type = self.memory_type;
        }
        if self.source.is_some() {
            metadata.source = self.source;
        }
        if self.visibility.is_some() {
            metadata.visibility = self.visibility;
        }
        if self.ttl_minutes.is_some() {
            metadata.ttl_minutes = self.ttl_minutes;
        }
        metadata.stamp_expiry(created_at);
        metadata
    }
}

/// One event the ingestion pipeline applied
#[derive(Debug, Clone)]
pub struct AppliedEvent {
    pub id: String,
    pub memory: String,
    pub event: MemoryEvent,
    pub previous_memory: Option<String>,
}

/// Result of one `add` call
#[derive(Debug, Clone, Default)]
pub struct AddResult {
    pub results: Vec<AppliedEvent>,
}

/// Pool health report
#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub healthy: bool,
    pub collection: String,
    pub detail: Option<String>,
}

// ============================================================================
// POOL
// ============================================================================

struct PoolState {
    store: Option<Arc<VectorStore>>,
    history: Option<Arc<HistoryStore>>,
    /// Sticky: once construction failed, no retry and no further logging
    /// until an explicit reset
    unavailable: bool,
}

/// Process-wide memory pool
pub struct MemoryPool {
    config: MemoryConfig,
    embedder: Arc<dyn Embedder>,
    facts: FactExtractor,
    decider: UpdateDecider,
    state: Mutex<PoolState>,
}

impl MemoryPool {
    /// Build a pool from a validated config and provider adapters.
    ///
    /// The vector store itself is constructed lazily on first use so a
    /// misconfigured deployment degrades instead of failing startup.
    pub fn new(
        config: MemoryConfig,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LanguageModel>,
    ) -> Self {
        Self {
            config,
            embedder,
            facts: FactExtractor::new(llm.clone()),
            decider: UpdateDecider::new(llm),
            state: Mutex::new(PoolState {
                store: None,
                history: None,
                unavailable: false,
            }),
        }
    }

    /// The configuration this pool was built with
    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// The embedding adapter (shared with consumers that need raw vectors)
    pub fn embedder(&self) -> Arc<dyn Embedder> {
        self.embedder.clone()
    }

    /// The update decider bound to this pool's language model
    pub fn decider(&self) -> &UpdateDecider {
        &self.decider
    }

    /// Lazily construct the store; on failure flip the sticky flag and go
    /// quiet. Returns `None` while unavailable.
    fn store(&self) -> Option<(Arc<VectorStore>, Arc<HistoryStore>)> {
        let mut state = self.state.lock().ok()?;
        if state.unavailable {
            return None;
        }
        if let (Some(store), Some(history)) = (&state.store, &state.history) {
            return Some((store.clone(), history.clone()));
        }

        let built = VectorStore::new(
            self.config.vectors_db_path(),
            &self.config.collection_name(),
            self.config.dimensions,
        )
        .and_then(|store| {
            let history = HistoryStore::new(self.config.history_db_path())?;
            Ok((Arc::new(store), Arc::new(history)))
        });

        match built {
            Ok((store, history)) => {
                state.store = Some(store.clone());
                state.history = Some(history.clone());
                Some((store, history))
            }
            Err(e) => {
                state.unavailable = true;
                tracing::warn!(
                    "vector store unavailable, memory disabled for this session (no retries): {e}"
                );
                None
            }
        }
    }

    /// Drop cached handles and clear the unavailability flag. Used by
    /// configuration-reload paths after credentials change.
    pub fn reset(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.store = None;
            state.history = None;
            state.unavailable = false;
        }
    }

    /// Whether the pool has given up on its store
    pub fn is_unavailable(&self) -> bool {
        self.state.lock().map(|s| s.unavailable).unwrap_or(true)
    }

    // ========================================================================
    // SEARCH
    // ========================================================================

    /// Hybrid search: vector KNN and BM25 keyword hits merged by id with
    /// `score = 0.6 * vec + 0.4 * bm25` (a missing side counts 0), sorted
    /// descending, thresholded by `min_score`, truncated to `limit`.
    pub async fn search(
        &self,
        user_id: &str,
        query: &str,
        limit: Option<usize>,
        min_score: f32,
    ) -> Vec<RetrievedMemory> {
        if user_id.is_empty() || query.is_empty() {
            tracing::warn!("search called with empty user_id or query");
            return vec![];
        }
        let Some((store, _)) = self.store() else {
            return vec![];
        };
        let limit = limit.unwrap_or(self.config.default_search_limit);
        let prefetch = limit * PREFETCH_FACTOR;

        // Vector side; embedding failure degrades to keyword-only
        let vec_hits: Vec<ScoredPoint> = match self.embedder.embed(query).await {
            Ok(vector) => match store.search(&vector, prefetch) {
                Ok(hits) => hits,
                Err(e) => {
                    tracing::warn!("vector search failed (degrading to keyword): {e}");
                    vec![]
                }
            },
            Err(e) => {
                tracing::warn!("query embedding failed (degrading to keyword): {e}");
                vec![]
            }
        };

        // Keyword side
        let fts_hits = match store.keyword_search(query, Some(user_id), prefetch) {
            Ok(hits) => hits,
            Err(e) => {
                tracing::debug!("keyword search failed (non-fatal): {e}");
                vec![]
            }
        };

        let merged = merge_hybrid(
            vec_hits,
            fts_hits,
            user_id,
            self.config.vector_weight,
            self.config.keyword_weight,
        );

        let results: Vec<RetrievedMemory> = merged
            .into_iter()
            .filter(|m| min_score <= 0.0 || m.score >= min_score)
            .take(limit)
            .collect();

        tracing::debug!(
            user_id,
            query = %query.chars().take(32).collect::<String>(),
            results = results.len(),
            "hybrid search complete"
        );
        results
    }

    // ========================================================================
    // INGESTION
    // ========================================================================

    /// Ingest a conversation turn: extract facts, run the update decider
    /// per fact against its nearest neighbors, apply the verdicts, and log
    /// every mutation to the history store.
    pub async fn add(
        &self,
        user_id: &str,
        messages: &[ChatMessage],
        options: AddOptions,
    ) -> AddResult {
        if user_id.is_empty() || messages.is_empty() {
            tracing::warn!("add called with empty user_id or messages");
            return AddResult::default();
        }
        let Some((store, history)) = self.store() else {
            return AddResult::default();
        };

        let facts = self.facts.extract(messages).await;
        if facts.is_empty() {
            return AddResult::default();
        }

        let now = Utc::now();
        let metadata = options.into_metadata(now);

        let mut applied = Vec::new();
        for fact in facts {
            let neighbors = self.similar_for_user(&store, user_id, &fact).await;
            let decision = self.decider.decide(&fact, &neighbors).await;

            for entry in decision.entries {
                match entry.event {
                    MemoryEvent::Add => {
                        let embedding = match self.embedder.embed(&entry.text).await {
                            Ok(v) => v,
                            Err(e) => {
                                tracing::warn!("embedding failed, fact dropped from this turn: {e}");
                                continue;
                            }
                        };
                        let payload = MemoryPayload::new(entry.text.clone(), user_id)
                            .with_metadata(metadata.clone());
                        let record = UpsertRecord {
                            id: entry.id.clone(),
                            embedding,
                            payload: payload.to_value(),
                        };
                        if let Err(e) = store.insert(&[record]) {
                            tracing::error!("memory insert failed: {e}");
                            continue;
                        }
                        let _ = history.record(&entry.id, None, Some(&entry.text), "ADD");
                        applied.push(AppliedEvent {
                            id: entry.id,
                            memory: entry.text,
                            event: MemoryEvent::Add,
                            previous_memory: None,
                        });
                    }
                    MemoryEvent::Update => {
                        if let Some(event) = self.apply_update(&store, &history, &entry.id, &entry.text).await {
                            applied.push(event);
                        }
                    }
                    MemoryEvent::Delete => {
                        let previous = entry.old_memory.clone();
                        match store.delete(&entry.id) {
                            Ok(true) => {
                                let _ = history.record(&entry.id, previous.as_deref(), None, "DELETE");
                                applied.push(AppliedEvent {
                                    id: entry.id,
                                    memory: String::new(),
                                    event: MemoryEvent::Delete,
                                    previous_memory: previous,
                                });
                            }
                            Ok(false) => {}
                            Err(e) => tracing::error!("memory delete failed: {e}"),
                        }
                    }
                    MemoryEvent::None => {}
                }
            }
        }

        tracing::info!(
            user_id,
            applied = applied.len(),
            "conversation turn ingested"
        );
        AddResult { results: applied }
    }

    /// Insert one already-decided memory under a caller-chosen id (explicit
    /// card path). Skips fact extraction and decisioning - the caller has
    /// already ruled ADD.
    pub async fn insert_memory(
        &self,
        id: &str,
        user_id: &str,
        memory: &str,
        metadata: MemoryMetadata,
    ) -> bool {
        let Some((store, history)) = self.store() else {
            return false;
        };
        let embedding = match self.embedder.embed(memory).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("embedding failed, memory not stored: {e}");
                return false;
            }
        };
        let payload = MemoryPayload::new(memory, user_id).with_metadata(metadata);
        let record = UpsertRecord {
            id: id.to_string(),
            embedding,
            payload: payload.to_value(),
        };
        if let Err(e) = store.insert(&[record]) {
            tracing::error!("memory insert failed: {e}");
            return false;
        }
        let _ = history.record(id, None, Some(memory), "ADD");
        true
    }

    async fn similar_for_user(
        &self,
        store: &VectorStore,
        user_id: &str,
        fact: &str,
    ) -> Vec<ExistingMemory> {
        let Ok(vector) = self.embedder.embed(fact).await else {
            return vec![];
        };
        let hits = store
            .search(&vector, DECISION_NEIGHBORS * PREFETCH_FACTOR)
            .unwrap_or_default();
        hits.into_iter()
            .filter_map(|hit| RetrievedMemory::from_payload(hit.id, hit.score, &hit.payload))
            .filter(|m| m.user_id == user_id)
            .take(DECISION_NEIGHBORS)
            .map(|m| ExistingMemory {
                id: m.id,
                text: m.memory,
            })
            .collect()
    }

    async fn apply_update(
        &self,
        store: &VectorStore,
        history: &HistoryStore,
        id: &str,
        new_text: &str,
    ) -> Option<AppliedEvent> {
        let existing = store.get(id).ok().flatten()?;
        let mut payload = MemoryPayload::from_value(&existing.payload)?;
        let previous = payload.memory.clone();

        payload.memory = new_text.to_string();
        payload.updated_at = Some(Utc::now());

        let embedding = match self.embedder.embed(new_text).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("re-embedding failed, update skipped: {e}");
                return None;
            }
        };
        if let Err(e) = store.update(id, Some(&embedding), Some(&payload.to_value())) {
            tracing::error!("memory update failed: {e}");
            return None;
        }
        let _ = history.record(id, Some(&previous), Some(new_text), "UPDATE");
        Some(AppliedEvent {
            id: id.to_string(),
            memory: new_text.to_string(),
            event: MemoryEvent::Update,
            previous_memory: Some(previous),
        })
    }

    // ========================================================================
    // DIRECT OPERATIONS
    // ========================================================================

    /// All memories of one user, most useful with a generous limit
    pub async fn get_all(&self, user_id: &str, limit: Option<usize>) -> Vec<RetrievedMemory> {
        if user_id.is_empty() {
            return vec![];
        }
        let Some((store, _)) = self.store() else {
            return vec![];
        };
        let hits = store
            .list(&[("user_id", json!(user_id))], Some(limit.unwrap_or(100)))
            .unwrap_or_else(|e| {
                tracing::error!("listing memories failed: {e}");
                vec![]
            });
        hits.into_iter()
            .filter_map(|hit| RetrievedMemory::from_payload(hit.id, hit.score, &hit.payload))
            .collect()
    }

    /// Rewrite one memory's text (and embedding). Returns false while the
    /// store is unavailable or the id is unknown.
    pub async fn update(&self, memory_id: &str, data: &str) -> bool {
        let Some((store, history)) = self.store() else {
            return false;
        };
        self.apply_update(&store, &history, memory_id, data)
            .await
            .is_some()
    }

    /// Delete one memory
    pub fn delete(&self, memory_id: &str) -> bool {
        let Some((store, history)) = self.store() else {
            return false;
        };
        match store.delete(memory_id) {
            Ok(deleted) => {
                if deleted {
                    let _ = history.record(memory_id, None, None, "DELETE");
                }
                deleted
            }
            Err(e) => {
                tracing::error!("memory delete failed: {e}");
                false
            }
        }
    }

    /// Remove every memory of one user
    pub async fn reset_user(&self, user_id: &str) -> bool {
        let Some((store, _)) = self.store() else {
            return false;
        };
        let memories = self.get_all(user_id, Some(10_000)).await;
        let mut ok = true;
        for memory in memories {
            ok &= store.delete(&memory.id).unwrap_or(false);
        }
        tracing::info!(user_id, "user memories reset");
        ok
    }

    /// Health report for diagnostics surfaces
    pub fn health_check(&self) -> HealthStatus {
        match self.store() {
            Some((store, _)) => HealthStatus {
                healthy: true,
                collection: store.collection().to_string(),
                detail: None,
            },
            None => HealthStatus {
                healthy: false,
                collection: self.config.collection_name(),
                detail: Some("vector store unavailable".to_string()),
            },
        }
    }
}

// ============================================================================
// HYBRID MERGE
// ============================================================================

/// Weighted union of the two retrieval sides, keyed by id. Vector hits are
/// filtered to the requesting user here (the keyword side already filtered
/// in SQL).
fn merge_hybrid(
    vec_hits: Vec<ScoredPoint>,
    fts_hits: Vec<ScoredPoint>,
    user_id: &str,
    vector_weight: f32,
    keyword_weight: f32,
) -> Vec<RetrievedMemory> {
    use std::collections::HashMap;

    struct Sides {
        memory: RetrievedMemory,
        vec_score: f32,
        fts_score: f32,
    }

    let mut by_id: HashMap<String, Sides> = HashMap::new();

    for hit in vec_hits {
        let Some(memory) = RetrievedMemory::from_payload(hit.id.clone(), hit.score, &hit.payload)
        else {
            continue;
        };
        if memory.user_id != user_id {
            continue;
        }
        by_id.insert(
            hit.id,
            Sides {
                memory,
                vec_score: hit.score,
                fts_score: 0.0,
            },
        );
    }

    for hit in fts_hits {
        if let Some(sides) = by_id.get_mut(&hit.id) {
            sides.fts_score = hit.score;
            continue;
        }
        let Some(memory) = RetrievedMemory::from_payload(hit.id.clone(), hit.score, &hit.payload)
        else {
            continue;
        };
        by_id.insert(
            hit.id,
            Sides {
                memory,
                vec_score: 0.0,
                fts_score: hit.score,
            },
        );
    }

    let mut merged: Vec<RetrievedMemory> = by_id
        .into_values()
        .map(|sides| {
            let mut memory = sides.memory;
            memory.score = vector_weight * sides.vec_score + keyword_weight * sides.fts_score;
            memory
        })
        .collect();
    merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    merged
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: &str, score: f32, memory: &str, user: &str) -> ScoredPoint {
        ScoredPoint {
            id: id.to_string(),
            score,
            payload: json!({
                "memory": memory,
                "user_id": user,
                "created_at": Utc::now().to_rfc3339(),
            }),
        }
    }

    #[test]
    fn test_merge_weights_both_sides() {
        let vec_hits = vec![point("a", 0.8, "both sides", "u1")];
        let fts_hits = vec![point("a", 0.5, "both sides", "u1")];
        let merged = merge_hybrid(vec_hits, fts_hits, "u1", 0.6, 0.4);
        assert_eq!(merged.len(), 1);
        assert!((merged[0].score - (0.6 * 0.8 + 0.4 * 0.5)).abs() < 1e-6);
    }

    #[test]
    fn test_merge_single_side_counts_missing_as_zero() {
        let vec_hits = vec![point("v", 0.9, "vector only", "u1")];
        let fts_hits = vec![point("k", 0.9, "keyword only", "u1")];
        let merged = merge_hybrid(vec_hits, fts_hits, "u1", 0.6, 0.4);
        assert_eq!(merged.len(), 2);
        // Same raw score, vector weight dominates
        assert_eq!(merged[0].id, "v");
        assert!((merged[0].score - 0.54).abs() < 1e-6);
        assert!((merged[1].score - 0.36).abs() < 1e-6);
    }

    #[test]
    fn test_merge_dual_hit_outranks_single_hit() {
        let vec_hits = vec![
            point("both", 0.7, "x", "u1"),
            point("vec-only", 0.7, "y", "u1"),
        ];
        let fts_hits = vec![point("both", 0.4, "x", "u1")];
        let merged = merge_hybrid(vec_hits, fts_hits, "u1", 0.6, 0.4);
        assert_eq!(merged[0].id, "both");
        assert!(merged[0].score > merged[1].score);
    }

    #[test]
    fn test_merge_filters_other_users_vector_hits() {
        let vec_hits = vec![
            point("mine", 0.9, "my memory", "u1"),
            point("theirs", 0.95, "their memory", "u2"),
        ];
        let merged = merge_hybrid(vec_hits, vec![], "u1", 0.6, 0.4);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, "mine");
    }
}
