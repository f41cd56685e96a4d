//! Update Decider
//!
//! Given one new fact and its K nearest existing memories, decide what the
//! store should do: ADD the fact, UPDATE an existing entry, DELETE a
//! contradicted one, or NONE when the content is already present.
//!
//! Fails closed: any LM or parse failure falls back to ADD - data is never
//! lost to a flaky model. The model only ever sees short temp ids ("0",
//! "1", ...); the decision envelope keeps the mapping to real ids.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use crate::extraction::unwrap_json_fence;
use crate::providers::{ChatMessage, ChatRequest, LanguageModel};

/// Most existing memories ever presented to the model
pub const MAX_EXISTING: usize = 30;

// ============================================================================
// DECISION VOCABULARY
// ============================================================================

/// The event vocabulary the decider emits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryEvent {
    Add,
    Update,
    Delete,
    None,
}

impl MemoryEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryEvent::Add => "ADD",
            MemoryEvent::Update => "UPDATE",
            MemoryEvent::Delete => "DELETE",
            MemoryEvent::None => "NONE",
        }
    }

    fn parse_name(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "ADD" => Some(MemoryEvent::Add),
            "UPDATE" => Some(MemoryEvent::Update),
            "DELETE" => Some(MemoryEvent::Delete),
            "NONE" => Some(MemoryEvent::None),
            _ => Option::None,
        }
    }
}

/// An existing memory presented to the decider
#[derive(Debug, Clone)]
pub struct ExistingMemory {
    pub id: String,
    pub text: String,
}

/// One decided action. For UPDATE/DELETE/NONE `id` is the real persistent
/// id of the affected memory; for ADD it is a freshly minted id.
#[derive(Debug, Clone)]
pub struct DecisionEntry {
    pub id: String,
    pub text: String,
    pub event: MemoryEvent,
    pub old_memory: Option<String>,
}

/// The full decision for one new fact
#[derive(Debug, Clone, Default)]
pub struct UpdateDecision {
    pub entries: Vec<DecisionEntry>,
    /// temp id ("0", "1", ...) -> real id, as presented to the model
    pub id_map: HashMap<String, String>,
}

impl UpdateDecision {
    /// The conservative decision: ADD the fact, leave everything else alone
    pub fn fallback_add(new_fact: &str, existing: &[ExistingMemory]) -> Self {
        let mut entries = vec![DecisionEntry {
            id: Uuid::new_v4().to_string(),
            text: new_fact.to_string(),
            event: MemoryEvent::Add,
            old_memory: Option::None,
        }];
        let mut id_map = HashMap::new();
        for (index, mem) in existing.iter().enumerate() {
            id_map.insert(index.to_string(), mem.id.clone());
            entries.push(DecisionEntry {
                id: mem.id.clone(),
                text: mem.text.clone(),
                event: MemoryEvent::None,
                old_memory: Option::None,
            });
        }
        Self { entries, id_map }
    }
}

// ============================================================================
// PROMPT
// ============================================================================

const UPDATE_PROMPT: &str = r#"You are the memory update controller. Compare ONE new fact against the existing memories and decide, for the whole set, what the store should do.

Output ONLY a JSON object: {"memory": [{"id": "...", "text": "...", "event": "ADD|UPDATE|DELETE|NONE", "old_memory": "..."}]}

Rules:
- ADD: the new fact has no semantic equivalent among the existing memories. Use a fresh id string.
- UPDATE: the new fact refines, rephrases or supersedes an existing memory. Reuse that memory's id; "text" is the replacement; put the previous text in "old_memory".
- DELETE: the new fact contradicts an existing memory. Reuse that memory's id.
- NONE: the content of an existing memory is unaffected, or the new fact is already present.
- These cues ALWAYS force UPDATE, never NONE: a numeric change (amount 100 -> 150), a state change (pending -> signed), a time change, a relationship change.
- Every existing id must appear exactly once with UPDATE, DELETE or NONE. Only use the ids listed below for UPDATE/DELETE/NONE.
"#;

// ============================================================================
// DECIDER
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawDecision {
    memory: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(default)]
    id: String,
    #[serde(default)]
    text: String,
    event: String,
    #[serde(default)]
    old_memory: Option<String>,
}

/// Fails-closed ADD/UPDATE/DELETE/NONE decision procedure
pub struct UpdateDecider {
    llm: Arc<dyn LanguageModel>,
}

impl UpdateDecider {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    /// Decide the fate of one new fact against its nearest existing
    /// memories. Infallible: errors collapse into the ADD fallback.
    pub async fn decide(&self, new_fact: &str, existing: &[ExistingMemory]) -> UpdateDecision {
        let existing = &existing[..existing.len().min(MAX_EXISTING)];

        // Nothing to compare against: ADD without burning an LM call
        if existing.is_empty() {
            return UpdateDecision::fallback_add(new_fact, existing);
        }

        let mut id_map = HashMap::with_capacity(existing.len());
        let mut listing = String::new();
        for (index, mem) in existing.iter().enumerate() {
            id_map.insert(index.to_string(), mem.id.clone());
            listing.push_str(&format!("{{\"id\": \"{index}\", \"text\": {}}}\n", serde_json::to_string(&mem.text).unwrap_or_default()));
        }

        let request = ChatRequest {
            system: None,
            messages: vec![ChatMessage::user(format!(
                "{UPDATE_PROMPT}\nExisting memories:\n{listing}\nNew fact:\n{new_fact}"
            ))],
            temperature: Some(0.0),
            max_tokens: Some(1024),
        };

        let reply = match self.llm.create_message(request).await {
            Ok(response) => response.content,
            Err(e) => {
                tracing::warn!("update decision failed, falling back to ADD: {e}");
                return UpdateDecision::fallback_add(new_fact, existing);
            }
        };

        match Self::parse_reply(&reply, new_fact, existing, &id_map) {
            Some(mut decision) => {
                decision.id_map = id_map;
                decision
            }
            None => {
                tracing::warn!("update decision reply malformed, falling back to ADD");
                UpdateDecision::fallback_add(new_fact, existing)
            }
        }
    }

    /// Sync wrapper. Inside a running tokio runtime this CANNOT block on the
    /// LM, so it returns the conservative ADD default; callers that need the
    /// real decision use [`UpdateDecider::decide`] directly.
    pub fn decide_blocking(&self, new_fact: &str, existing: &[ExistingMemory]) -> UpdateDecision {
        if tokio::runtime::Handle::try_current().is_ok() {
            tracing::debug!("decide_blocking inside a runtime, returning conservative ADD");
            return UpdateDecision::fallback_add(new_fact, existing);
        }
        match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime.block_on(self.decide(new_fact, existing)),
            Err(e) => {
                tracing::warn!("decide_blocking runtime failed to start: {e}");
                UpdateDecision::fallback_add(new_fact, existing)
            }
        }
    }

    /// Parse and enforce decision closure: every existing id exactly once
    /// with UPDATE/DELETE/NONE, unknown ids dropped, ADD ids always fresh.
    fn parse_reply(
        reply: &str,
        new_fact: &str,
        existing: &[ExistingMemory],
        id_map: &HashMap<String, String>,
    ) -> Option<UpdateDecision> {
        let raw: RawDecision = serde_json::from_str(unwrap_json_fence(reply)).ok()?;

        let mut entries: Vec<DecisionEntry> = Vec::new();
        let mut seen: HashMap<String, ()> = HashMap::new();

        for raw_entry in raw.memory {
            let event = MemoryEvent::parse_name(&raw_entry.event)?;
            match event {
                MemoryEvent::Add => {
                    let text = if raw_entry.text.trim().is_empty() {
                        new_fact.to_string()
                    } else {
                        raw_entry.text
                    };
                    entries.push(DecisionEntry {
                        id: Uuid::new_v4().to_string(),
                        text,
                        event,
                        old_memory: Option::None,
                    });
                }
                MemoryEvent::Update | MemoryEvent::Delete | MemoryEvent::None => {
                    let Some(real_id) = id_map.get(&raw_entry.id) else {
                        tracing::debug!(temp_id = %raw_entry.id, "decider referenced an unknown id, dropping entry");
                        continue;
                    };
                    if seen.insert(real_id.clone(), ()).is_some() {
                        continue;
                    }
                    let old = existing
                        .iter()
                        .find(|m| &m.id == real_id)
                        .map(|m| m.text.clone());
                    entries.push(DecisionEntry {
                        id: real_id.clone(),
                        text: raw_entry.text,
                        event,
                        old_memory: raw_entry.old_memory.or(old),
                    });
                }
            }
        }

        // Any existing memory the model forgot is untouched
        for mem in existing {
            if !seen.contains_key(&mem.id) {
                entries.push(DecisionEntry {
                    id: mem.id.clone(),
                    text: mem.text.clone(),
                    event: MemoryEvent::None,
                    old_memory: Option::None,
                });
            }
        }

        Some(UpdateDecision {
            entries,
            id_map: HashMap::new(),
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
