//! Deterministic provider fakes
//!
//! `ConceptEmbedder` maps configured concept keywords onto fixed axes so
//! semantic similarity is fully controlled by the test: texts sharing
//! concepts land close together, concept-free texts land on their own hash
//! axis far from everything. `RoutedLm` answers each pipeline prompt kind
//! with a scripted reply.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use async_trait::async_trait;
use engram_core::providers::{
    ChatRequest, ChatResponse, Embedder, EmbeddingError, LanguageModel, LlmError,
};

// ============================================================================
// EMBEDDER
// ============================================================================

/// Concept-axis embedder with deterministic output
pub struct ConceptEmbedder {
    dimensions: usize,
    concepts: Vec<String>,
}

impl ConceptEmbedder {
    /// `concepts` each claim one axis; everything else shares the hash
    /// axes after them.
    pub fn new(dimensions: usize, concepts: &[&str]) -> Self {
        assert!(dimensions > concepts.len() + 1);
        Self {
            dimensions,
            concepts: concepts.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let mut any_concept = false;
        for (axis, concept) in self.concepts.iter().enumerate() {
            let count = text.matches(concept.as_str()).count();
            if count > 0 {
                vector[axis] = count as f32;
                any_concept = true;
            }
        }
        if !any_concept {
            // Unique direction per unknown text: orthogonal to every
            // concept axis and (almost surely) to other unknown texts
            let mut hasher = DefaultHasher::new();
            text.hash(&mut hasher);
            let span = self.dimensions - self.concepts.len();
            let axis = self.concepts.len() + (hasher.finish() as usize % span);
            vector[axis] = 1.0;
            return vector;
        }
        // Normalise so shared-concept texts are close regardless of counts
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for ConceptEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.vectorize(text))
    }
}

/// Embedder that always fails, for degradation scenarios
pub struct BrokenEmbedder(pub usize);

#[async_trait]
impl Embedder for BrokenEmbedder {
    fn dimensions(&self) -> usize {
        self.0
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Malformed("broken on purpose".into()))
    }
}

// ============================================================================
// LANGUAGE MODEL
// ============================================================================

/// Routes each pipeline prompt kind to a scripted reply.
///
/// Routing keys off stable phrases in the prompts: fact extraction, update
/// decision, rerank. Unset routes report a malformed reply, which every
/// call site treats as its safe fallback.
#[derive(Default)]
pub struct RoutedLm {
    facts_reply: Mutex<Option<String>>,
    decision_reply: Mutex<Option<String>>,
    rerank_reply: Mutex<Option<String>>,
    pub calls: Mutex<Vec<String>>,
}

impl RoutedLm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the fact-extraction reply (a JSON string array)
    pub fn with_facts(self, reply: &str) -> Self {
        *self.facts_reply.lock().unwrap() = Some(reply.to_string());
        self
    }

    /// Script the update-decision reply (`{"memory": [...]}`)
    pub fn with_decision(self, reply: &str) -> Self {
        *self.decision_reply.lock().unwrap() = Some(reply.to_string());
        self
    }

    /// Script the rerank reply (a JSON score array)
    pub fn with_rerank(self, reply: &str) -> Self {
        *self.rerank_reply.lock().unwrap() = Some(reply.to_string());
        self
    }

    /// Replace the decision reply mid-test
    pub fn set_decision(&self, reply: &str) {
        *self.decision_reply.lock().unwrap() = Some(reply.to_string());
    }

    /// Replace the facts reply mid-test
    pub fn set_facts(&self, reply: &str) {
        *self.facts_reply.lock().unwrap() = Some(reply.to_string());
    }
}

#[async_trait]
impl LanguageModel for RoutedLm {
    async fn create_message(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let prompt = request
            .messages
            .first()
            .map(|m| m.content.clone())
            .unwrap_or_default();

        let route = if prompt.contains("extract durable personal facts") {
            "facts"
        } else if prompt.contains("memory update controller") {
            "decision"
        } else if prompt.contains("Rate how relevant each memory") {
            "rerank"
        } else {
            "unknown"
        };
        self.calls.lock().unwrap().push(route.to_string());

        let reply = match route {
            "facts" => self.facts_reply.lock().unwrap().clone(),
            "decision" => self.decision_reply.lock().unwrap().clone(),
            "rerank" => self.rerank_reply.lock().unwrap().clone(),
            _ => None,
        };
        match reply {
            Some(content) => Ok(ChatResponse { content }),
            None => Err(LlmError::Malformed(format!("no scripted reply for {route}"))),
        }
    }
}
