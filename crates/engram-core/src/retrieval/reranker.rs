//! Rerank Service
//!
//! Optional second-stage ordering between retrieval and formatting: recall
//! wide (e.g. 30 candidates), then let the model pick the best `top_k`.
//! Any LM or parse failure returns the first `top_k` unchanged - reranking
//! can only ever improve a reply, never block one.

use std::sync::Arc;

use serde::Deserialize;

use crate::extraction::unwrap_json_fence;
use crate::memory::RetrievedMemory;
use crate::providers::{ChatMessage, ChatRequest, LanguageModel};

/// Scores below this are dropped from the reranked list
const MIN_KEEP_SCORE: f32 = 5.0;

const RERANK_PROMPT: &str = r#"Rate how relevant each memory is to the query, on a 1-10 scale.

Output ONLY a JSON array: [{"index": <candidate index>, "score": <1-10>, "reason": "<short reason>"}], one entry per candidate, any order.
"#;

/// A memory with its rerank annotation. `rerank_score` is `None` when the
/// fallback path returned the candidate unscored.
#[derive(Debug, Clone)]
pub struct RerankedMemory {
    pub memory: RetrievedMemory,
    pub rerank_score: Option<f32>,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawScore {
    index: usize,
    score: f32,
    #[serde(default)]
    reason: String,
}

/// LM-backed reranker
pub struct RerankService {
    llm: Arc<dyn LanguageModel>,
    top_k: usize,
}

impl RerankService {
    pub fn new(llm: Arc<dyn LanguageModel>, top_k: usize) -> Self {
        Self { llm, top_k }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Rerank candidates against the query. Candidate sets already within
    /// `top_k` pass through untouched.
    pub async fn rerank(&self, query: &str, candidates: Vec<RetrievedMemory>) -> Vec<RerankedMemory> {
        if candidates.len() <= self.top_k {
            return pass_through(candidates, self.top_k);
        }

        let listing = candidates
            .iter()
            .enumerate()
            .map(|(index, m)| format!("{index}: {}", m.memory))
            .collect::<Vec<_>>()
            .join("\n");

        let request = ChatRequest {
            system: None,
            messages: vec![ChatMessage::user(format!(
                "{RERANK_PROMPT}\nQuery: {query}\n\nCandidates:\n{listing}"
            ))],
            temperature: Some(0.0),
            max_tokens: Some(1024),
        };

        let reply = match self.llm.create_message(request).await {
            Ok(response) => response.content,
            Err(e) => {
                tracing::warn!("rerank failed, keeping retrieval order: {e}");
                return pass_through(candidates, self.top_k);
            }
        };

        let Ok(scores) = serde_json::from_str::<Vec<RawScore>>(unwrap_json_fence(&reply)) else {
            tracing::warn!("rerank reply malformed, keeping retrieval order");
            return pass_through(candidates, self.top_k);
        };

        let mut scored: Vec<RerankedMemory> = scores
            .into_iter()
            .filter(|s| s.index < candidates.len())
            .filter(|s| s.score >= MIN_KEEP_SCORE)
            .map(|s| RerankedMemory {
                memory: candidates[s.index].clone(),
                rerank_score: Some(s.score.clamp(1.0, 10.0)),
                reason: (!s.reason.is_empty()).then_some(s.reason),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.rerank_score
                .partial_cmp(&a.rerank_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(self.top_k);
        scored
    }
}

fn pass_through(candidates: Vec<RetrievedMemory>, top_k: usize) -> Vec<RerankedMemory> {
    candidates
        .into_iter()
        .take(top_k)
        .map(|memory| RerankedMemory {
            memory,
            rerank_score: None,
            reason: None,
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryMetadata;
    use crate::providers::{ChatResponse, LlmError};
    use async_trait::async_trait;
    use chrono::Utc;

    struct Scripted(String);

    #[async_trait]
    impl LanguageModel for Scripted {
        async fn create_message(&self, _request: ChatRequest) -> Result<ChatResponse, LlmError> {
            Ok(ChatResponse {
                content: self.0.clone(),
            })
        }
    }

    struct Failing;

    #[async_trait]
    impl LanguageModel for Failing {
        async fn create_message(&self, _request: ChatRequest) -> Result<ChatResponse, LlmError> {
            Err(LlmError::Status {
                status: 500,
                body: "boom".into(),
            })
        }
    }

    fn memory(text: &str) -> RetrievedMemory {
        RetrievedMemory {
            id: uuid::Uuid::new_v4().to_string(),
            memory: text.to_string(),
            score: 0.5,
            user_id: "u1".to_string(),
            created_at: Some(Utc::now()),
            updated_at: None,
            metadata: MemoryMetadata::default(),
        }
    }

    #[tokio::test]
    async fn test_small_sets_pass_through() {
        let service = RerankService::new(Arc::new(Failing), 5);
        let reranked = service.rerank("q", vec![memory("a"), memory("b")]).await;
        assert_eq!(reranked.len(), 2);
        assert!(reranked.iter().all(|r| r.rerank_score.is_none()));
    }

    #[tokio::test]
    async fn test_rerank_orders_and_drops_low_scores() {
        let reply = r#"[
            {"index": 0, "score": 3, "reason": "off-topic"},
            {"index": 1, "score": 9, "reason": "direct answer"},
            {"index": 2, "score": 6, "reason": "related"}
        ]"#;
        let service = RerankService::new(Arc::new(Scripted(reply.to_string())), 2);
        let reranked = service
            .rerank("q", vec![memory("a"), memory("b"), memory("c")])
            .await;

        assert_eq!(reranked.len(), 2);
        assert_eq!(reranked[0].memory.memory, "b");
        assert_eq!(reranked[0].rerank_score, Some(9.0));
        assert_eq!(reranked[1].memory.memory, "c");
    }

    #[tokio::test]
    async fn test_lm_failure_keeps_first_top_k_unchanged() {
        let service = RerankService::new(Arc::new(Failing), 2);
        let reranked = service
            .rerank("q", vec![memory("a"), memory("b"), memory("c")])
            .await;
        assert_eq!(reranked.len(), 2);
        assert_eq!(reranked[0].memory.memory, "a");
        assert_eq!(reranked[1].memory.memory, "b");
    }

    #[tokio::test]
    async fn test_out_of_range_indices_dropped() {
        let reply = r#"[{"index": 99, "score": 9, "reason": "?"}, {"index": 0, "score": 7, "reason": "ok"}]"#;
        let service = RerankService::new(Arc::new(Scripted(reply.to_string())), 1);
        let reranked = service
            .rerank("q", vec![memory("a"), memory("b")])
            .await;
        assert_eq!(reranked.len(), 1);
        assert_eq!(reranked[0].memory.memory, "a");
    }
}
