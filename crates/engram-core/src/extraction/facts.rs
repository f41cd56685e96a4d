//! Fact Extractor
//!
//! Distils a conversation turn into short declarative facts worth keeping.
//! Pure function over the messages: one LM call, a JSON list of strings
//! back. Anything malformed degrades to an empty list - ingestion must
//! never fail a turn because extraction did.

use std::sync::Arc;

use crate::providers::{ChatMessage, ChatRequest, LanguageModel};

use super::unwrap_json_fence;

/// Prompt contract for fact extraction.
///
/// The rules the model must follow: numerics stay verbatim, person + role +
/// organisation stay fused in one fact, relative times become absolute, and
/// only personalisation-relevant facts come back.
pub const FACT_EXTRACTION_PROMPT: &str = r#"You extract durable personal facts from a conversation for long-term memory.

Rules:
1. Output ONLY a JSON array of short declarative statements, nothing else.
2. Preserve every numeric value (amounts, percentages, counts) verbatim - "合同金额 150 万" must keep "150 万".
3. Keep person + role + organisation together as ONE fact ("张三是 ACME 的 CTO"), never split them.
4. Resolve relative times to absolute dates where the conversation allows it ("明天" -> the concrete date).
5. Only emit facts useful for personalising future conversations: identity, preferences, relationships, commitments, ongoing work. Skip greetings, meta-chatter and one-off trivia.
6. Emit an empty array [] when nothing qualifies.

Conversation:
"#;

/// Extracts atomic declarative facts from a conversation turn
pub struct FactExtractor {
    llm: Arc<dyn LanguageModel>,
}

impl FactExtractor {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    /// Run extraction over the turn. LM or parse failure yields an empty
    /// list; both are logged, neither propagates.
    pub async fn extract(&self, messages: &[ChatMessage]) -> Vec<String> {
        if messages.is_empty() {
            return vec![];
        }

        let transcript = messages
            .iter()
            .map(|m| format!("{}: {}", m.role.as_str(), m.content))
            .collect::<Vec<_>>()
            .join("\n");

        let request = ChatRequest {
            system: None,
            messages: vec![ChatMessage::user(format!(
                "{FACT_EXTRACTION_PROMPT}{transcript}"
            ))],
            temperature: Some(0.0),
            max_tokens: Some(1024),
        };

        let reply = match self.llm.create_message(request).await {
            Ok(response) => response.content,
            Err(e) => {
                tracing::warn!("fact extraction failed, keeping turn without facts: {e}");
                return vec![];
            }
        };

        Self::parse_reply(&reply)
    }

    fn parse_reply(reply: &str) -> Vec<String> {
        let body = unwrap_json_fence(reply);
        match serde_json::from_str::<Vec<String>>(body) {
            Ok(facts) => facts
                .into_iter()
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect(),
            Err(e) => {
                tracing::debug!("fact extraction reply was not a JSON string array: {e}");
                vec![]
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
