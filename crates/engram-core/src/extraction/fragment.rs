//! Fragment Extractor
//!
//! One user utterance in, one structured fragment out: 11 optional hint
//! slots with per-slot confidence, plus long-term memory candidates.
//! Deadline tokens are resolved locally - the model reports the text it
//! saw, resolution to an absolute timestamp happens here where the message
//! timestamp is known.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc, Weekday};
use serde::Deserialize;

use crate::memory::{
    ConstraintHint, EmotionHint, Fragment, GoalHint, IdentityHint, LongTermCategory,
    LongTermMemory, PreferenceHint, RelationHint, TaskHint, TimeHint, TodoHint, ToolHint, TopicHint,
};
use crate::providers::{ChatMessage, ChatRequest, LanguageModel};

use super::unwrap_json_fence;

const FRAGMENT_PROMPT: &str = r#"You analyse ONE user message and extract structured hints for a personal-memory system.

Output ONLY a JSON object with these optional keys (omit a key when the message carries no signal for it); every present hint MUST include "confidence" between 0 and 1:

- "task": {"content", "category", "confidence"}
- "time": {"pattern", "inferred_schedule", "confidence"}
- "emotion": {"signal": "neutral|positive|stressed|frustrated", "stress_level", "keywords_detected": [], "confidence"}
- "relation": {"mentioned": [], "relationship_type", "confidence"}
- "todo": {"content", "deadline_text", "priority": "low|medium|high", "confidence"}
- "preference": {"response_format", "communication_style", "preferred_tools": [], "verbatim_preferences": [], "confidence"}
- "topic": {"topics": [], "projects": [], "keywords": [], "confidence"}
- "constraint": {"constraints": [], "taboos": [], "confidence"}
- "tool": {"tools_mentioned": [], "platforms_mentioned": [], "preferred_workflow", "confidence"}
- "goal": {"goals": [], "risks": [], "blockers": [], "confidence"}
- "identity": {"name", "nickname", "role", "company", "location", "confidence"}

Plus "long_term_memories": a list of {"content", "category"} worth keeping forever, category one of identity|preference|style|fact|tool. Identity entries MUST be "KEY: VALUE" where KEY is one of name, nickname, role, company, location - free-text identity strings are forbidden.

For "deadline_text" copy the deadline phrase verbatim ("明天", "下周三", "next friday"); do NOT compute dates yourself.

User message:
"#;

/// Raw reply shape; slots land on the typed hint structs directly
#[derive(Debug, Default, Deserialize)]
struct FragmentReply {
    task: Option<TaskHint>,
    time: Option<TimeHint>,
    emotion: Option<EmotionHint>,
    relation: Option<RelationHint>,
    todo: Option<TodoHint>,
    preference: Option<PreferenceHint>,
    topic: Option<TopicHint>,
    constraint: Option<ConstraintHint>,
    tool: Option<ToolHint>,
    goal: Option<GoalHint>,
    identity: Option<IdentityHint>,
    #[serde(default)]
    long_term_memories: Vec<RawLongTerm>,
}

#[derive(Debug, Deserialize)]
struct RawLongTerm {
    content: String,
    category: String,
}

/// Extracts a structured fragment from a single user utterance
pub struct FragmentExtractor {
    llm: Arc<dyn LanguageModel>,
}

impl FragmentExtractor {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    /// Extract hints from one message. LM failure yields the empty fragment
    /// (no hints, confidence 0) rather than an error.
    pub async fn extract(
        &self,
        user_id: &str,
        session_id: &str,
        message: &str,
        timestamp: DateTime<Utc>,
    ) -> Fragment {
        let mut fragment = Fragment::empty(user_id, session_id, message, timestamp);

        let request = ChatRequest {
            system: None,
            messages: vec![ChatMessage::user(format!("{FRAGMENT_PROMPT}{message}"))],
            temperature: Some(0.0),
            max_tokens: Some(1024),
        };

        let reply = match self.llm.create_message(request).await {
            Ok(response) => response.content,
            Err(e) => {
                tracing::warn!("fragment extraction failed, keeping empty fragment: {e}");
                return fragment;
            }
        };

        let parsed: FragmentReply = match serde_json::from_str(unwrap_json_fence(&reply)) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!("fragment reply did not parse: {e}");
                return fragment;
            }
        };

        fragment.task = parsed.task;
        fragment.time = parsed.time;
        fragment.emotion = parsed.emotion;
        fragment.relation = parsed.relation;
        fragment.todo = parsed.todo.map(|mut todo| {
            if let Some(text) = &todo.deadline_text {
                todo.deadline = resolve_deadline(text, timestamp);
            }
            todo
        });
        fragment.preference = parsed.preference;
        fragment.topic = parsed.topic;
        fragment.constraint = parsed.constraint;
        fragment.tool = parsed.tool;
        fragment.goal = parsed.goal;
        fragment.identity = parsed.identity;

        fragment.long_term_memories = parsed
            .long_term_memories
            .into_iter()
            .filter_map(|raw| {
                let category = match raw.category.as_str() {
                    "identity" => LongTermCategory::Identity,
                    "preference" => LongTermCategory::Preference,
                    "style" => LongTermCategory::Style,
                    "fact" => LongTermCategory::Fact,
                    "tool" => LongTermCategory::Tool,
                    other => {
                        tracing::debug!("dropping long-term candidate with category '{other}'");
                        return None;
                    }
                };
                let candidate = LongTermMemory {
                    content: raw.content,
                    category,
                };
                candidate.is_well_formed().then_some(candidate)
            })
            .collect();

        fragment.recompute_confidence();
        fragment
    }
}

// ============================================================================
// DEADLINE RESOLUTION
// ============================================================================

/// Resolve a deadline token to an absolute timestamp where the token is
/// unambiguous; ambiguous or unknown text stays unresolved.
///
/// Resolved deadlines land on 18:00 of the target day.
pub fn resolve_deadline(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let token = text.trim().to_lowercase();

    let day_offset = match token.as_str() {
        "今天" | "today" | "tonight" | "今晚" => Some(0),
        "明天" | "tomorrow" => Some(1),
        "后天" => Some(2),
        _ => None,
    };
    if let Some(offset) = day_offset {
        return at_end_of_day(now + Duration::days(offset));
    }

    // 下周X / next <weekday>: the named day of the NEXT calendar week
    let weekday = zh_weekday(&token).or_else(|| en_next_weekday(&token))?;
    let days_until_next_monday = 7 - now.weekday().num_days_from_monday() as i64;
    let offset = days_until_next_monday + weekday.num_days_from_monday() as i64;
    at_end_of_day(now + Duration::days(offset))
}

fn zh_weekday(token: &str) -> Option<Weekday> {
    let rest = token
        .strip_prefix("下周")
        .or_else(|| token.strip_prefix("下星期"))?;
    match rest {
        "一" => Some(Weekday::Mon),
        "二" => Some(Weekday::Tue),
        "三" => Some(Weekday::Wed),
        "四" => Some(Weekday::Thu),
        "五" => Some(Weekday::Fri),
        "六" => Some(Weekday::Sat),
        "日" | "天" => Some(Weekday::Sun),
        _ => None,
    }
}

fn en_next_weekday(token: &str) -> Option<Weekday> {
    let rest = token.strip_prefix("next ")?;
    match rest {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

fn at_end_of_day(day: DateTime<Utc>) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(day.year(), day.month(), day.day(), 18, 0, 0)
        .single()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ChatResponse, LlmError};
    use async_trait::async_trait;

    struct Scripted(String);

    #[async_trait]
    impl LanguageModel for Scripted {
        async fn create_message(&self, _request: ChatRequest) -> Result<ChatResponse, LlmError> {
            Ok(ChatResponse {
                content: self.0.clone(),
            })
        }
    }

    #[test]
    fn test_resolve_unambiguous_tokens() {
        // 2026-03-02 is a Monday
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 0).unwrap();

        let tomorrow = resolve_deadline("明天", now).unwrap();
        assert_eq!(tomorrow, Utc.with_ymd_and_hms(2026, 3, 3, 18, 0, 0).unwrap());

        let day_after = resolve_deadline("后天", now).unwrap();
        assert_eq!(day_after, Utc.with_ymd_and_hms(2026, 3, 4, 18, 0, 0).unwrap());

        // 下周三 from Monday 03-02 -> Wednesday of next week, 03-11
        let next_wed = resolve_deadline("下周三", now).unwrap();
        assert_eq!(next_wed, Utc.with_ymd_and_hms(2026, 3, 11, 18, 0, 0).unwrap());

        let next_friday = resolve_deadline("next friday", now).unwrap();
        assert_eq!(
            next_friday,
            Utc.with_ymd_and_hms(2026, 3, 13, 18, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_ambiguous_tokens_stay_unresolved() {
        let now = Utc::now();
        assert!(resolve_deadline("过几天", now).is_none());
        assert!(resolve_deadline("soon", now).is_none());
        assert!(resolve_deadline("月底之前吧", now).is_none());
    }

    #[tokio::test]
    async fn test_extract_parses_slots_and_resolves_deadline() {
        let reply = serde_json::json!({
            "todo": {"content": "交合同终稿", "deadline_text": "明天", "priority": "high", "confidence": 0.9},
            "emotion": {"signal": "stressed", "stress_level": 0.7, "keywords_detected": ["赶"], "confidence": 0.5},
            "long_term_memories": [
                {"content": "nickname: 良哥", "category": "identity"},
                {"content": "the user seems nice", "category": "identity"},
                {"content": "prefers structured replies", "category": "preference"}
            ]
        });
        let extractor = FragmentExtractor::new(std::sync::Arc::new(Scripted(reply.to_string())));

        let ts = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let fragment = extractor.extract("u1", "s1", "明天要赶着交合同终稿", ts).await;

        let todo = fragment.todo.as_ref().unwrap();
        assert_eq!(
            todo.deadline,
            Some(Utc.with_ymd_and_hms(2026, 3, 3, 18, 0, 0).unwrap())
        );
        assert_eq!(todo.priority, "high");

        // mean of 0.9 and 0.5
        assert!((fragment.confidence - 0.7).abs() < 1e-6);

        // free-text identity entry was rejected, the other two kept
        assert_eq!(fragment.long_term_memories.len(), 2);
        assert!(fragment
            .long_term_memories
            .iter()
            .all(LongTermMemory::is_well_formed));
    }

    #[tokio::test]
    async fn test_malformed_reply_yields_empty_fragment() {
        let extractor =
            FragmentExtractor::new(std::sync::Arc::new(Scripted("no json here".to_string())));
        let fragment = extractor.extract("u1", "s1", "hello", Utc::now()).await;
        assert!(fragment.task.is_none());
        assert_eq!(fragment.confidence, 0.0);
        assert!(fragment.long_term_memories.is_empty());
    }
}
