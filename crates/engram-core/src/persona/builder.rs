//! Persona Builder
//!
//! Aggregates behaviour pattern, emotion state, fragments, active plans and
//! explicit memory cards into a `UserPersona`, and renders the bounded
//! Markdown block for prompt injection. Truncation works on whole lines
//! against a token oracle - never blind character slicing.

use crate::memory::{Fragment, MemoryCard, MemoryVisibility};

use super::types::{
    BehaviorSummary, EmotionSnapshot, PlanSummary, ReminderSummary, UserPersona,
};

// ============================================================================
// TOKEN ORACLE
// ============================================================================

/// Counts tokens for the persona budget. The heuristic default is close
/// enough for budgeting; a real tokenizer can be plugged in.
pub trait TokenOracle: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// CJK-aware heuristic: each CJK codepoint is one token, runs of other
/// characters count roughly one token per four.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenOracle;

impl TokenOracle for HeuristicTokenOracle {
    fn count(&self, text: &str) -> usize {
        let mut tokens = 0usize;
        let mut ascii_run = 0usize;
        for ch in text.chars() {
            if is_cjk(ch) {
                tokens += 1 + ascii_run.div_ceil(4);
                ascii_run = 0;
            } else if ch.is_whitespace() {
                tokens += ascii_run.div_ceil(4);
                ascii_run = 0;
            } else {
                ascii_run += 1;
            }
        }
        tokens + ascii_run.div_ceil(4)
    }
}

fn is_cjk(ch: char) -> bool {
    matches!(ch,
        '\u{4E00}'..='\u{9FFF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{3000}'..='\u{303F}'
        | '\u{FF00}'..='\u{FFEF}'
    )
}

// ============================================================================
// BUILDER
// ============================================================================

/// Recent-fragment window inspected when no emotion snapshot is available
const FRAGMENT_MOOD_WINDOW: usize = 10;

/// Aggregates memory tiers into a persona and renders it
#[derive(Debug, Default)]
pub struct PersonaBuilder;

impl PersonaBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Aggregate every available signal into a persona. All inputs are
    /// optional; missing ones simply leave their section neutral.
    pub fn build_persona(
        &self,
        user_id: &str,
        fragments: &[Fragment],
        behavior: Option<&BehaviorSummary>,
        emotion: Option<&EmotionSnapshot>,
        plans: &[PlanSummary],
        reminders: &[ReminderSummary],
    ) -> UserPersona {
        let mut persona = UserPersona::new(user_id);

        // Identity and routine from the behaviour pattern
        if let Some(behavior) = behavior {
            persona.inferred_role = if behavior.inferred_role.is_empty() {
                "unknown".to_string()
            } else {
                behavior.inferred_role.clone()
            };
            persona.role_confidence = behavior.role_confidence;
            persona.last_behavior_analysis = behavior.updated_at;

            let mut routine_parts = Vec::new();
            if !behavior.routine_tasks.is_empty() {
                routine_parts.push("常规任务：".to_string());
                for task in behavior.routine_tasks.iter().take(3) {
                    routine_parts.push(format!("- {}（{}）", task.name, task.frequency));
                }
            }
            if let Some(start) = &behavior.work_start {
                routine_parts.push(format!(
                    "工作时间：{start} - {}",
                    behavior.work_end.as_deref().unwrap_or("未知")
                ));
            }
            persona.routine_overview = routine_parts.join("\n");

            if let Some(style) = &behavior.work_style {
                persona.work_style = format!(
                    "工作风格：{}，沟通偏好：{}，响应格式：{}",
                    style.work_style, style.communication_preference, style.response_format_preference
                );
                persona.response_format = match style.response_format_preference.as_str() {
                    "structured" => "structured".to_string(),
                    "detailed" => "detailed".to_string(),
                    _ => "concise".to_string(),
                };
            }
            if let Some(greeting) = behavior
                .stable_preferences
                .get("communication_style")
                .and_then(|v| v.as_str())
            {
                persona.greeting_style = greeting.to_string();
            }
        }

        // Current state from the emotion snapshot, with a fragment-derived
        // fallback over the most recent window
        if let Some(emotion) = emotion {
            persona.mood = emotion.current_mood.clone();
            persona.stress_level = emotion.stress_level;
            persona.support_flag = emotion.support_needed;
            persona.main_concerns = emotion.main_stressors.iter().take(3).cloned().collect();
            persona.last_emotion_analysis = Some(emotion.last_updated);
        } else if !fragments.is_empty() {
            let window: Vec<&Fragment> = fragments
                .iter()
                .rev()
                .take(FRAGMENT_MOOD_WINDOW)
                .collect();
            let stressed = window
                .iter()
                .filter(|f| {
                    f.emotion
                        .as_ref()
                        .map(|e| e.stress_level > 0.6)
                        .unwrap_or(false)
                })
                .count();
            if stressed * 10 > window.len() * 3 {
                persona.mood = "slightly_stressed".to_string();
                persona.stress_level = 0.6;
                persona.support_flag = true;
            }
        }

        // Plans: only current ones, at most 3
        persona.active_plans = plans
            .iter()
            .filter(|p| p.status == "active" || p.status == "at_risk")
            .take(3)
            .cloned()
            .collect();
        persona.upcoming_reminders = reminders.iter().take(2).cloned().collect();

        persona.source_fragments = fragments.len();

        if persona.stress_level > 0.7 || persona.support_flag {
            persona.emotional_support = true;
            persona.proactive_level = "high".to_string();
        }

        tracing::debug!(
            user_id,
            role = %persona.inferred_role,
            mood = %persona.mood,
            plans = persona.active_plans.len(),
            "persona built"
        );
        persona
    }

    /// Render the persona (plus up to 3 explicit cards) as the Markdown
    /// injection block, bounded by `max_tokens` per the oracle.
    ///
    /// Private cards never render. Truncation drops whole trailing lines
    /// until the oracle count fits the budget; returns `None` when nothing
    /// meaningful remains.
    pub fn render_prompt_section(
        &self,
        persona: &UserPersona,
        explicit_cards: &[MemoryCard],
        max_tokens: Option<usize>,
        oracle: &dyn TokenOracle,
    ) -> Option<String> {
        let mut lines: Vec<String> = vec!["## 用户洞察".to_string()];

        if persona.inferred_role != "unknown" {
            lines.push(format!(
                "**身份**: {}（置信度 {}%）",
                persona.inferred_role,
                (persona.role_confidence * 100.0) as u32
            ));
        }

        if !persona.routine_overview.is_empty() {
            lines.push("**工作规律**:".to_string());
            lines.extend(persona.routine_overview.lines().map(String::from));
        }

        if persona.mood != "neutral" || !persona.main_concerns.is_empty() {
            lines.push("**当前状态**:".to_string());
            if persona.mood != "neutral" {
                lines.push(format!("- 情绪: {}", persona.mood));
            }
            if !persona.main_concerns.is_empty() {
                lines.push(format!(
                    "- 关注: {}",
                    persona.main_concerns.iter().take(2).cloned().collect::<Vec<_>>().join(", ")
                ));
            }
        }

        if !persona.active_plans.is_empty() {
            lines.push("**活跃计划**:".to_string());
            for plan in persona.active_plans.iter().take(2) {
                let deadline = plan
                    .deadline
                    .map(|d| d.format("%m-%d").to_string())
                    .unwrap_or_else(|| "无截止".to_string());
                lines.push(format!(
                    "- {}（{}，进度 {}%）",
                    plan.title,
                    deadline,
                    (plan.progress * 100.0) as u32
                ));
                if let Some(blocker) = plan.blockers.first() {
                    lines.push(format!("  - 阻碍: {blocker}"));
                }
            }
        }

        if !persona.upcoming_reminders.is_empty() {
            lines.push("**近期提醒**:".to_string());
            for reminder in persona.upcoming_reminders.iter().take(2) {
                lines.push(format!(
                    "- {} {}",
                    reminder.time.format("%m-%d %H:%M"),
                    reminder.content
                ));
            }
        }

        let visible_cards: Vec<&MemoryCard> = explicit_cards
            .iter()
            .filter(|card| card.visibility != MemoryVisibility::Private)
            .take(3)
            .collect();
        if !visible_cards.is_empty() {
            lines.push("**用户记忆**:".to_string());
            for card in visible_cards {
                lines.push(format!("- {}", card.content));
            }
        }

        // Header alone means there was nothing to say
        if lines.len() <= 1 {
            return None;
        }

        if let Some(budget) = max_tokens {
            while lines.len() > 1 && oracle.count(&lines.join("\n")) > budget {
                lines.pop();
            }
            if lines.len() <= 1 {
                return None;
            }
        }

        Some(lines.join("\n"))
    }
}

// ============================================================================
// TESTS
// ============================================================================
