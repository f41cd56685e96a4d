//! Fragment - structured extraction from a single utterance
//!
//! One user message yields at most one fragment: a set of optional hint
//! slots, each with its own confidence, plus long-term memory candidates.

use chrono::{DateTime, Duration, Utc, Weekday};
use serde::{Deserialize, Serialize};

use super::record::{MemorySource, MemoryType, MemoryVisibility};

// ============================================================================
// TIME BUCKETS
// ============================================================================

/// Coarse slot of the day the message landed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeSlot {
    /// 06:00-12:00
    Morning,
    /// 12:00-18:00
    Afternoon,
    /// 18:00-22:00
    Evening,
    /// 22:00-06:00
    Night,
}

impl TimeSlot {
    /// Bucket an hour-of-day
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            6..=11 => TimeSlot::Morning,
            12..=17 => TimeSlot::Afternoon,
            18..=21 => TimeSlot::Evening,
            _ => TimeSlot::Night,
        }
    }
}

/// Day of week of the message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub fn from_weekday(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Mon => DayOfWeek::Monday,
            Weekday::Tue => DayOfWeek::Tuesday,
            Weekday::Wed => DayOfWeek::Wednesday,
            Weekday::Thu => DayOfWeek::Thursday,
            Weekday::Fri => DayOfWeek::Friday,
            Weekday::Sat => DayOfWeek::Saturday,
            Weekday::Sun => DayOfWeek::Sunday,
        }
    }
}

// ============================================================================
// HINT SLOTS
// ============================================================================

/// Task hint - what the user is working on
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskHint {
    pub content: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub confidence: f32,
}

/// Time-pattern hint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeHint {
    pub pattern: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inferred_schedule: Option<String>,
    #[serde(default)]
    pub confidence: f32,
}

/// Emotion hint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmotionHint {
    /// neutral / positive / stressed / frustrated
    pub signal: String,
    #[serde(default)]
    pub stress_level: f32,
    #[serde(default)]
    pub keywords_detected: Vec<String>,
    #[serde(default)]
    pub confidence: f32,
}

/// Relation hint - people mentioned
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelationHint {
    #[serde(default)]
    pub mentioned: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship_type: Option<String>,
    #[serde(default)]
    pub confidence: f32,
}

/// Todo hint, deadline resolved locally when the token is unambiguous
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TodoHint {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    /// Unresolved deadline text, kept when no local resolution applied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_text: Option<String>,
    #[serde(default = "TodoHint::default_priority")]
    pub priority: String,
    #[serde(default)]
    pub confidence: f32,
}

impl TodoHint {
    fn default_priority() -> String {
        "medium".to_string()
    }
}

/// Preference hint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreferenceHint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub communication_style: Option<String>,
    #[serde(default)]
    pub preferred_tools: Vec<String>,
    #[serde(default)]
    pub verbatim_preferences: Vec<String>,
    #[serde(default)]
    pub confidence: f32,
}

/// Topic / project hint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopicHint {
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub projects: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub confidence: f32,
}

/// Constraint / taboo hint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConstraintHint {
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub taboos: Vec<String>,
    #[serde(default)]
    pub confidence: f32,
}

/// Tool / platform hint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolHint {
    #[serde(default)]
    pub tools_mentioned: Vec<String>,
    #[serde(default)]
    pub platforms_mentioned: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_workflow: Option<String>,
    #[serde(default)]
    pub confidence: f32,
}

/// Goal / risk hint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoalHint {
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub blockers: Vec<String>,
    #[serde(default)]
    pub confidence: f32,
}

/// Identity hint, closed key set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityHint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub confidence: f32,
}

// ============================================================================
// LONG-TERM CANDIDATES
// ============================================================================

/// Category of a long-term memory candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LongTermCategory {
    Identity,
    Preference,
    Style,
    Fact,
    Tool,
}

/// Closed key set for identity `KEY: VALUE` entries
pub const IDENTITY_KEYS: &[&str] = &["name", "nickname", "role", "company", "location"];

/// One long-term memory candidate lifted out of a fragment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LongTermMemory {
    pub content: String,
    pub category: LongTermCategory,
}

impl LongTermMemory {
    /// Validate the strict identity format: `KEY: VALUE` with a closed key
    /// set. Non-identity categories always pass.
    pub fn is_well_formed(&self) -> bool {
        if self.category != LongTermCategory::Identity {
            return !self.content.trim().is_empty();
        }
        let Some((key, value)) = self.content.split_once(':') else {
            return false;
        };
        IDENTITY_KEYS.contains(&key.trim().to_lowercase().as_str())
            && !value.trim().is_empty()
    }
}

// ============================================================================
// FRAGMENT
// ============================================================================

/// Structured extraction from a single user utterance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fragment {
    pub id: String,
    pub user_id: String,
    pub session_id: String,

    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub time_slot: TimeSlot,
    pub day_of_week: DayOfWeek,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskHint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<TimeHint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotion: Option<EmotionHint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relation: Option<RelationHint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub todo: Option<TodoHint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preference: Option<PreferenceHint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<TopicHint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint: Option<ConstraintHint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<ToolHint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<GoalHint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentityHint>,

    /// Mean of present slot confidences, 0 when no slot is present
    pub confidence: f32,
    #[serde(default)]
    pub long_term_memories: Vec<LongTermMemory>,

    pub memory_type: MemoryType,
    pub source: MemorySource,
    pub visibility: MemoryVisibility,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_minutes: Option<i64>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Fragment {
    /// Build an empty fragment for a message: all slots unset, confidence 0
    pub fn empty(
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        use chrono::{Datelike, Timelike};
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            session_id: session_id.into(),
            message: message.into(),
            timestamp,
            time_slot: TimeSlot::from_hour(timestamp.hour()),
            day_of_week: DayOfWeek::from_weekday(timestamp.weekday()),
            task: None,
            time: None,
            emotion: None,
            relation: None,
            todo: None,
            preference: None,
            topic: None,
            constraint: None,
            tool: None,
            goal: None,
            identity: None,
            confidence: 0.0,
            long_term_memories: vec![],
            memory_type: MemoryType::Implicit,
            source: MemorySource::Conversation,
            visibility: MemoryVisibility::Public,
            ttl_minutes: None,
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    /// Recompute the overall confidence from the present slots
    pub fn recompute_confidence(&mut self) {
        let slots: [Option<f32>; 11] = [
            self.task.as_ref().map(|h| h.confidence),
            self.time.as_ref().map(|h| h.confidence),
            self.emotion.as_ref().map(|h| h.confidence),
            self.relation.as_ref().map(|h| h.confidence),
            self.todo.as_ref().map(|h| h.confidence),
            self.preference.as_ref().map(|h| h.confidence),
            self.topic.as_ref().map(|h| h.confidence),
            self.constraint.as_ref().map(|h| h.confidence),
            self.tool.as_ref().map(|h| h.confidence),
            self.goal.as_ref().map(|h| h.confidence),
            self.identity.as_ref().map(|h| h.confidence),
        ];
        let present: Vec<f32> = slots.into_iter().flatten().collect();
        self.confidence = if present.is_empty() {
            0.0
        } else {
            present.iter().sum::<f32>() / present.len() as f32
        };
    }

    /// Apply a TTL and stamp the expiry
    pub fn with_ttl(mut self, ttl_minutes: Option<i64>) -> Self {
        self.ttl_minutes = ttl_minutes;
        if let Some(ttl) = ttl_minutes {
            if ttl > 0 {
                self.expires_at = Some(self.created_at + Duration::minutes(ttl));
            }
        }
        self
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_time_slot_boundaries() {
        assert_eq!(TimeSlot::from_hour(6), TimeSlot::Morning);
        assert_eq!(TimeSlot::from_hour(11), TimeSlot::Morning);
        assert_eq!(TimeSlot::from_hour(12), TimeSlot::Afternoon);
        assert_eq!(TimeSlot::from_hour(18), TimeSlot::Evening);
        assert_eq!(TimeSlot::from_hour(22), TimeSlot::Night);
        assert_eq!(TimeSlot::from_hour(3), TimeSlot::Night);
    }

    #[test]
    fn test_confidence_is_mean_of_present_slots() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let mut fragment = Fragment::empty("u1", "s1", "明天交合同", ts);
        assert_eq!(fragment.confidence, 0.0);

        fragment.todo = Some(TodoHint {
            content: "交合同".into(),
            confidence: 0.8,
            ..Default::default()
        });
        fragment.emotion = Some(EmotionHint {
            signal: "stressed".into(),
            confidence: 0.4,
            ..Default::default()
        });
        fragment.recompute_confidence();
        assert!((fragment.confidence - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_identity_entries_require_closed_keys() {
        let ok = LongTermMemory {
            content: "nickname: 良哥".into(),
            category: LongTermCategory::Identity,
        };
        assert!(ok.is_well_formed());

        let bad_key = LongTermMemory {
            content: "age: 35".into(),
            category: LongTermCategory::Identity,
        };
        assert!(!bad_key.is_well_formed());

        let free_text = LongTermMemory {
            content: "the user is called 良哥 by friends".into(),
            category: LongTermCategory::Identity,
        };
        assert!(!free_text.is_well_formed());

        let non_identity = LongTermMemory {
            content: "prefers structured replies".into(),
            category: LongTermCategory::Preference,
        };
        assert!(non_identity.is_well_formed());
    }

    #[test]
    fn test_day_of_week_from_timestamp() {
        // 2026-03-02 is a Monday
        let ts = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let fragment = Fragment::empty("u1", "s1", "hi", ts);
        assert_eq!(fragment.day_of_week, DayOfWeek::Monday);
        assert_eq!(fragment.time_slot, TimeSlot::Morning);
    }
}
