//! Persona data shapes
//!
//! `UserPersona` is the aggregated projection; `BehaviorSummary` and
//! `EmotionSnapshot` are the input shapes produced by the (external)
//! behaviour and emotion analysers.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// ANALYSER INPUT SHAPES
// ============================================================================

/// One recurring task in the user's routine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutineTask {
    pub name: String,
    /// daily / weekly / monthly / ad_hoc
    pub frequency: String,
}

/// Work-style signals
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkStyleSummary {
    /// structured / flexible / deadline_driven
    #[serde(default)]
    pub work_style: String,
    /// async / sync / mixed
    #[serde(default)]
    pub communication_preference: String,
    /// detailed / concise / structured
    #[serde(default)]
    pub response_format_preference: String,
}

/// Aggregated behaviour pattern handed in by the behaviour analyser
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BehaviorSummary {
    #[serde(default)]
    pub inferred_role: String,
    #[serde(default)]
    pub role_confidence: f32,
    #[serde(default)]
    pub routine_tasks: Vec<RoutineTask>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_end: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_style: Option<WorkStyleSummary>,
    /// Preferences stable across observations, key -> value
    #[serde(default)]
    pub stable_preferences: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Current emotional state handed in by the emotion analyser
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionSnapshot {
    /// neutral / positive / slightly_stressed / stressed / frustrated
    pub current_mood: String,
    pub stress_level: f32,
    pub support_needed: bool,
    #[serde(default)]
    pub main_stressors: Vec<String>,
    pub last_updated: DateTime<Utc>,
}

// ============================================================================
// PLAN / REMINDER SUMMARIES
// ============================================================================

/// Plan summary line for persona rendering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSummary {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    /// 0.0 - 1.0
    pub progress: f32,
    /// active / at_risk / completed
    pub status: String,
    #[serde(default)]
    pub blockers: Vec<String>,
}

/// Upcoming reminder line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderSummary {
    pub time: DateTime<Utc>,
    pub content: String,
    /// deadline / blocker / checkpoint
    pub kind: String,
}

// ============================================================================
// PERSONA
// ============================================================================

/// Aggregated, bounded projection of the user's durable memory state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPersona {
    pub user_id: String,
    pub generated_at: DateTime<Utc>,

    // Identity
    pub inferred_role: String,
    pub role_confidence: f32,
    pub work_domain: String,

    // Behaviour
    pub routine_overview: String,
    pub work_style: String,

    // Current state
    pub mood: String,
    pub stress_level: f32,
    #[serde(default)]
    pub main_concerns: Vec<String>,
    pub support_flag: bool,

    // Plans and reminders
    #[serde(default)]
    pub active_plans: Vec<PlanSummary>,
    #[serde(default)]
    pub upcoming_reminders: Vec<ReminderSummary>,

    // Personalisation knobs
    pub greeting_style: String,
    pub response_format: String,
    pub proactive_level: String,
    pub emotional_support: bool,

    // Provenance
    pub source_fragments: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_behavior_analysis: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_emotion_analysis: Option<DateTime<Utc>>,

    // Cache discipline
    pub ttl_minutes: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl UserPersona {
    /// Fresh neutral persona with the standard 60-minute cache TTL
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        let ttl_minutes = 60;
        Self {
            user_id: user_id.into(),
            generated_at: now,
            inferred_role: "unknown".to_string(),
            role_confidence: 0.0,
            work_domain: "general".to_string(),
            routine_overview: String::new(),
            work_style: String::new(),
            mood: "neutral".to_string(),
            stress_level: 0.0,
            main_concerns: vec![],
            support_flag: false,
            active_plans: vec![],
            upcoming_reminders: vec![],
            greeting_style: "professional".to_string(),
            response_format: "structured".to_string(),
            proactive_level: "medium".to_string(),
            emotional_support: true,
            source_fragments: 0,
            last_behavior_analysis: None,
            last_emotion_analysis: None,
            ttl_minutes,
            expires_at: Some(now + Duration::minutes(ttl_minutes)),
        }
    }

    /// Whether this cached persona should be rebuilt
    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|t| Utc::now() > t).unwrap_or(false)
    }
}
