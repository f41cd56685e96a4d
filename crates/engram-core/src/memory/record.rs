//! Memory Record - the persisted primary entity
//!
//! A record is `(id, embedding, payload)`. The store treats the payload as an
//! opaque JSON document; the typed view lives here: the textual memory, the
//! owning user, timestamps, and a metadata sub-document carrying type /
//! source / visibility / TTL discipline.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// CLASSIFICATION ENUMS
// ============================================================================

/// How a memory was formed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// User-authored memory card
    Explicit,
    /// Automatically extracted from conversation
    #[default]
    Implicit,
    /// Aggregated behaviour pattern
    Behavior,
    /// Emotional state
    Emotion,
    /// User preference
    Preference,
}

impl MemoryType {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Explicit => "explicit",
            MemoryType::Implicit => "implicit",
            MemoryType::Behavior => "behavior",
            MemoryType::Emotion => "emotion",
            MemoryType::Preference => "preference",
        }
    }

    /// Parse from string name
    pub fn parse_name(s: &str) -> Self {
        match s {
            "explicit" => MemoryType::Explicit,
            "behavior" => MemoryType::Behavior,
            "emotion" => MemoryType::Emotion,
            "preference" => MemoryType::Preference,
            _ => MemoryType::Implicit,
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a memory came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemorySource {
    /// User memory card
    UserCard,
    /// Extracted from conversation
    #[default]
    Conversation,
    /// Behaviour analysis output
    BehaviorAnalysis,
    /// Emotion analysis output
    EmotionAnalysis,
    /// System inference
    SystemInference,
    /// Direct remember() write from an embedding instance
    InstanceRemember,
}

impl MemorySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemorySource::UserCard => "user_card",
            MemorySource::Conversation => "conversation",
            MemorySource::BehaviorAnalysis => "behavior_analysis",
            MemorySource::EmotionAnalysis => "emotion_analysis",
            MemorySource::SystemInference => "system_inference",
            MemorySource::InstanceRemember => "instance_remember",
        }
    }
}

/// Whether a memory may be injected into prompts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemoryVisibility {
    /// Fully visible, eligible for prompt injection
    #[default]
    Public,
    /// Stored but never injected
    Private,
    /// Visible after sensitive content was filtered
    Filtered,
}

impl MemoryVisibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryVisibility::Public => "public",
            MemoryVisibility::Private => "private",
            MemoryVisibility::Filtered => "filtered",
        }
    }
}

// ============================================================================
// METADATA SUB-DOCUMENT
// ============================================================================

/// Metadata sub-document attached to every payload
///
/// All fields optional and opaque to the store. Unknown keys survive a
/// round-trip through `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_type: Option<MemoryType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<MemorySource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<MemoryVisibility>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_minutes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MemoryMetadata {
    /// Stamp `expires_at = created_at + ttl_minutes` when a TTL is present
    /// and no expiry has been materialised yet
    pub fn stamp_expiry(&mut self, created_at: DateTime<Utc>) {
        if self.expires_at.is_some() {
            return;
        }
        if let Some(ttl) = self.ttl_minutes {
            if ttl > 0 {
                self.expires_at = Some(created_at + Duration::minutes(ttl));
            }
        }
    }

    /// Whether this entry carries an expiry that has already passed
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|t| now > t).unwrap_or(false)
    }
}

// ============================================================================
// PAYLOAD
// ============================================================================

/// Typed view of the JSON payload stored next to each embedding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryPayload {
    /// The textual memory
    #[serde(alias = "data")]
    pub memory: String,
    /// Owning user
    pub user_id: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last rewrite time, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Metadata sub-document
    #[serde(default)]
    pub metadata: MemoryMetadata,
}

impl MemoryPayload {
    /// Build a payload stamped with the current time
    pub fn new(memory: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            memory: memory.into(),
            user_id: user_id.into(),
            created_at: Utc::now(),
            updated_at: None,
            metadata: MemoryMetadata::default(),
        }
    }

    /// Attach metadata, stamping its expiry against `created_at`
    pub fn with_metadata(mut self, mut metadata: MemoryMetadata) -> Self {
        metadata.stamp_expiry(self.created_at);
        self.metadata = metadata;
        self
    }

    /// Serialise to the opaque JSON document the store persists
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Parse the opaque JSON document back, tolerating unknown keys
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

// ============================================================================
// RETRIEVAL SHAPE
// ============================================================================

/// A memory as returned from search / listing, with its relevance score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedMemory {
    pub id: String,
    pub memory: String,
    pub score: f32,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: MemoryMetadata,
}

impl RetrievedMemory {
    /// Build from a raw store hit. Returns `None` when the payload does not
    /// parse as a memory payload.
    pub fn from_payload(id: impl Into<String>, score: f32, payload: &Value) -> Option<Self> {
        let parsed = MemoryPayload::from_value(payload)?;
        Some(Self {
            id: id.into(),
            memory: parsed.memory,
            score,
            user_id: parsed.user_id,
            created_at: Some(parsed.created_at),
            updated_at: parsed.updated_at,
            metadata: parsed.metadata,
        })
    }

    /// Whether the record carries an expiry that has already passed
    pub fn is_expired(&self) -> bool {
        self.metadata.is_expired_at(Utc::now())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_type_roundtrip() {
        for ty in [
            MemoryType::Explicit,
            MemoryType::Implicit,
            MemoryType::Behavior,
            MemoryType::Emotion,
            MemoryType::Preference,
        ] {
            assert_eq!(MemoryType::parse_name(ty.as_str()), ty);
        }
        assert_eq!(MemoryType::parse_name("garbage"), MemoryType::Implicit);
    }

    #[test]
    fn test_expiry_stamp() {
        let created = Utc::now();
        let mut meta = MemoryMetadata {
            ttl_minutes: Some(30),
            ..Default::default()
        };
        meta.stamp_expiry(created);
        assert_eq!(meta.expires_at, Some(created + Duration::minutes(30)));
        assert!(!meta.is_expired_at(created + Duration::minutes(29)));
        assert!(meta.is_expired_at(created + Duration::minutes(31)));
    }

    #[test]
    fn test_payload_roundtrip_tolerates_extra_keys() {
        let payload = MemoryPayload::new("用户偏好结构化输出", "user_1").with_metadata(
            MemoryMetadata {
                memory_type: Some(MemoryType::Explicit),
                tags: vec!["style".into()],
                ..Default::default()
            },
        );
        let mut value = payload.to_value();
        value["metadata"]["custom_key"] = Value::String("kept".into());

        let parsed = MemoryPayload::from_value(&value).unwrap();
        assert_eq!(parsed.memory, "用户偏好结构化输出");
        assert_eq!(parsed.metadata.memory_type, Some(MemoryType::Explicit));
        assert_eq!(
            parsed.metadata.extra.get("custom_key"),
            Some(&Value::String("kept".into()))
        );
    }

    #[test]
    fn test_payload_accepts_data_alias() {
        let value = serde_json::json!({
            "data": "aliased text",
            "user_id": "u",
            "created_at": Utc::now().to_rfc3339(),
        });
        let parsed = MemoryPayload::from_value(&value).unwrap();
        assert_eq!(parsed.memory, "aliased text");
    }
}
