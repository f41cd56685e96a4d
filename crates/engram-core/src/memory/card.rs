//! Memory Card - user-authored explicit memory
//!
//! A card materialises to exactly one store record with
//! `memory_type=explicit`, `source=user_card`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Map;

use super::record::{
    MemoryMetadata, MemorySource, MemoryType, MemoryVisibility, RetrievedMemory,
};

// ============================================================================
// CATEGORY
// ============================================================================

/// Memory card category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCardCategory {
    Preference,
    Fact,
    Context,
    Constraint,
    Relation,
    Goal,
    #[default]
    Other,
}

impl MemoryCardCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryCardCategory::Preference => "preference",
            MemoryCardCategory::Fact => "fact",
            MemoryCardCategory::Context => "context",
            MemoryCardCategory::Constraint => "constraint",
            MemoryCardCategory::Relation => "relation",
            MemoryCardCategory::Goal => "goal",
            MemoryCardCategory::Other => "other",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s {
            "preference" => MemoryCardCategory::Preference,
            "fact" => MemoryCardCategory::Fact,
            "context" => MemoryCardCategory::Context,
            "constraint" => MemoryCardCategory::Constraint,
            "relation" => MemoryCardCategory::Relation,
            "goal" => MemoryCardCategory::Goal,
            _ => MemoryCardCategory::Other,
        }
    }
}

impl std::fmt::Display for MemoryCardCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// CARD
// ============================================================================

/// A user-authored explicit memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryCard {
    pub id: String,
    pub user_id: String,
    pub content: String,
    #[serde(default)]
    pub category: MemoryCardCategory,
    #[serde(default = "MemoryCard::default_type")]
    pub memory_type: MemoryType,
    #[serde(default = "MemoryCard::default_source")]
    pub source: MemorySource,
    #[serde(default)]
    pub visibility: MemoryVisibility,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_minutes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl MemoryCard {
    fn default_type() -> MemoryType {
        MemoryType::Explicit
    }

    fn default_source() -> MemorySource {
        MemorySource::UserCard
    }

    /// Build a new card, stamping timestamps and TTL expiry
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        content: impl Into<String>,
        category: MemoryCardCategory,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            user_id: user_id.into(),
            content: content.into(),
            category,
            memory_type: MemoryType::Explicit,
            source: MemorySource::UserCard,
            visibility: MemoryVisibility::Public,
            ttl_minutes: None,
            title: None,
            tags: vec![],
            metadata: Map::new(),
            created_at: now,
            updated_at: now,
            expires_at: None,
        }
    }

    /// Apply a TTL and recompute the expiry against `created_at`
    pub fn with_ttl(mut self, ttl_minutes: Option<i64>) -> Self {
        self.ttl_minutes = ttl_minutes;
        self.expires_at = match ttl_minutes {
            Some(ttl) if ttl > 0 => Some(self.created_at + Duration::minutes(ttl)),
            _ => None,
        };
        self
    }

    /// Whether the card has passed its expiry
    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|t| Utc::now() > t).unwrap_or(false)
    }

    /// The metadata sub-document persisted alongside the card's record
    pub fn to_record_metadata(&self) -> MemoryMetadata {
        MemoryMetadata {
            memory_type: Some(self.memory_type),
            source: Some(self.source),
            visibility: Some(self.visibility),
            ttl_minutes: self.ttl_minutes,
            expires_at: self.expires_at,
            category: Some(self.category.as_str().to_string()),
            title: self.title.clone(),
            tags: self.tags.clone(),
            card_id: Some(self.id.clone()),
            extra: self.metadata.clone(),
        }
    }

    /// Rebuild a card from a retrieved explicit record.
    ///
    /// Returns `None` for records that are not explicit memories. The record
    /// id is kept in `metadata["store_id"]` so callers can resolve the
    /// underlying record for delete/update.
    pub fn from_retrieved(mem: &RetrievedMemory) -> Option<Self> {
        if mem.metadata.memory_type != Some(MemoryType::Explicit) {
            return None;
        }
        let created_at = mem.created_at.unwrap_or_else(Utc::now);
        let mut metadata = mem.metadata.extra.clone();
        metadata.insert(
            "store_id".to_string(),
            serde_json::Value::String(mem.id.clone()),
        );
        Some(Self {
            id: mem.metadata.card_id.clone().unwrap_or_else(|| mem.id.clone()),
            user_id: mem.user_id.clone(),
            content: mem.memory.clone(),
            category: mem
                .metadata
                .category
                .as_deref()
                .map(MemoryCardCategory::parse_name)
                .unwrap_or_default(),
            memory_type: mem.metadata.memory_type.unwrap_or(MemoryType::Explicit),
            source: mem.metadata.source.unwrap_or(MemorySource::UserCard),
            visibility: mem.metadata.visibility.unwrap_or_default(),
            ttl_minutes: mem.metadata.ttl_minutes,
            title: mem.metadata.title.clone(),
            tags: mem.metadata.tags.clone(),
            metadata,
            created_at,
            updated_at: mem.updated_at.unwrap_or(created_at),
            expires_at: mem.metadata.expires_at,
        })
    }

    /// The id of the underlying store record
    pub fn store_id(&self) -> &str {
        self.metadata
            .get("store_id")
            .and_then(|v| v.as_str())
            .unwrap_or(&self.id)
    }

    /// Compose the single message fed to the ingestion pipeline
    pub fn to_message_text(&self) -> String {
        let mut parts = Vec::new();
        if let Some(title) = &self.title {
            parts.push(format!("title: {title}"));
        }
        parts.push(self.content.clone());
        if !self.tags.is_empty() {
            parts.push(format!("tags: {}", self.tags.join(", ")));
        }
        parts.join("\n")
    }
}

// ============================================================================
// DRAFT
// ============================================================================

/// Input for creating a memory card through the manager
#[derive(Debug, Clone)]
pub struct CardDraft {
    pub content: String,
    pub category: MemoryCardCategory,
    pub title: Option<String>,
    pub tags: Vec<String>,
    pub visibility: MemoryVisibility,
    pub ttl_minutes: Option<i64>,
    pub metadata: Map<String, serde_json::Value>,
    /// Run the format pre-filter and decision stage
    pub check_sensitive: bool,
    /// Search for similar memories and let the decider rule on them
    pub check_conflicts: bool,
}

impl CardDraft {
    pub fn new(content: impl Into<String>, category: MemoryCardCategory) -> Self {
        Self {
            content: content.into(),
            category,
            title: None,
            tags: vec![],
            visibility: MemoryVisibility::Public,
            ttl_minutes: None,
            metadata: Map::new(),
            check_sensitive: true,
            check_conflicts: true,
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn visibility(mut self, visibility: MemoryVisibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn ttl_minutes(mut self, ttl: i64) -> Self {
        self.ttl_minutes = Some(ttl);
        self
    }

    pub fn skip_checks(mut self) -> Self {
        self.check_sensitive = false;
        self.check_conflicts = false;
        self
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_ttl_expiry() {
        let card = MemoryCard::new("c1", "u1", "喜欢深色主题", MemoryCardCategory::Preference)
            .with_ttl(Some(10));
        assert_eq!(
            card.expires_at,
            Some(card.created_at + Duration::minutes(10))
        );
        assert!(!card.is_expired());

        let no_ttl = MemoryCard::new("c2", "u1", "x", MemoryCardCategory::Other);
        assert!(no_ttl.expires_at.is_none());
        assert!(!no_ttl.is_expired());
    }

    #[test]
    fn test_record_metadata_carries_card_id() {
        let card = MemoryCard::new("card_1", "u1", "内容", MemoryCardCategory::Fact);
        let meta = card.to_record_metadata();
        assert_eq!(meta.card_id.as_deref(), Some("card_1"));
        assert_eq!(meta.memory_type, Some(MemoryType::Explicit));
        assert_eq!(meta.source, Some(MemorySource::UserCard));
        assert_eq!(meta.category.as_deref(), Some("fact"));
    }

    #[test]
    fn test_from_retrieved_rejects_non_explicit() {
        let mem = RetrievedMemory {
            id: "m1".into(),
            memory: "implicit fact".into(),
            score: 0.9,
            user_id: "u1".into(),
            created_at: Some(Utc::now()),
            updated_at: None,
            metadata: MemoryMetadata {
                memory_type: Some(MemoryType::Implicit),
                ..Default::default()
            },
        };
        assert!(MemoryCard::from_retrieved(&mem).is_none());
    }

    #[test]
    fn test_from_retrieved_keeps_store_id() {
        let mem = RetrievedMemory {
            id: "store-id-1".into(),
            memory: "称呼: 良哥".into(),
            score: 1.0,
            user_id: "u1".into(),
            created_at: Some(Utc::now()),
            updated_at: None,
            metadata: MemoryMetadata {
                memory_type: Some(MemoryType::Explicit),
                card_id: Some("card_xyz".into()),
                ..Default::default()
            },
        };
        let card = MemoryCard::from_retrieved(&mem).unwrap();
        assert_eq!(card.id, "card_xyz");
        assert_eq!(card.store_id(), "store-id-1");
    }
}
