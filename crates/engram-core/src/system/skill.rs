//! Skill Memory - loaded-skill registry
//!
//! Process-wide map of skill name to its path, description and metadata.
//! Cache only, no persistence.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One registered skill
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillEntry {
    pub name: String,
    pub path: String,
    pub description: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub loaded_at: DateTime<Utc>,
}

/// Registry of loaded skills
#[derive(Debug, Default)]
pub struct SkillMemory {
    skills: HashMap<String, SkillEntry>,
}

impl SkillMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_skill(
        &mut self,
        name: impl Into<String>,
        path: impl Into<String>,
        description: impl Into<String>,
        metadata: Map<String, Value>,
    ) {
        let name = name.into();
        self.skills.insert(
            name.clone(),
            SkillEntry {
                name: name.clone(),
                path: path.into(),
                description: description.into(),
                metadata,
                loaded_at: Utc::now(),
            },
        );
        tracing::debug!(skill = %name, "skill registered");
    }

    pub fn get_skill(&self, name: &str) -> Option<&SkillEntry> {
        self.skills.get(name)
    }

    pub fn has_skill(&self, name: &str) -> bool {
        self.skills.contains_key(name)
    }

    pub fn list_skills(&self) -> Vec<&str> {
        self.skills.keys().map(String::as_str).collect()
    }

    pub fn get_skill_path(&self, name: &str) -> Option<&str> {
        self.skills.get(name).map(|s| s.path.as_str())
    }

    pub fn unregister_skill(&mut self, name: &str) {
        self.skills.remove(name);
        tracing::debug!(skill = %name, "skill unregistered");
    }

    pub fn clear(&mut self) {
        self.skills.clear();
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }
}
