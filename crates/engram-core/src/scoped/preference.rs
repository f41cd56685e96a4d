//! Preference Memory - per-user key/value preferences
//!
//! `key -> {value, updated_at}`, one JSON file per user.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{write_json_atomic, Result};

/// One stored preference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferenceEntry {
    pub value: Value,
    pub updated_at: DateTime<Utc>,
}

/// Per-user preference store
pub struct PreferenceMemory {
    user_id: Option<String>,
    path: Option<PathBuf>,
    preferences: BTreeMap<String, PreferenceEntry>,
    initialized: bool,
}

impl PreferenceMemory {
    pub fn new(user_id: Option<&str>, storage_dir: Option<&std::path::Path>) -> Self {
        let path = storage_dir.map(|dir| match user_id {
            Some(uid) => dir.join("users").join(uid).join("preference.json"),
            None => dir.join("preference.json"),
        });
        Self {
            user_id: user_id.map(String::from),
            path,
            preferences: BTreeMap::new(),
            initialized: false,
        }
    }

    /// Load the persisted file, if any. Must run before the first read.
    pub async fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        if let Some(path) = &self.path {
            if tokio::fs::try_exists(path).await.unwrap_or(false) {
                match tokio::fs::read_to_string(path).await {
                    Ok(content) => match serde_json::from_str(&content) {
                        Ok(prefs) => self.preferences = prefs,
                        Err(e) => {
                            tracing::warn!("preference file did not parse, starting empty: {e}")
                        }
                    },
                    Err(e) => tracing::warn!("preference file unreadable, starting empty: {e}"),
                }
            }
        }
        self.initialized = true;
        tracing::debug!(user_id = ?self.user_id, "preference memory initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Set one preference and persist
    pub async fn set_preference(&mut self, key: impl Into<String>, value: Value) {
        self.preferences.insert(
            key.into(),
            PreferenceEntry {
                value,
                updated_at: Utc::now(),
            },
        );
        self.save().await;
    }

    pub fn get_preference(&self, key: &str) -> Option<&Value> {
        self.preferences.get(key).map(|entry| &entry.value)
    }

    /// All preferences, values only
    pub fn get_all_preferences(&self) -> BTreeMap<String, Value> {
        self.preferences
            .iter()
            .map(|(k, entry)| (k.clone(), entry.value.clone()))
            .collect()
    }

    pub async fn delete_preference(&mut self, key: &str) {
        if self.preferences.remove(key).is_some() {
            self.save().await;
        }
    }

    pub async fn clear(&mut self) {
        self.preferences.clear();
        self.save().await;
    }

    async fn save(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let value = match serde_json::to_value(&self.preferences) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("preference serialisation failed, state kept in memory: {e}");
                return;
            }
        };
        if let Err(e) = write_json_atomic(path, &value).await {
            tracing::warn!("preference persistence failed, state kept in memory: {e}");
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
