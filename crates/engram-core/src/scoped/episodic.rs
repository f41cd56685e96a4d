//! Episodic Memory - per-user task history
//!
//! Append-only list of episode records, one JSON file per user.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{write_json_atomic, Result};

/// One completed task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub user_intent: String,
    pub result: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

/// Per-user episodic store
pub struct EpisodicMemory {
    user_id: Option<String>,
    path: Option<PathBuf>,
    episodes: Vec<Episode>,
    initialized: bool,
}

impl EpisodicMemory {
    /// Build for a user under a storage root; `None` root keeps the store
    /// memory-only.
    pub fn new(user_id: Option<&str>, storage_dir: Option<&std::path::Path>) -> Self {
        let path = storage_dir.map(|dir| match user_id {
            Some(uid) => dir.join("users").join(uid).join("episodic.json"),
            None => dir.join("episodic.json"),
        });
        Self {
            user_id: user_id.map(String::from),
            path,
            episodes: vec![],
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
                        Ok(episodes) => self.episodes = episodes,
                        Err(e) => {
                            tracing::warn!("episodic file did not parse, starting empty: {e}");
                            self.episodes = vec![];
                        }
                    },
                    Err(e) => tracing::warn!("episodic file unreadable, starting empty: {e}"),
                }
            }
        }
        self.initialized = true;
        tracing::debug!(user_id = ?self.user_id, "episodic memory initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Append one episode and persist
    pub async fn add_episode(
        &mut self,
        task_id: impl Into<String>,
        user_intent: impl Into<String>,
        result: Value,
        quality_score: Option<f64>,
        metadata: Map<String, Value>,
    ) {
        self.episodes.push(Episode {
            task_id: task_id.into(),
            user_id: self.user_id.clone(),
            user_intent: user_intent.into(),
            result,
            quality_score,
            metadata,
            timestamp: Utc::now(),
        });
        self.save().await;
    }

    /// Episodes, optionally the last `n` and/or above a quality floor
    pub fn get_episodes(&self, last_n: Option<usize>, min_quality: Option<f64>) -> Vec<&Episode> {
        let filtered: Vec<&Episode> = self
            .episodes
            .iter()
            .filter(|e| match min_quality {
                Some(floor) => e.quality_score.map(|q| q >= floor).unwrap_or(false),
                None => true,
            })
            .collect();
        match last_n {
            Some(n) if n < filtered.len() => filtered[filtered.len() - n..].to_vec(),
            _ => filtered,
        }
    }

    /// Keyword-overlap lookup of similar past episodes
    pub fn get_similar_episodes(&self, user_intent: &str, top_k: usize) -> Vec<&Episode> {
        let intent_words: std::collections::HashSet<String> = user_intent
            .to_lowercase()
            .split_whitespace()
            .map(String::from)
            .collect();

        let mut scored: Vec<(usize, &Episode)> = self
            .episodes
            .iter()
            .filter_map(|episode| {
                let overlap = episode
                    .user_intent
                    .to_lowercase()
                    .split_whitespace()
                    .filter(|w| intent_words.contains(*w))
                    .count();
                (overlap > 0).then_some((overlap, episode))
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().take(top_k).map(|(_, e)| e).collect()
    }

    /// Episodes whose metadata carries `key == value`
    pub fn search_by_metadata(&self, key: &str, value: &Value) -> Vec<&Episode> {
        self.episodes
            .iter()
            .filter(|e| e.metadata.get(key) == Some(value))
            .collect()
    }

    /// Drop all episodes and truncate the file
    pub async fn clear(&mut self) {
        self.episodes.clear();
        self.save().await;
    }

    async fn save(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let value = match serde_json::to_value(&self.episodes) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("episodic serialisation failed, state kept in memory: {e}");
                return;
            }
        };
        if let Err(e) = write_json_atomic(path, &value).await {
            // In-memory state is authoritative; the next write retries
            tracing::warn!("episodic persistence failed, state kept in memory: {e}");
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
