//! Plan Memory - cross-session task plan persistence
//!
//! One JSON document per task under `storage/users/{user_id}/plans/`.
//! Core rules: steps are append-once - `passes` only ever flips
//! false -> true, the description is immutable after save; session
//! summaries carry a monotonic session number; the Markdown progress block
//! is what the next session's system prompt receives.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{write_json_atomic, Result};

// ============================================================================
// DOCUMENT SHAPE
// ============================================================================

/// One normalised plan step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub index: usize,
    pub action: String,
    #[serde(default)]
    pub capability: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub skill_hint: String,
    pub passes: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

/// Step input before normalisation
#[derive(Debug, Clone, Default)]
pub struct StepDraft {
    pub action: String,
    pub capability: String,
    pub purpose: String,
    pub skill_hint: String,
    pub result: Option<String>,
}

impl StepDraft {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Default::default()
        }
    }
}

/// One end-of-session progress note
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session: u32,
    pub completed: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub next_hint: String,
}

/// The persisted plan document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDocument {
    pub task_id: String,
    pub goal: String,
    #[serde(default)]
    pub user_query: String,
    pub steps: Vec<PlanStep>,
    #[serde(default)]
    pub session_summaries: Vec<SessionSummary>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// "completed/total"
    pub completion_rate: String,
}

impl PlanDocument {
    fn completion_rate_of(steps: &[PlanStep]) -> String {
        let completed = steps.iter().filter(|s| s.passes).count();
        format!("{completed}/{}", steps.len())
    }
}

// ============================================================================
// STORE
// ============================================================================

/// Per-user plan store with an in-memory cache over the plan files
pub struct PlanMemory {
    user_id: Option<String>,
    plans_dir: Option<PathBuf>,
    cache: HashMap<String, PlanDocument>,
}

impl PlanMemory {
    pub fn new(user_id: Option<&str>, storage_dir: Option<&std::path::Path>) -> Self {
        let plans_dir = storage_dir.map(|dir| match user_id {
            Some(uid) => dir.join("users").join(uid).join("plans"),
            None => dir.join("plans"),
        });
        Self {
            user_id: user_id.map(String::from),
            plans_dir,
            cache: HashMap::new(),
        }
    }

    fn plan_path(&self, task_id: &str) -> Option<PathBuf> {
        self.plans_dir
            .as_ref()
            .map(|dir| dir.join(format!("{task_id}.json")))
    }

    // ========================================================================
    // CRUD
    // ========================================================================

    /// Save a new plan (first session). Steps are normalised; `passes`
    /// starts false everywhere.
    pub async fn save_plan(
        &mut self,
        task_id: impl Into<String>,
        goal: impl Into<String>,
        steps: Vec<StepDraft>,
        user_query: impl Into<String>,
        metadata: Map<String, Value>,
    ) -> Result<()> {
        let task_id = task_id.into();
        let now = Utc::now();
        let steps: Vec<PlanStep> = steps
            .into_iter()
            .enumerate()
            .map(|(index, draft)| PlanStep {
                index,
                action: draft.action,
                capability: draft.capability,
                purpose: draft.purpose,
                skill_hint: draft.skill_hint,
                passes: false,
                verified_at: None,
                result: draft.result,
            })
            .collect();

        let document = PlanDocument {
            task_id: task_id.clone(),
            goal: goal.into(),
            user_query: user_query.into(),
            completion_rate: PlanDocument::completion_rate_of(&steps),
            steps,
            session_summaries: vec![],
            metadata,
            created_at: now,
            updated_at: now,
        };

        tracing::info!(user_id = ?self.user_id, task_id, "plan saved");
        self.persist(task_id, document).await;
        Ok(())
    }

    /// Load a plan (cache first, then disk)
    pub async fn load_plan(&mut self, task_id: &str) -> Option<PlanDocument> {
        if let Some(document) = self.cache.get(task_id) {
            return Some(document.clone());
        }
        let path = self.plan_path(task_id)?;
        let content = tokio::fs::read_to_string(&path).await.ok()?;
        match serde_json::from_str::<PlanDocument>(&content) {
            Ok(document) => {
                self.cache.insert(task_id.to_string(), document.clone());
                Some(document)
            }
            Err(e) => {
                tracing::warn!(task_id, "plan file did not parse: {e}");
                None
            }
        }
    }

    /// Flip one step to passing. `passes` only transitions false -> true (a
    /// repeat is idempotent, true -> false is refused); the step's `action`
    /// is never rewritten.
    pub async fn update_step_status(
        &mut self,
        task_id: &str,
        step_index: usize,
        passes: bool,
        result: Option<String>,
    ) -> bool {
        let Some(mut document) = self.load_plan(task_id).await else {
            tracing::warn!(task_id, "step update on unknown plan");
            return false;
        };
        let Some(step) = document.steps.get_mut(step_index) else {
            tracing::warn!(task_id, step_index, "step index out of range");
            return false;
        };

        let now = Utc::now();
        if passes && !step.passes {
            step.passes = true;
            step.verified_at = Some(now);
        }
        if let Some(result) = result {
            step.result = Some(result);
        }

        document.updated_at = now;
        document.completion_rate = PlanDocument::completion_rate_of(&document.steps);
        self.persist(task_id.to_string(), document).await;
        true
    }

    /// Append one session summary with the next monotonic session number
    pub async fn add_session_summary(
        &mut self,
        task_id: &str,
        completed_steps: Vec<String>,
        next_step_hint: impl Into<String>,
    ) -> bool {
        let Some(mut document) = self.load_plan(task_id).await else {
            return false;
        };
        let session = document.session_summaries.len() as u32 + 1;
        document.session_summaries.push(SessionSummary {
            session,
            completed: completed_steps,
            timestamp: Utc::now(),
            next_hint: next_step_hint.into(),
        });
        document.updated_at = Utc::now();

        tracing::info!(task_id, session, "session summary appended");
        self.persist(task_id.to_string(), document).await;
        true
    }

    // ========================================================================
    // PROGRESS RENDERING
    // ========================================================================

    /// Render the Markdown resume block injected into the next session's
    /// system prompt: checked step list, completion ratio, last hint.
    pub async fn get_session_summary(&mut self, task_id: &str) -> String {
        let Some(document) = self.load_plan(task_id).await else {
            return String::new();
        };

        let total = document.steps.len();
        let completed = document.steps.iter().filter(|s| s.passes).count();
        let percent = if total > 0 { completed * 100 / total } else { 0 };

        let mut lines = vec![
            "---".to_string(),
            "## Task progress (restored)".to_string(),
            String::new(),
            format!("**Goal**: {}", document.goal),
            String::new(),
            format!("**Progress**: {completed}/{total} ({percent}%)"),
            String::new(),
            "**Steps**:".to_string(),
        ];
        for step in &document.steps {
            let mark = if step.passes { "[x]" } else { "[ ]" };
            lines.push(format!("- {mark} {}", step.action));
        }

        if let Some(last) = document.session_summaries.last() {
            if !last.next_hint.is_empty() {
                lines.push(String::new());
                lines.push(format!("**Last hint**: {}", last.next_hint));
            }
        }

        lines.push(String::new());
        lines.push("Continue with the first unchecked step and mark it done once verified.".to_string());
        lines.push("---".to_string());
        lines.join("\n")
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// Whether a plan exists for the task (cache or disk) - distinguishes a
    /// first session from a resume
    pub fn has_persistent_plan(&self, task_id: &str) -> bool {
        if self.cache.contains_key(task_id) {
            return true;
        }
        self.plan_path(task_id)
            .map(|path| path.exists())
            .unwrap_or(false)
    }

    /// Steps not yet passing, in order
    pub async fn get_incomplete_steps(&mut self, task_id: &str) -> Vec<PlanStep> {
        self.load_plan(task_id)
            .await
            .map(|document| document.steps.into_iter().filter(|s| !s.passes).collect())
            .unwrap_or_default()
    }

    /// The next step to work on
    pub async fn get_next_step(&mut self, task_id: &str) -> Option<PlanStep> {
        self.get_incomplete_steps(task_id).await.into_iter().next()
    }

    /// Plan summaries, most recently updated first
    pub async fn list_plans(&self, limit: usize) -> Vec<PlanDocument> {
        let Some(dir) = &self.plans_dir else {
            let mut plans: Vec<PlanDocument> = self.cache.values().cloned().collect();
            plans.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            plans.truncate(limit);
            return plans;
        };

        let mut plans = Vec::new();
        let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
            return plans;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(content) = tokio::fs::read_to_string(entry.path()).await else {
                continue;
            };
            match serde_json::from_str::<PlanDocument>(&content) {
                Ok(document) => plans.push(document),
                Err(e) => tracing::warn!(path = %entry.path().display(), "skipping unreadable plan: {e}"),
            }
        }
        plans.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        plans.truncate(limit);
        plans
    }

    // ========================================================================
    // CLEANUP
    // ========================================================================

    /// Delete one plan from cache and disk
    pub async fn delete_plan(&mut self, task_id: &str) -> bool {
        self.cache.remove(task_id);
        let Some(path) = self.plan_path(task_id) else {
            return false;
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(task_id, "plan deleted");
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                tracing::error!(task_id, "plan delete failed: {e}");
                false
            }
        }
    }

    /// Drop everything
    pub async fn clear(&mut self) {
        self.cache.clear();
        let Some(dir) = &self.plans_dir else {
            return;
        };
        let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
            return;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                tracing::warn!(path = %entry.path().display(), "plan file removal failed: {e}");
            }
        }
        tracing::info!(user_id = ?self.user_id, "all plans cleared");
    }

    async fn persist(&mut self, task_id: String, document: PlanDocument) {
        if let Some(path) = self.plan_path(&task_id) {
            match serde_json::to_value(&document) {
                Ok(value) => {
                    if let Err(e) = write_json_atomic(&path, &value).await {
                        tracing::warn!(task_id, "plan persistence failed, state kept in memory: {e}");
                    }
                }
                Err(e) => tracing::warn!(task_id, "plan serialisation failed: {e}"),
            }
        }
        self.cache.insert(task_id, document);
    }
}

// ============================================================================
// TESTS
// ============================================================================
