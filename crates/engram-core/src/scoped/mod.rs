//! Per-user persisted memories
//!
//! Episodic history, preferences and task plans, each materialising to JSON
//! under `storage/users/{user_id}/`. Stores are created lazily on first
//! write; every mutation rewrites the file atomically (temp + rename); a
//! disk failure is a WARN with the in-memory state retained, the next write
//! retries.

mod episodic;
mod plan;
mod preference;

use std::path::Path;

pub use episodic::{Episode, EpisodicMemory};
pub use plan::{PlanDocument, PlanMemory, PlanStep, SessionSummary, StepDraft};
pub use preference::{PreferenceEntry, PreferenceMemory};

/// Store error for the JSON-backed scoped memories
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ScopedError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ScopedError>;

/// Atomic full-file rewrite: write a sibling temp file, then rename over
/// the target. A failure leaves the previous file intact.
pub(crate) async fn write_json_atomic(path: &Path, value: &serde_json::Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, serde_json::to_vec_pretty(value)?).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_atomic_write_creates_parents() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("users/u1/episodic.json");
        write_json_atomic(&path, &serde_json::json!([1, 2, 3]))
            .await
            .unwrap();
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: Vec<i32> = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, vec![1, 2, 3]);
        assert!(!dir.path().join("users/u1/episodic.json.tmp").exists());
    }
}
