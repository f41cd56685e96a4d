//! History Store - audit log for the update pipeline
//!
//! Every ADD / UPDATE / DELETE the ingestion pipeline applies is recorded in
//! an instance-scoped SQLite file so memory mutations stay auditable.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{Result, StoreError};

/// One audit entry
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub id: String,
    pub memory_id: String,
    pub old_memory: Option<String>,
    pub new_memory: Option<String>,
    pub event: String,
    pub created_at: DateTime<Utc>,
}

/// SQLite-backed audit log, WAL mode, 5 s busy timeout
pub struct HistoryStore {
    conn: Mutex<Connection>,
}

impl HistoryStore {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             CREATE TABLE IF NOT EXISTS history (
                 id TEXT PRIMARY KEY,
                 memory_id TEXT NOT NULL,
                 old_memory TEXT,
                 new_memory TEXT,
                 event TEXT NOT NULL,
                 created_at TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_history_memory ON history(memory_id);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Init("History lock poisoned".into()))
    }

    /// Record one applied event
    pub fn record(
        &self,
        memory_id: &str,
        old_memory: Option<&str>,
        new_memory: Option<&str>,
        event: &str,
    ) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO history (id, memory_id, old_memory, new_memory, event, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                Uuid::new_v4().to_string(),
                memory_id,
                old_memory,
                new_memory,
                event,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// All entries for one memory id, oldest first
    pub fn entries_for(&self, memory_id: &str) -> Result<Vec<HistoryEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, memory_id, old_memory, new_memory, event, created_at
             FROM history WHERE memory_id = ?1 ORDER BY created_at ASC",
        )?;
        let entries = stmt
            .query_map(params![memory_id], |row| {
                let created_at: String = row.get(5)?;
                Ok(HistoryEntry {
                    id: row.get(0)?,
                    memory_id: row.get(1)?,
                    old_memory: row.get(2)?,
                    new_memory: row.get(3)?,
                    event: row.get(4)?,
                    created_at: DateTime::parse_from_rfc3339(&created_at)
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(entries)
    }

    /// Truncate the log
    pub fn reset(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM history", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_history_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::new(dir.path().join("history.db")).unwrap();

        store.record("m1", None, Some("用户是软件工程师"), "ADD").unwrap();
        store
            .record("m1", Some("用户是软件工程师"), Some("用户是医生"), "UPDATE")
            .unwrap();

        let entries = store.entries_for("m1").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].event, "ADD");
        assert_eq!(entries[1].event, "UPDATE");
        assert_eq!(entries[1].old_memory.as_deref(), Some("用户是软件工程师"));

        store.reset().unwrap();
        assert!(store.entries_for("m1").unwrap().is_empty());
    }
}
