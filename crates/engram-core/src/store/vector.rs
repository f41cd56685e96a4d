//! Hybrid Vector Store
//!
//! One on-disk SQLite database holds, per collection, an embedding table
//! keyed by id and a `_meta` sibling with the serialised payload, plus a
//! global FTS5 table over the textual `memory` field for BM25 keyword
//! search. A single connection behind a mutex serialises all writes; WAL
//! lets readers proceed against a snapshot.
//!
//! KNN runs as a scan over the collection's embedding blobs with Euclidean
//! distance computed here; `score = 1 / (1 + distance)`, results in
//! ascending distance order, bounded by `k`.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Storage error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Embedding length does not match the collection dimension
    #[error("Invalid embedding dimension: got {got}, collection expects {expected}")]
    InvalidDimension { got: usize, expected: usize },
    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
}

use super::Result;

// ============================================================================
// RECORD SHAPES
// ============================================================================

/// A record handed to `insert` (idempotent upsert)
#[derive(Debug, Clone)]
pub struct UpsertRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub payload: Value,
}

/// A search / listing hit: id, relevance score, opaque payload
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: Value,
}

/// Collection summary returned by `col_info`
#[derive(Debug, Clone)]
pub struct CollectionInfo {
    pub name: String,
    pub document_count: i64,
    pub dimensions: usize,
}

// ============================================================================
// FTS QUERY SANITIZATION
// ============================================================================

/// Quote every whitespace-separated token so user text cannot inject FTS5
/// query syntax; tokens are OR-ed for recall.
pub fn sanitize_fts5_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|token| format!("\"{}\"", token.replace('"', "")))
        .filter(|token| token.len() > 2)
        .collect::<Vec<_>>()
        .join(" OR ")
}

// ============================================================================
// EMBEDDING BYTES
// ============================================================================

fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

// ============================================================================
// VECTOR STORE
// ============================================================================

/// Hybrid vector store over one SQLite file
///
/// All methods take `&self`; a `Mutex<Connection>` provides the single
/// writer the upper layers rely on for linearisable writes per id.
pub struct VectorStore {
    conn: Mutex<Connection>,
    collection: String,
    dimensions: usize,
    db_path: PathBuf,
}

impl VectorStore {
    /// Open (or create) the store for one collection.
    ///
    /// Fails hard when the database cannot be opened or the schema cannot be
    /// created - the store never silently degrades.
    pub fn new(db_path: impl AsRef<Path>, collection: &str, dimensions: usize) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&db_path)?;
        Self::configure_connection(&conn)?;

        let store = Self {
            conn: Mutex::new(conn),
            collection: collection.to_string(),
            dimensions,
            db_path,
        };
        store.create_col(collection, dimensions)?;

        tracing::info!(
            db = %store.db_path.display(),
            collection,
            dimensions,
            "vector store ready"
        );
        Ok(store)
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Init("Connection lock poisoned".into()))
    }

    /// Collection this store was opened on
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Fixed embedding dimension of the collection
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    // ========================================================================
    // COLLECTION MANAGEMENT
    // ========================================================================

    /// Idempotent create of the embedding table, the `_meta` sibling, and
    /// the global FTS5 table
    pub fn create_col(&self, name: &str, _dimensions: usize) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS [{name}] (
                 id TEXT PRIMARY KEY,
                 embedding BLOB NOT NULL
             );
             CREATE TABLE IF NOT EXISTS [{name}_meta] (
                 id TEXT PRIMARY KEY,
                 payload TEXT DEFAULT '{{}}'
             );
             CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
                 id UNINDEXED,
                 user_id UNINDEXED,
                 memory
             );"
        ))?;
        Ok(())
    }

    /// List collections present in this database
    pub fn list_cols(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE '%_meta'",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .filter_map(|r| r.ok())
            .map(|n| n.trim_end_matches("_meta").to_string())
            .collect();
        Ok(names)
    }

    /// Drop the collection's tables
    pub fn delete_col(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS [{0}];
             DROP TABLE IF EXISTS [{0}_meta];",
            self.collection
        ))?;
        conn.execute("DELETE FROM memories_fts", [])?;
        tracing::info!(collection = %self.collection, "collection dropped");
        Ok(())
    }

    /// Collection summary
    pub fn col_info(&self) -> Result<CollectionInfo> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM [{}_meta]", self.collection),
            [],
            |row| row.get(0),
        )?;
        Ok(CollectionInfo {
            name: self.collection.clone(),
            document_count: count,
            dimensions: self.dimensions,
        })
    }

    /// Drop and recreate the collection
    pub fn reset(&self) -> Result<()> {
        self.delete_col()?;
        self.create_col(&self.collection.clone(), self.dimensions)
    }

    // ========================================================================
    // WRITES
    // ========================================================================

    /// Idempotent upsert: delete-then-insert each record in one transaction.
    ///
    /// Any failure aborts the whole batch - readers never observe a record
    /// present in one table but not the other.
    pub fn insert(&self, records: &[UpsertRecord]) -> Result<()> {
        for record in records {
            if record.embedding.len() != self.dimensions {
                return Err(StoreError::InvalidDimension {
                    got: record.embedding.len(),
                    expected: self.dimensions,
                });
            }
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for record in records {
            tx.execute(
                &format!("DELETE FROM [{}] WHERE id = ?1", self.collection),
                params![record.id],
            )?;
            tx.execute(
                &format!(
                    "INSERT INTO [{}] (id, embedding) VALUES (?1, ?2)",
                    self.collection
                ),
                params![record.id, embedding_to_bytes(&record.embedding)],
            )?;
            tx.execute(
                &format!(
                    "INSERT OR REPLACE INTO [{}_meta] (id, payload) VALUES (?1, ?2)",
                    self.collection
                ),
                params![record.id, record.payload.to_string()],
            )?;
            Self::sync_fts_row(&tx, &record.id, &record.payload)?;
        }
        tx.commit()?;

        tracing::debug!(count = records.len(), "records upserted");
        Ok(())
    }

    /// Independent updates to the embedding and/or the payload
    pub fn update(&self, id: &str, embedding: Option<&[f32]>, payload: Option<&Value>) -> Result<()> {
        if let Some(embedding) = embedding {
            if embedding.len() != self.dimensions {
                return Err(StoreError::InvalidDimension {
                    got: embedding.len(),
                    expected: self.dimensions,
                });
            }
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        if let Some(embedding) = embedding {
            tx.execute(
                &format!("DELETE FROM [{}] WHERE id = ?1", self.collection),
                params![id],
            )?;
            tx.execute(
                &format!(
                    "INSERT INTO [{}] (id, embedding) VALUES (?1, ?2)",
                    self.collection
                ),
                params![id, embedding_to_bytes(embedding)],
            )?;
        }
        if let Some(payload) = payload {
            tx.execute(
                &format!(
                    "INSERT OR REPLACE INTO [{}_meta] (id, payload) VALUES (?1, ?2)",
                    self.collection
                ),
                params![id, payload.to_string()],
            )?;
            Self::sync_fts_row(&tx, id, payload)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Delete a record from both tables and the FTS index
    pub fn delete(&self, id: &str) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            &format!("DELETE FROM [{}] WHERE id = ?1", self.collection),
            params![id],
        )?;
        let rows = tx.execute(
            &format!("DELETE FROM [{}_meta] WHERE id = ?1", self.collection),
            params![id],
        )?;
        tx.execute("DELETE FROM memories_fts WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(rows > 0)
    }

    /// Keep the FTS row for an id in step with its payload
    fn sync_fts_row(conn: &Connection, id: &str, payload: &Value) -> rusqlite::Result<()> {
        conn.execute("DELETE FROM memories_fts WHERE id = ?1", params![id])?;
        let memory = payload
            .get("memory")
            .or_else(|| payload.get("data"))
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        if memory.is_empty() {
            return Ok(());
        }
        let user_id = payload
            .get("user_id")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        conn.execute(
            "INSERT INTO memories_fts (id, user_id, memory) VALUES (?1, ?2, ?3)",
            params![id, user_id, memory],
        )?;
        Ok(())
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// KNN over the collection: ascending distance, at most `limit` results,
    /// `score = 1 / (1 + distance)`
    pub fn search(&self, query: &[f32], limit: usize) -> Result<Vec<ScoredPoint>> {
        if query.len() != self.dimensions {
            return Err(StoreError::InvalidDimension {
                got: query.len(),
                expected: self.dimensions,
            });
        }

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT v.id, v.embedding, m.payload
             FROM [{0}] v
             LEFT JOIN [{0}_meta] m ON v.id = m.id",
            self.collection
        ))?;

        let mut scored: Vec<(f32, ScoredPoint)> = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let embedding: Vec<u8> = row.get(1)?;
                let payload: Option<String> = row.get(2)?;
                Ok((id, embedding, payload))
            })?
            .filter_map(|r| r.ok())
            .map(|(id, embedding_bytes, payload_str)| {
                let embedding = bytes_to_embedding(&embedding_bytes);
                let distance = euclidean_distance(query, &embedding);
                let payload = payload_str
                    .and_then(|s| serde_json::from_str(&s).ok())
                    .unwrap_or(Value::Object(Default::default()));
                let score = if distance >= 0.0 {
                    1.0 / (1.0 + distance)
                } else {
                    0.0
                };
                (distance, ScoredPoint { id, score, payload })
            })
            .collect();

        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored.into_iter().take(limit).map(|(_, p)| p).collect())
    }

    /// BM25 keyword search over the FTS5 index, optionally scoped to a user.
    ///
    /// FTS5 ranks more-negative-is-better; the score maps match quality `g =
    /// -bm25` into (0, 1) as `g / (1 + g)` so it merges cleanly with the
    /// vector side.
    pub fn keyword_search(
        &self,
        query: &str,
        user_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let sanitized = sanitize_fts5_query(query);
        if sanitized.is_empty() {
            return Ok(vec![]);
        }

        let conn = self.lock()?;
        let sql = format!(
            "SELECT f.id, bm25(memories_fts) AS rank, m.payload
             FROM memories_fts f
             LEFT JOIN [{}_meta] m ON f.id = m.id
             WHERE memories_fts MATCH ?1 {}
             ORDER BY rank
             LIMIT ?{}",
            self.collection,
            if user_id.is_some() {
                "AND f.user_id = ?2"
            } else {
                ""
            },
            if user_id.is_some() { 3 } else { 2 },
        );

        let map_row = |row: &rusqlite::Row| -> rusqlite::Result<(String, f64, Option<String>)> {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        };

        let mut stmt = conn.prepare(&sql)?;
        let rows: Vec<(String, f64, Option<String>)> = match user_id {
            Some(uid) => stmt
                .query_map(params![sanitized, uid, limit as i64], map_row)?
                .filter_map(|r| r.ok())
                .collect(),
            None => stmt
                .query_map(params![sanitized, limit as i64], map_row)?
                .filter_map(|r| r.ok())
                .collect(),
        };

        Ok(rows
            .into_iter()
            .map(|(id, rank, payload_str)| {
                // bm25() degenerates to 0 on small corpora (idf ~ 0), so a
                // match floors at 0.5 and climbs towards 1 with quality
                let goodness = (-rank).max(0.0) as f32;
                let payload = payload_str
                    .and_then(|s| serde_json::from_str(&s).ok())
                    .unwrap_or(Value::Object(Default::default()));
                ScoredPoint {
                    id,
                    score: (goodness + 1.0) / (goodness + 2.0),
                    payload,
                }
            })
            .collect())
    }

    /// Fetch one record's payload by id
    pub fn get(&self, id: &str) -> Result<Option<ScoredPoint>> {
        let conn = self.lock()?;
        let payload: Option<String> = conn
            .query_row(
                &format!("SELECT payload FROM [{}_meta] WHERE id = ?1", self.collection),
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(payload.map(|s| ScoredPoint {
            id: id.to_string(),
            score: 1.0,
            payload: serde_json::from_str(&s).unwrap_or(Value::Object(Default::default())),
        }))
    }

    /// List records whose payload matches all `filters`, compared against
    /// `json_extract` of the serialised payload
    pub fn list(&self, filters: &[(&str, Value)], limit: Option<usize>) -> Result<Vec<ScoredPoint>> {
        let conn = self.lock()?;

        let mut sql = format!("SELECT id, payload FROM [{}_meta]", self.collection);
        let mut binds: Vec<rusqlite::types::Value> = Vec::new();
        if !filters.is_empty() {
            let clauses: Vec<String> = filters
                .iter()
                .enumerate()
                .map(|(i, (key, _))| format!("json_extract(payload, '$.{key}') = ?{}", i + 1))
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
            for (_, value) in filters {
                binds.push(json_scalar(value));
            }
        }
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT ?{}", binds.len() + 1));
            binds.push(rusqlite::types::Value::Integer(limit as i64));
        }

        let mut stmt = conn.prepare(&sql)?;
        let points = stmt
            .query_map(rusqlite::params_from_iter(binds), |row| {
                let id: String = row.get(0)?;
                let payload: String = row.get(1)?;
                Ok((id, payload))
            })?
            .filter_map(|r| r.ok())
            .map(|(id, payload)| ScoredPoint {
                id,
                score: 1.0,
                payload: serde_json::from_str(&payload).unwrap_or(Value::Object(Default::default())),
            })
            .collect();
        Ok(points)
    }
}

/// Bind a JSON scalar the way `json_extract` surfaces it
fn json_scalar(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::String(s) => rusqlite::types::Value::Text(s.clone()),
        Value::Bool(b) => rusqlite::types::Value::Integer(*b as i64),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                rusqlite::types::Value::Integer(i)
            } else {
                rusqlite::types::Value::Real(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::Null => rusqlite::types::Value::Null,
        other => rusqlite::types::Value::Text(other.to_string()),
    }
}

// ============================================================================
// TESTS
// ============================================================================
