//! Storage layer
//!
//! SQLite-backed hybrid vector store (embedding table + payload table +
//! global FTS5 index) and the instance-scoped history audit log.

mod history;
mod vector;

pub use history::{HistoryEntry, HistoryStore};
pub use vector::{
    sanitize_fts5_query, CollectionInfo, ScoredPoint, StoreError, UpsertRecord, VectorStore,
};

/// Storage result type
pub type Result<T> = std::result::Result<T, StoreError>;
