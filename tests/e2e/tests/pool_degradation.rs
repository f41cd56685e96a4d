//! Pool degradation discipline
//!
//! A store that fails to open flips the sticky unavailability flag: every
//! later operation is an empty read or a no-op write, no retries happen,
//! and only an explicit reset re-attempts construction.

use std::sync::Arc;

use engram_core::providers::ChatMessage;
use engram_core::{AddOptions, EnvSnapshot, MemoryConfig, MemoryPool};
use engram_e2e_tests::{BrokenEmbedder, ConceptEmbedder, RoutedLm};

/// A store root that is a FILE, so creating the instance directory under
/// it fails deterministically
fn broken_pool(dir: &tempfile::TempDir) -> MemoryPool {
    let blocker = dir.path().join("not_a_directory");
    std::fs::write(&blocker, b"occupied").unwrap();

    let mut config = MemoryConfig::from_snapshot(&EnvSnapshot::from_pairs([
        ("OPENAI_API_KEY", "sk-test"),
        ("ENGRAM_STORE_ROOT", blocker.to_str().unwrap()),
        ("AGENT_INSTANCE", "e2e"),
    ]))
    .unwrap();
    config.dimensions = 16;

    MemoryPool::new(
        config,
        Arc::new(ConceptEmbedder::new(16, &["x"])),
        Arc::new(RoutedLm::new().with_facts(r#"["a fact"]"#)),
    )
}

#[tokio::test]
async fn unavailability_is_sticky_across_many_calls() {
    let dir = tempfile::TempDir::new().unwrap();
    let pool = broken_pool(&dir);
    assert!(!pool.is_unavailable());

    // First touch flips the flag
    assert!(pool.search("user_1", "anything", Some(5), 0.0).await.is_empty());
    assert!(pool.is_unavailable());

    // A long run of calls stays empty / no-op without ever retrying
    for _ in 0..1000 {
        assert!(pool.search("user_1", "anything", Some(5), 0.0).await.is_empty());
    }
    let result = pool
        .add("user_1", &[ChatMessage::user("hello")], AddOptions::default())
        .await;
    assert!(result.results.is_empty());
    assert!(pool.get_all("user_1", None).await.is_empty());
    assert!(!pool.delete("some-id"));
    assert!(!pool.update("some-id", "text").await);
    assert!(!pool.reset_user("user_1").await);

    let health = pool.health_check();
    assert!(!health.healthy);
    assert!(health.detail.is_some());
}

#[tokio::test]
async fn reset_clears_the_flag_and_retries() {
    let dir = tempfile::TempDir::new().unwrap();
    let pool = broken_pool(&dir);

    assert!(pool.search("user_1", "q", Some(5), 0.0).await.is_empty());
    assert!(pool.is_unavailable());

    // Remove the blocker so the retry can succeed
    std::fs::remove_file(dir.path().join("not_a_directory")).unwrap();
    std::fs::create_dir_all(dir.path().join("not_a_directory")).unwrap();

    pool.reset();
    assert!(!pool.is_unavailable());
    assert!(pool.health_check().healthy);
}

#[tokio::test]
async fn embedding_failure_degrades_to_keyword_only() {
    // A healthy store with a broken embedder: writes cannot land, reads
    // degrade to the keyword path instead of failing the turn
    let dir = tempfile::TempDir::new().unwrap();
    let mut config = MemoryConfig::from_snapshot(&EnvSnapshot::from_pairs([
        ("OPENAI_API_KEY", "sk-test"),
        ("ENGRAM_STORE_ROOT", dir.path().to_str().unwrap()),
        ("AGENT_INSTANCE", "e2e"),
    ]))
    .unwrap();
    config.dimensions = 4;
    let pool = MemoryPool::new(
        config,
        Arc::new(BrokenEmbedder(4)),
        Arc::new(RoutedLm::new()),
    );

    let results = pool.search("user_1", "anything", Some(5), 0.0).await;
    assert!(results.is_empty());
    assert!(!pool.is_unavailable());
    assert!(pool.health_check().healthy);
}
