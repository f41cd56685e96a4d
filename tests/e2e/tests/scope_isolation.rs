//! User scope isolation
//!
//! No read path ever crosses user boundaries: listing, hybrid search, and
//! per-user resets stay inside the requesting user's records.

use std::sync::Arc;

use engram_core::MemoryMetadata;
use engram_e2e_tests::{ConceptEmbedder, RoutedLm, TestHarness};

fn harness() -> TestHarness {
    TestHarness::new(
        Arc::new(ConceptEmbedder::new(16, &["结构化"])),
        Arc::new(RoutedLm::new()),
    )
}

async fn seed(harness: &TestHarness, user: &str, text: &str) -> String {
    let id = uuid::Uuid::new_v4().to_string();
    assert!(
        harness
            .pool
            .insert_memory(&id, user, text, MemoryMetadata::default())
            .await
    );
    id
}

#[tokio::test]
async fn get_all_never_crosses_users() {
    let harness = harness();
    seed(&harness, "alice", "alice 偏好结构化输出").await;
    seed(&harness, "alice", "alice 的另一条记录").await;
    seed(&harness, "bob", "bob 偏好结构化输出").await;

    let alice = harness.pool.get_all("alice", None).await;
    assert_eq!(alice.len(), 2);
    assert!(alice.iter().all(|m| m.user_id == "alice"));

    let bob = harness.pool.get_all("bob", None).await;
    assert_eq!(bob.len(), 1);
    assert_eq!(bob[0].user_id, "bob");

    assert!(harness.pool.get_all("carol", None).await.is_empty());
}

#[tokio::test]
async fn hybrid_search_is_user_scoped() {
    let harness = harness();
    seed(&harness, "alice", "偏好使用结构化输出").await;
    // Bob's record matches the query at least as well on both paths
    seed(&harness, "bob", "结构化 结构化 结构化").await;

    let results = harness.pool.search("alice", "结构化", Some(10), 0.0).await;
    assert!(!results.is_empty());
    assert!(results.iter().all(|m| m.user_id == "alice"));
}

#[tokio::test]
async fn reset_user_leaves_other_users_intact() {
    let harness = harness();
    seed(&harness, "alice", "alice 的记录").await;
    seed(&harness, "bob", "bob 的记录").await;

    assert!(harness.pool.reset_user("alice").await);
    assert!(harness.pool.get_all("alice", None).await.is_empty());
    assert_eq!(harness.pool.get_all("bob", None).await.len(), 1);
}
