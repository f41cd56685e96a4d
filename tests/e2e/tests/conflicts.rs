//! Conflict detection and policy resolution

use std::sync::Arc;

use engram_core::{ConflictKind, ConflictPolicy, ConflictResolution, MemoryMetadata};
use engram_e2e_tests::{ConceptEmbedder, RoutedLm, TestHarness};

fn harness_with(lm: Arc<RoutedLm>) -> TestHarness {
    TestHarness::new(Arc::new(ConceptEmbedder::new(16, &["合同", "金额", "用户"])), lm)
}

async fn seed(harness: &TestHarness, text: &str) -> String {
    let id = uuid::Uuid::new_v4().to_string();
    assert!(
        harness
            .pool
            .insert_memory(&id, "user_1", text, MemoryMetadata::default())
            .await
    );
    id
}

#[tokio::test]
async fn update_verdict_surfaces_preference_change() {
    let lm = Arc::new(RoutedLm::new());
    let harness = harness_with(lm.clone());
    let old_id = seed(&harness, "合同金额 100 万").await;

    lm.set_decision(
        r#"{"memory": [{"id": "0", "text": "合同金额 150 万", "event": "UPDATE", "old_memory": "合同金额 100 万"}]}"#,
    );

    let conflicts = harness
        .quality
        .detect_conflicts("user_1", "合同金额 150 万")
        .await;
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].kind, ConflictKind::PreferenceChange);
    assert_eq!(conflicts[0].memory_id, old_id);
    assert_eq!(conflicts[0].existing, "合同金额 100 万");
    assert_eq!(conflicts[0].incoming, "合同金额 150 万");
    assert!(!conflicts[0].suggestion.is_empty());
}

#[tokio::test]
async fn delete_verdict_surfaces_fact_contradiction() {
    let lm = Arc::new(RoutedLm::new());
    let harness = harness_with(lm.clone());
    let old_id = seed(&harness, "用户是软件工程师").await;

    lm.set_decision(
        r#"{"memory": [{"id": "0", "text": "", "event": "DELETE", "old_memory": "用户是软件工程师"}]}"#,
    );

    let conflicts = harness.quality.detect_conflicts("user_1", "用户是医生").await;
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].kind, ConflictKind::FactContradiction);
    assert_eq!(conflicts[0].memory_id, old_id);
}

#[tokio::test]
async fn explicit_first_deletes_the_old_memory() {
    let lm = Arc::new(RoutedLm::new());
    let harness = harness_with(lm.clone());
    let old_id = seed(&harness, "用户是软件工程师").await;

    lm.set_decision(
        r#"{"memory": [{"id": "0", "text": "", "event": "DELETE", "old_memory": "用户是软件工程师"}]}"#,
    );
    let conflicts = harness.quality.detect_conflicts("user_1", "用户是医生").await;

    let resolution = harness
        .quality
        .resolve_conflict("user_1", &conflicts[0], ConflictPolicy::ExplicitFirst)
        .await;
    assert_eq!(resolution, ConflictResolution::Deleted { memory_id: old_id });
    assert!(harness.pool.get_all("user_1", None).await.is_empty());
}

#[tokio::test]
async fn newest_first_rewrites_the_old_memory() {
    let lm = Arc::new(RoutedLm::new());
    let harness = harness_with(lm.clone());
    let old_id = seed(&harness, "合同金额 100 万").await;

    lm.set_decision(
        r#"{"memory": [{"id": "0", "text": "合同金额 150 万", "event": "UPDATE", "old_memory": "合同金额 100 万"}]}"#,
    );
    let conflicts = harness
        .quality
        .detect_conflicts("user_1", "合同金额 150 万")
        .await;

    let resolution = harness
        .quality
        .resolve_conflict("user_1", &conflicts[0], ConflictPolicy::NewestFirst)
        .await;
    assert_eq!(
        resolution,
        ConflictResolution::Rewritten {
            memory_id: old_id.clone()
        }
    );

    let all = harness.pool.get_all("user_1", None).await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, old_id);
    assert_eq!(all[0].memory, "合同金额 150 万");
}

#[tokio::test]
async fn keep_both_touches_nothing() {
    let lm = Arc::new(RoutedLm::new());
    let harness = harness_with(lm.clone());
    seed(&harness, "合同金额 100 万").await;

    lm.set_decision(
        r#"{"memory": [{"id": "0", "text": "合同金额 150 万", "event": "UPDATE", "old_memory": "合同金额 100 万"}]}"#,
    );
    let conflicts = harness
        .quality
        .detect_conflicts("user_1", "合同金额 150 万")
        .await;

    let resolution = harness
        .quality
        .resolve_conflict("user_1", &conflicts[0], ConflictPolicy::KeepBoth)
        .await;
    assert_eq!(resolution, ConflictResolution::NeedsReview);

    let all = harness.pool.get_all("user_1", None).await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].memory, "合同金额 100 万");
}

#[tokio::test]
async fn no_similar_memories_means_no_conflicts() {
    let lm = Arc::new(RoutedLm::new());
    let harness = harness_with(lm);
    let conflicts = harness
        .quality
        .detect_conflicts("user_1", "第一条记忆，没有历史")
        .await;
    assert!(conflicts.is_empty());
}
