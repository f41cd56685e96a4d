//! Hybrid retrieval behaviour
//!
//! Vector-only, keyword-only and dual-path hits merged under the 0.6/0.4
//! weighting, plus the k-bound and min_score contracts.

use std::sync::Arc;

use engram_core::MemoryMetadata;
use engram_e2e_tests::{ConceptEmbedder, RoutedLm, TestHarness};

fn harness() -> TestHarness {
    TestHarness::new(
        Arc::new(ConceptEmbedder::new(16, &["结构化", "工作流"])),
        Arc::new(RoutedLm::new()),
    )
}

async fn seed(harness: &TestHarness, texts: &[&str]) -> Vec<String> {
    let mut ids = Vec::new();
    for text in texts {
        let id = uuid::Uuid::new_v4().to_string();
        assert!(
            harness
                .pool
                .insert_memory(&id, "user_1", text, MemoryMetadata::default())
                .await
        );
        ids.push(id);
    }
    ids
}

#[tokio::test]
async fn semantic_and_lexical_hits_both_surface_vector_first() {
    let harness = harness();
    let ids = seed(
        &harness,
        &["偏好使用结构化输出", "Python Python Python"],
    )
    .await;

    let results = harness.pool.search("user_1", "结构化 Python", Some(5), 0.0).await;

    let semantic_pos = results.iter().position(|m| m.id == ids[0]);
    let lexical_pos = results.iter().position(|m| m.id == ids[1]);
    assert!(semantic_pos.is_some(), "semantic-only match missing");
    assert!(lexical_pos.is_some(), "lexical-only match missing");
    // Vector weight 0.6 dominates the keyword side's 0.4
    assert!(semantic_pos.unwrap() < lexical_pos.unwrap());
}

#[tokio::test]
async fn dual_path_hit_outranks_single_path() {
    let harness = harness();
    // Second record shares the query's concept AND its lexical token
    let ids = seed(&harness, &["偏好使用结构化输出", "结构化 Python 输出"]).await;

    let results = harness.pool.search("user_1", "结构化 Python", Some(5), 0.0).await;
    assert_eq!(results[0].id, ids[1], "dual-path hit should lead");
    // Both sides contributed, so the leader strictly outranks
    assert!(results[0].score > results[1].score);
}

#[tokio::test]
async fn limit_bounds_results() {
    let harness = harness();
    let texts: Vec<String> = (0..8).map(|i| format!("结构化笔记第 {i} 篇")).collect();
    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
    seed(&harness, &refs).await;

    let results = harness.pool.search("user_1", "结构化", Some(3), 0.0).await;
    assert!(results.len() <= 3);
    // Descending by merged score
    for pair in results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn min_score_drops_weak_matches() {
    let harness = harness();
    seed(&harness, &["偏好使用结构化输出", "完全无关的一条记录"]).await;

    let all = harness.pool.search("user_1", "结构化", Some(5), 0.0).await;
    let strict = harness.pool.search("user_1", "结构化", Some(5), 0.55).await;
    assert!(strict.len() < all.len());
    assert!(strict.iter().all(|m| m.score >= 0.55));
}

#[tokio::test]
async fn empty_inputs_return_empty() {
    let harness = harness();
    seed(&harness, &["偏好使用结构化输出"]).await;

    assert!(harness.pool.search("", "结构化", Some(5), 0.0).await.is_empty());
    assert!(harness.pool.search("user_1", "", Some(5), 0.0).await.is_empty());
}
