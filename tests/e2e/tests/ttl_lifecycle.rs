//! TTL discipline
//!
//! Expiry stamps, the sweep, and the TTL status report.

use std::sync::Arc;

use chrono::{Duration, Utc};
use engram_core::{MemoryCardCategory, MemoryMetadata, MemoryType};
use engram_e2e_tests::{ConceptEmbedder, RoutedLm, TestHarness};

fn harness() -> TestHarness {
    TestHarness::new(
        Arc::new(ConceptEmbedder::new(16, &["临时", "合同"])),
        Arc::new(RoutedLm::new()),
    )
}

/// Insert a record whose expiry already passed (the stamp respects an
/// explicitly materialised `expires_at`)
async fn seed_expired(harness: &TestHarness, user: &str, text: &str) -> String {
    let id = uuid::Uuid::new_v4().to_string();
    let metadata = MemoryMetadata {
        memory_type: Some(MemoryType::Explicit),
        ttl_minutes: Some(1),
        expires_at: Some(Utc::now() - Duration::seconds(30)),
        card_id: Some(id.clone()),
        ..Default::default()
    };
    assert!(harness.pool.insert_memory(&id, user, text, metadata).await);
    id
}

#[tokio::test]
async fn live_ttl_card_is_listed_until_expiry() {
    let harness = harness();
    let mut manager = harness.manager("user_1");

    let card = manager
        .create_memory_card(
            engram_core::CardDraft::new("临时访问码 8842", MemoryCardCategory::Context)
                .ttl_minutes(1)
                .skip_checks(),
        )
        .await
        .unwrap();
    assert!(card.expires_at.is_some());

    // Well within the TTL: still listed
    let listed = manager.list_memory_cards(None, 50, false).await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, card.id);
}

#[tokio::test]
async fn sweep_removes_expired_and_status_reflects_it() {
    let harness = harness();
    let mut manager = harness.manager("user_1");

    manager
        .create_memory_card(
            engram_core::CardDraft::new("合同条款备忘", MemoryCardCategory::Fact)
                .ttl_minutes(60)
                .skip_checks(),
        )
        .await
        .unwrap();
    seed_expired(&harness, "user_1", "临时会议室密码").await;

    let before = manager.get_memory_ttl_status().await;
    assert_eq!(before.total, 2);
    assert_eq!(before.with_ttl, 2);
    assert_eq!(before.expired, 1);
    // 60-minute TTL falls inside the 7-day "expiring soon" horizon
    assert_eq!(before.expiring_soon, 1);
    let explicit = before.by_type.get("explicit").unwrap();
    assert_eq!(explicit.with_ttl, 2);
    assert_eq!(explicit.expired, 1);

    let removed = manager.clean_expired_memories(None).await;
    assert_eq!(removed, 1);

    let after = manager.get_memory_ttl_status().await;
    assert_eq!(after.total, 1);
    assert_eq!(after.expired, 0);
    assert_eq!(harness.pool.get_all("user_1", None).await.len(), 1);
}

#[tokio::test]
async fn expired_cards_hidden_unless_requested() {
    let harness = harness();
    let manager = harness.manager("user_1");

    seed_expired(&harness, "user_1", "临时口令").await;

    assert!(manager.list_memory_cards(None, 50, false).await.is_empty());
    assert_eq!(manager.list_memory_cards(None, 50, true).await.len(), 1);
}

#[tokio::test]
async fn sweep_respects_type_filter() {
    let harness = harness();
    let manager = harness.manager("user_1");

    // Expired explicit record plus an expired implicit one
    seed_expired(&harness, "user_1", "临时口令 explicit").await;
    let implicit_id = uuid::Uuid::new_v4().to_string();
    let metadata = MemoryMetadata {
        memory_type: Some(MemoryType::Implicit),
        ttl_minutes: Some(1),
        expires_at: Some(Utc::now() - Duration::seconds(30)),
        ..Default::default()
    };
    assert!(
        harness
            .pool
            .insert_memory(&implicit_id, "user_1", "临时推断", metadata)
            .await
    );

    let removed = manager
        .clean_expired_memories(Some(&[MemoryType::Implicit]))
        .await;
    assert_eq!(removed, 1);

    let remaining = harness.pool.get_all("user_1", None).await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].metadata.memory_type, Some(MemoryType::Explicit));
}

#[tokio::test]
async fn unexpired_records_survive_sweep() {
    let harness = harness();
    let mut manager = harness.manager("user_1");

    manager
        .create_memory_card(
            engram_core::CardDraft::new("合同条款备忘", MemoryCardCategory::Fact)
                .ttl_minutes(60)
                .skip_checks(),
        )
        .await
        .unwrap();

    assert_eq!(manager.clean_expired_memories(None).await, 0);
    assert_eq!(harness.pool.get_all("user_1", None).await.len(), 1);
}
