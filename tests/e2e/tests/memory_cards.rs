//! Explicit memory-card journeys
//!
//! First card into an empty store, a numeric update routed onto the
//! existing record, and a contradiction that replaces an old fact.

use std::sync::Arc;

use engram_core::providers::ChatMessage;
use engram_core::{AddOptions, MemoryCardCategory, MemoryEvent, MemoryType};
use engram_e2e_tests::{ConceptEmbedder, RoutedLm, TestHarness};

fn embedder() -> Arc<ConceptEmbedder> {
    Arc::new(ConceptEmbedder::new(
        16,
        &["称呼", "合同", "金额", "用户", "结构化"],
    ))
}

#[tokio::test]
async fn first_card_lands_in_empty_store() {
    let lm = Arc::new(RoutedLm::new());
    let harness = TestHarness::new(embedder(), lm);
    let mut manager = harness.manager("user_1");

    let card = manager
        .create_memory_card(
            engram_core::CardDraft::new("称呼: 良哥", MemoryCardCategory::Other),
        )
        .await
        .unwrap();

    // The card id is the store record id
    let all = harness.pool.get_all("user_1", None).await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, card.id);
    assert_eq!(all[0].memory, "称呼: 良哥");
    assert_eq!(all[0].metadata.memory_type, Some(MemoryType::Explicit));
    assert_eq!(
        all[0].metadata.source,
        Some(engram_core::MemorySource::UserCard)
    );

    // Listing by category returns exactly this card
    let listed = manager
        .list_memory_cards(Some(MemoryCardCategory::Other), 50, false)
        .await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, card.id);
    assert_eq!(listed[0].content, "称呼: 良哥");
}

#[tokio::test]
async fn numeric_change_updates_in_place() {
    let lm = Arc::new(RoutedLm::new());
    let harness = TestHarness::new(embedder(), lm.clone());
    let mut manager = harness.manager("user_1");

    // Seed the original amount, bypassing the decision stage
    let seeded = manager
        .create_memory_card(
            engram_core::CardDraft::new("合同金额 100 万", MemoryCardCategory::Fact).skip_checks(),
        )
        .await
        .unwrap();

    // The decider rules UPDATE, reusing the existing record's temp id
    lm.set_decision(
        r#"{"memory": [{"id": "0", "text": "合同金额 150 万", "event": "UPDATE", "old_memory": "合同金额 100 万"}]}"#,
    );

    let updated = manager
        .create_memory_card(engram_core::CardDraft::new(
            "合同金额 150 万",
            MemoryCardCategory::Fact,
        ))
        .await
        .unwrap();

    // Same record, new text, total count unchanged
    assert_eq!(updated.id, seeded.id);
    assert_eq!(updated.content, "合同金额 150 万");
    let all = harness.pool.get_all("user_1", None).await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, seeded.id);
    assert_eq!(all[0].memory, "合同金额 150 万");
    assert!(all[0].updated_at.is_some());
}

#[tokio::test]
async fn contradiction_deletes_old_and_adds_new() {
    let lm = Arc::new(
        RoutedLm::new()
            .with_facts(r#"["用户是医生"]"#)
            .with_decision(
                r#"{"memory": [
                    {"id": "0", "text": "", "event": "DELETE", "old_memory": "用户是软件工程师"},
                    {"id": "new", "text": "用户是医生", "event": "ADD"}
                ]}"#,
            ),
    );
    let harness = TestHarness::new(embedder(), lm.clone());
    let mut manager = harness.manager("user_1");

    let old = manager
        .create_memory_card(
            engram_core::CardDraft::new("用户是软件工程师", MemoryCardCategory::Fact).skip_checks(),
        )
        .await
        .unwrap();

    // Conversation path: extraction then decision
    let result = harness
        .pool
        .add(
            "user_1",
            &[ChatMessage::user("其实我现在是医生了")],
            AddOptions::default(),
        )
        .await;

    let events: Vec<MemoryEvent> = result.results.iter().map(|r| r.event).collect();
    assert!(events.contains(&MemoryEvent::Delete));
    assert!(events.contains(&MemoryEvent::Add));

    let all = harness.pool.get_all("user_1", None).await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].memory, "用户是医生");
    assert_ne!(all[0].id, old.id);
}

#[tokio::test]
async fn decider_none_returns_unpersisted_card() {
    let lm = Arc::new(RoutedLm::new());
    let harness = TestHarness::new(embedder(), lm.clone());
    let mut manager = harness.manager("user_1");

    manager
        .create_memory_card(
            engram_core::CardDraft::new("用户偏好结构化输出", MemoryCardCategory::Preference)
                .skip_checks(),
        )
        .await
        .unwrap();

    lm.set_decision(r#"{"memory": [{"id": "0", "text": "", "event": "NONE"}]}"#);
    let noop = manager
        .create_memory_card(engram_core::CardDraft::new(
            "用户偏好结构化的输出",
            MemoryCardCategory::Preference,
        ))
        .await
        .unwrap();

    assert!(noop.id.starts_with("noop_"));
    assert_eq!(harness.pool.get_all("user_1", None).await.len(), 1);
}

#[tokio::test]
async fn delete_card_resolves_store_record() {
    let lm = Arc::new(RoutedLm::new());
    let harness = TestHarness::new(embedder(), lm);
    let mut manager = harness.manager("user_1");

    let card = manager
        .create_memory_card(
            engram_core::CardDraft::new("称呼: 良哥", MemoryCardCategory::Other).skip_checks(),
        )
        .await
        .unwrap();

    assert!(manager.delete_memory_card(&card.id).await);
    assert!(harness.pool.get_all("user_1", None).await.is_empty());
    assert!(!manager.delete_memory_card(&card.id).await);
}

#[tokio::test]
async fn search_cards_filters_to_explicit() {
    let lm = Arc::new(
        RoutedLm::new()
            .with_facts(r#"["用户长期使用结构化写作"]"#)
            .with_decision(r#"{"memory": [{"id": "fresh", "text": "用户长期使用结构化写作", "event": "ADD"}]}"#),
    );
    let harness = TestHarness::new(embedder(), lm);
    let mut manager = harness.manager("user_1");

    // One explicit card and one implicit conversational memory
    manager
        .create_memory_card(
            engram_core::CardDraft::new("用户偏好结构化输出", MemoryCardCategory::Preference)
                .skip_checks(),
        )
        .await
        .unwrap();
    harness
        .pool
        .add(
            "user_1",
            &[ChatMessage::user("我平时写东西都用结构化格式")],
            AddOptions::default(),
        )
        .await;
    assert_eq!(harness.pool.get_all("user_1", None).await.len(), 2);

    let cards = manager.search_memory_cards("结构化", None, 10).await;
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0].content, "用户偏好结构化输出");
}
