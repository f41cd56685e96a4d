//! Cross-session plan persistence
//!
//! Save a plan in one session, flip a step, and resume from a fresh
//! manager as the next session would.

use std::sync::Arc;

use engram_core::StepDraft;
use engram_e2e_tests::{ConceptEmbedder, RoutedLm, TestHarness};
use serde_json::Map;

fn harness() -> TestHarness {
    TestHarness::new(
        Arc::new(ConceptEmbedder::new(16, &["产品"])),
        Arc::new(RoutedLm::new()),
    )
}

#[tokio::test]
async fn plan_survives_session_boundary() {
    let harness = harness();

    // Session 1: save the plan, verify the first step
    {
        let mut manager = harness.manager("user_1");
        let plan = manager.plan();
        plan.save_plan(
            "task_ppt",
            "生成产品PPT",
            vec![
                StepDraft::new("step0"),
                StepDraft::new("step1"),
                StepDraft::new("step2"),
            ],
            "帮我做一个产品介绍PPT",
            Map::new(),
        )
        .await
        .unwrap();
        assert!(plan.update_step_status("task_ppt", 0, true, Some("资料已齐".into())).await);
        assert!(
            plan.add_session_summary("task_ppt", vec!["step0".into()], "接着做排版")
                .await
        );
    }

    // Session 2: a fresh manager sees only the persisted file
    let mut resumed = harness.manager("user_1");
    let plan = resumed.plan();
    assert!(plan.has_persistent_plan("task_ppt"));

    let block = plan.get_session_summary("task_ppt").await;
    assert!(block.contains("[x] step0"));
    assert!(block.contains("[ ] step1"));
    assert!(block.contains("[ ] step2"));
    assert!(block.contains("1/3"));
    assert!(block.contains("接着做排版"));

    assert_eq!(plan.get_next_step("task_ppt").await.unwrap().action, "step1");
}

#[tokio::test]
async fn step_monotonicity_across_sessions() {
    let harness = harness();

    {
        let mut manager = harness.manager("user_1");
        let plan = manager.plan();
        plan.save_plan(
            "task_x",
            "goal",
            vec![StepDraft::new("a"), StepDraft::new("b")],
            "",
            Map::new(),
        )
        .await
        .unwrap();
        plan.update_step_status("task_x", 0, true, None).await;
    }

    // A later session cannot regress the step
    let mut resumed = harness.manager("user_1");
    let plan = resumed.plan();
    assert!(plan.update_step_status("task_x", 0, false, None).await);
    let document = plan.load_plan("task_x").await.unwrap();
    assert!(document.steps[0].passes);
    assert_eq!(document.steps[0].action, "a");
    assert_eq!(document.completion_rate, "1/2");
}

#[tokio::test]
async fn plans_are_user_scoped() {
    let harness = harness();

    {
        let mut alice = harness.manager("alice");
        alice
            .plan()
            .save_plan("task_a", "alice's plan", vec![StepDraft::new("x")], "", Map::new())
            .await
            .unwrap();
    }

    let mut bob = harness.manager("bob");
    assert!(!bob.plan().has_persistent_plan("task_a"));
    assert!(bob.plan().load_plan("task_a").await.is_none());
}

#[tokio::test]
async fn session_summaries_number_monotonically_across_sessions() {
    let harness = harness();

    {
        let mut manager = harness.manager("user_1");
        let plan = manager.plan();
        plan.save_plan("task_y", "goal", vec![StepDraft::new("a")], "", Map::new())
            .await
            .unwrap();
        plan.add_session_summary("task_y", vec![], "first hint").await;
    }

    let mut resumed = harness.manager("user_1");
    let plan = resumed.plan();
    plan.add_session_summary("task_y", vec![], "second hint").await;

    let document = plan.load_plan("task_y").await.unwrap();
    assert_eq!(document.session_summaries.len(), 2);
    assert_eq!(document.session_summaries[1].session, 2);
}
