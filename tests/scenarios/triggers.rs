use crate::helpers::*;
use branchline::core::{ExecutionContext, ExecutionStatus, PipelineDefinition, Step, TriggerEvent};
use branchline::execution::ExecutionEngine;

#[test]
fn test_schema_publish_branches() {
    let definition = schema_publish();

    for branch in ["devel", "release_1.2", "release_", "feature_login"] {
        assert!(
            definition.is_triggered_by(&TriggerEvent::push(branch)),
            "{} should trigger",
            branch
        );
    }
    for branch in ["main", "develop", "release", "hotfix_release_1", "Devel"] {
        assert!(
            !definition.is_triggered_by(&TriggerEvent::push(branch)),
            "{} should not trigger",
            branch
        );
    }
}

#[tokio::test]
async fn test_mismatch_is_a_no_op() {
    let engine = ExecutionEngine::new(MockInvoker::new());
    let definition = definition(FOUR_STEP_PIPELINE);

    let outcome = engine
        .run(&definition, &TriggerEvent::push("main"), &ExecutionContext::new())
        .await;

    assert_eq!(outcome.status(), ExecutionStatus::NotTriggered);
    assert!(!outcome.is_failure());
    assert!(outcome.failure.is_none());
    assert!(outcome.run_log.is_empty());
    assert_eq!(engine.invoker().call_count(), 0);
}

#[tokio::test]
async fn test_manual_run_needs_no_triggers() {
    let engine = ExecutionEngine::new(MockInvoker::new());
    let untriggered = PipelineDefinition::new("adhoc", vec![Step::new("hello", ["echo", "hi"])]);

    let outcome = engine
        .run(&untriggered, &TriggerEvent::manual(), &ExecutionContext::new())
        .await;
    assert_success(&outcome);

    let gated = untriggered.with_triggers(["devel"]);
    let outcome = engine
        .run(&gated, &TriggerEvent::manual(), &ExecutionContext::new())
        .await;
    assert_eq!(outcome.status(), ExecutionStatus::NotTriggered);
}

#[test]
fn test_malformed_pattern_does_not_block_others() {
    let definition = PipelineDefinition::new("p", vec![]).with_triggers(["rel*ease", "devel"]);

    assert!(definition.is_triggered_by(&TriggerEvent::push("devel")));
    assert!(!definition.is_triggered_by(&TriggerEvent::push("rel*ease")));
    assert!(!definition.is_triggered_by(&TriggerEvent::push("release")));
}
