use crate::helpers::*;
use branchline::core::{ExecutionContext, StepState};
use branchline::execution::ExecutionEngine;

const THREE_STEPS: &str = r#"
name: "sequence"
steps:
  - id: "a"
    run: ["step-a"]
  - id: "b"
    run: ["step-b"]
  - id: "c"
    run: ["step-c"]
"#;

#[tokio::test]
async fn test_stops_at_first_failure() {
    let engine = ExecutionEngine::new(MockInvoker::new().fails("step-b", 1, "boom"));

    let outcome = engine
        .execute(&definition(THREE_STEPS), &ExecutionContext::new())
        .await;

    assert_executed(&outcome, &["a", "b"]);
    assert_failed_at(&outcome, 1, "ProcessFailure");
    assert_eq!(outcome.skipped, vec!["c"]);
    assert_eq!(engine.invoker().call_lines(), vec!["step-a", "step-b"]);

    let failed = &outcome.run_log.results()[1];
    assert_eq!(failed.exit_code, Some(1));
    assert_eq!(failed.stderr, "boom");
    assert!(matches!(failed.state, StepState::Failed { .. }));
}

#[tokio::test]
async fn test_all_steps_run_in_declaration_order() {
    let engine = ExecutionEngine::new(MockInvoker::new());

    let outcome = engine
        .execute(&definition(THREE_STEPS), &ExecutionContext::new())
        .await;

    assert_success(&outcome);
    assert_executed(&outcome, &["a", "b", "c"]);
    assert_eq!(outcome.state.completed_steps, 3);
    assert!(outcome.skipped.is_empty());
}

#[tokio::test]
async fn test_same_inputs_give_same_exit_codes() {
    let definition = definition(THREE_STEPS);
    let context = ExecutionContext::new().with_variable("branch", "devel");

    let mut runs = Vec::new();
    for _ in 0..2 {
        let engine = ExecutionEngine::new(MockInvoker::new().fails("step-c", 2, ""));
        let outcome = engine.execute(&definition, &context).await;
        runs.push((outcome.run_log.exit_codes(), engine.invoker().call_lines()));
    }

    assert_eq!(runs[0], runs[1]);
    assert_eq!(runs[0].0, vec![Some(0), Some(0), Some(2)]);
}

#[tokio::test]
async fn test_launch_failure_records_no_result() {
    let engine = ExecutionEngine::new(MockInvoker::new().launch_fails("step-b"));

    let outcome = engine
        .execute(&definition(THREE_STEPS), &ExecutionContext::new())
        .await;

    let error = assert_failed_at(&outcome, 1, "ProcessLaunchError");
    assert!(!error.process_started());
    assert_executed(&outcome, &["a"]);
    assert_eq!(outcome.skipped, vec!["c"]);
}

#[tokio::test]
async fn test_timeout_is_fatal() {
    let engine = ExecutionEngine::new(MockInvoker::new().times_out("step-a", 30));

    let outcome = engine
        .execute(&definition(THREE_STEPS), &ExecutionContext::new())
        .await;

    assert_failed_at(&outcome, 0, "ProcessTimeout");
    assert_executed(&outcome, &["a"]);
    assert!(matches!(
        outcome.run_log.results()[0].state,
        StepState::TimedOut { timeout_secs: 30, .. }
    ));
    assert_eq!(outcome.skipped, vec!["b", "c"]);
    assert_eq!(engine.invoker().call_count(), 1);
}
