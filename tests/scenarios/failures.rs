use crate::helpers::*;
use branchline::core::{ExecutionContext, PipelineDefinition, TriggerEvent};
use branchline::execution::{ExecutionEngine, ExecutionEvent, StepError};
use std::sync::{Arc, Mutex};

fn full_context(definition: &PipelineDefinition) -> ExecutionContext {
    definition
        .initial_context(&TriggerEvent::push("devel"), &[])
        .with_secret("REGISTRY_TOKEN", "registry-token")
        .with_secret("AWS_ACCESS_KEY", "AKIA123")
        .with_secret("AWS_SECRET_KEY", "aws-secret")
        .with_variable("AWS_DEFAULT_REGION", "us-east-1")
}

#[tokio::test]
async fn test_failed_upload_is_upload_failure() {
    let definition = definition(FOUR_STEP_PIPELINE);
    let engine = ExecutionEngine::new(MockInvoker::new().fails("aws s3 cp", 1, "AccessDenied"));

    let outcome = engine
        .run(&definition, &TriggerEvent::push("devel"), &full_context(&definition))
        .await;

    let error = assert_failed_at(&outcome, 3, "UploadFailure");
    match error {
        StepError::UploadFailure { file, key, reason } => {
            assert_eq!(file, "schema.json");
            assert_eq!(key, "devel/schema.json");
            assert_eq!(reason, "process exited with code 1");
        }
        other => panic!("expected UploadFailure, got {:?}", other),
    }
    assert!(outcome.artifacts.is_empty());
    assert_eq!(outcome.run_log.len(), 4);
}

#[tokio::test]
async fn test_failure_event_carries_step_output() {
    let definition = definition(FOUR_STEP_PIPELINE);
    let mut engine = ExecutionEngine::new(
        MockInvoker::new().fails("docker build", 125, "unable to prepare context"),
    );

    let failures = Arc::new(Mutex::new(Vec::new()));
    let sink = failures.clone();
    engine.add_event_handler(move |event| {
        if let ExecutionEvent::StepFailed { index, step_id, error, output } = event {
            sink.lock().unwrap().push((index, step_id, error, output));
        }
    });

    let outcome = engine
        .run(&definition, &TriggerEvent::push("devel"), &full_context(&definition))
        .await;

    assert_failed_at(&outcome, 0, "ProcessFailure");
    assert_eq!(
        *failures.lock().unwrap(),
        vec![(
            0,
            "build-image".to_string(),
            "process exited with code 125".to_string(),
            "unable to prepare context".to_string(),
        )]
    );
    assert_eq!(
        outcome.skipped,
        vec!["registry-login", "generate-schema", "upload"]
    );
}
