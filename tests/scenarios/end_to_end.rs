use crate::helpers::*;
use branchline::core::{ExecutionContext, PipelineDefinition, TriggerEvent};
use branchline::execution::ExecutionEngine;
use branchline::persistence::{create_summary, InMemoryPersistence, PersistenceBackend};

fn context_for(definition: &PipelineDefinition, branch: &str) -> ExecutionContext {
    definition
        .initial_context(&TriggerEvent::push(branch), &[])
        .with_secret("REGISTRY_TOKEN", "registry-token")
        .with_secret("AWS_ACCESS_KEY", "AKIA123")
        .with_secret("AWS_SECRET_KEY", "aws-secret")
        .with_variable("AWS_DEFAULT_REGION", "us-east-1")
}

#[tokio::test]
async fn test_devel_publishes_schema() {
    let definition = definition(FOUR_STEP_PIPELINE);
    let engine = ExecutionEngine::new(MockInvoker::new());

    let outcome = engine
        .run(
            &definition,
            &TriggerEvent::push("devel"),
            &context_for(&definition, "devel"),
        )
        .await;

    assert_success(&outcome);
    assert_executed(
        &outcome,
        &["build-image", "registry-login", "generate-schema", "upload"],
    );
    assert_eq!(outcome.artifacts.len(), 1);
    assert_eq!(outcome.artifacts[0].key, "devel/schema.json");
    assert_eq!(outcome.artifacts[0].file, "schema.json");
    assert_eq!(outcome.branch.as_deref(), Some("devel"));

    let upload = &engine.invoker().calls()[3];
    assert_eq!(
        upload.args,
        vec!["s3", "cp", "schema.json", "s3://schemas/devel/schema.json", "--acl", "public-read"]
    );
}

#[tokio::test]
async fn test_release_branch_key() {
    let definition = definition(FOUR_STEP_PIPELINE);
    let engine = ExecutionEngine::new(MockInvoker::new());

    let outcome = engine
        .run(
            &definition,
            &TriggerEvent::push("release_1.2"),
            &context_for(&definition, "release_1.2"),
        )
        .await;

    assert_success(&outcome);
    assert_eq!(outcome.artifacts[0].key, "release_1.2/schema.json");
}

#[tokio::test]
async fn test_demo_pipeline_end_to_end() {
    let definition = schema_publish();
    let context = context_for(&definition, "feature_login").with_variable("workspace", "/work");
    let engine = ExecutionEngine::new(MockInvoker::new().on("print version", 0, "\n1.4.0\n"));

    let outcome = engine
        .run(&definition, &TriggerEvent::push("feature_login"), &context)
        .await;

    assert_success(&outcome);
    assert_eq!(outcome.captured.get("version").map(String::as_str), Some("1.4.0"));
    assert_eq!(outcome.artifacts[0].key, "feature_login/schema.json");

    let calls = engine.invoker().calls();
    assert_eq!(calls.len(), 5);
    assert_eq!(
        calls[1].args,
        vec!["build", "-t", "registry.example.org/platform/dev:1.4.0", "."]
    );
    assert_eq!(calls[2].program, "sh");
    assert_eq!(calls[2].args.last().map(String::as_str), Some("registry.example.org/platform"));
    assert!(calls[3]
        .args
        .contains(&"registry.example.org/platform/dev:1.4.0".to_string()));
    assert!(calls[3].args.contains(&"/work:/src".to_string()));

    let upload = &calls[4];
    assert_eq!(upload.env.get("AWS_ACCESS_KEY_ID").map(String::as_str), Some("AKIA123"));
    assert_eq!(upload.env.get("AWS_SECRET_ACCESS_KEY").map(String::as_str), Some("aws-secret"));
    assert_eq!(upload.timeout_secs, Some(300));
}

#[tokio::test]
async fn test_outcome_is_recorded_in_history() {
    let definition = definition(FOUR_STEP_PIPELINE);
    let engine = ExecutionEngine::new(MockInvoker::new().fails("docker login", 1, "denied"));
    let store = InMemoryPersistence::new();

    let outcome = engine
        .run(
            &definition,
            &TriggerEvent::push("devel"),
            &context_for(&definition, "devel"),
        )
        .await;
    store.save_execution(&create_summary(&outcome)).await.unwrap();

    let saved = store
        .load_execution(outcome.execution_id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(saved.pipeline_name, "schema-publish");
    assert_eq!(saved.branch.as_deref(), Some("devel"));
    assert_eq!(saved.failed_step, Some(1));
    assert_eq!(saved.error.as_deref(), Some("process exited with code 1"));
    assert_eq!(saved.steps.len(), 2);
    assert_eq!(saved.steps[1].exit_code, Some(1));
    assert!(saved.artifacts.is_empty());
}
