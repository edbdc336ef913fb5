use crate::helpers::*;
use branchline::core::{ExecutionContext, TriggerEvent};
use branchline::execution::{ExecutionEngine, ExecutionEvent, StepError};
use std::sync::{Arc, Mutex};

fn context_without_access_key() -> ExecutionContext {
    definition(FOUR_STEP_PIPELINE)
        .initial_context(&TriggerEvent::push("devel"), &[])
        .with_secret("REGISTRY_TOKEN", "registry-token")
        .with_secret("AWS_SECRET_KEY", "aws-secret")
        .with_variable("AWS_DEFAULT_REGION", "us-east-1")
}

#[tokio::test]
async fn test_missing_access_key_fails_before_upload() {
    let definition = definition(FOUR_STEP_PIPELINE);
    let engine = ExecutionEngine::new(MockInvoker::new());

    let outcome = engine
        .run(&definition, &TriggerEvent::push("devel"), &context_without_access_key())
        .await;

    let error = assert_failed_at(&outcome, 3, "MissingVariable");
    assert!(matches!(error, StepError::MissingVariable { key } if key == "AWS_ACCESS_KEY"));
    assert_executed(&outcome, &["build-image", "registry-login", "generate-schema"]);
    assert_eq!(engine.invoker().call_count(), 3);
    assert!(!engine
        .invoker()
        .call_lines()
        .iter()
        .any(|line| line.starts_with("aws")));
    assert!(outcome.artifacts.is_empty());
}

#[tokio::test]
async fn test_required_env_reaches_the_process() {
    let definition = definition(FOUR_STEP_PIPELINE);
    let context = context_without_access_key().with_secret("AWS_ACCESS_KEY", "AKIA123");
    let engine = ExecutionEngine::new(MockInvoker::new());

    let outcome = engine
        .run(&definition, &TriggerEvent::push("devel"), &context)
        .await;
    assert_success(&outcome);

    let calls = engine.invoker().calls();
    let login = &calls[1];
    assert_eq!(login.env.get("REGISTRY_TOKEN").map(String::as_str), Some("registry-token"));
    assert_eq!(login.env.len(), 1);

    let upload = &calls[3];
    assert_eq!(upload.env.get("AWS_ACCESS_KEY").map(String::as_str), Some("AKIA123"));
    assert_eq!(upload.env.get("AWS_DEFAULT_REGION").map(String::as_str), Some("us-east-1"));

    // Unrequested secrets are not exported, and are scrubbed from the
    // inherited environment
    assert!(!calls[0].env.contains_key("AWS_SECRET_KEY"));
    assert!(calls[0].withheld_env.contains("AWS_SECRET_KEY"));
    assert!(!upload.withheld_env.contains("AWS_SECRET_KEY"));
}

#[tokio::test]
async fn test_secrets_are_redacted_from_results_and_events() {
    let yaml = r#"
name: "leaky"
secrets: ["TOKEN"]
steps:
  - id: "echo"
    run: ["echo", "{{ TOKEN }}"]
"#;
    let definition = definition(yaml);
    let context = ExecutionContext::new().with_secret("TOKEN", "s3cr3t-value");
    let mut engine =
        ExecutionEngine::new(MockInvoker::new().on("echo", 0, "token is s3cr3t-value\n"));

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    engine.add_event_handler(move |event| sink.lock().unwrap().push(event));

    let outcome = engine.execute(&definition, &context).await;
    assert_success(&outcome);

    // The process itself sees the real value
    assert_eq!(engine.invoker().calls()[0].args, vec!["s3cr3t-value"]);

    let result = &outcome.run_log.results()[0];
    assert_eq!(result.stdout, "token is [REDACTED]\n");

    for event in events.lock().unwrap().iter() {
        assert!(!format!("{:?}", event).contains("s3cr3t-value"));
        if let ExecutionEvent::StepStarted { command, .. } = event {
            assert_eq!(command, "echo [REDACTED]");
        }
    }
}

#[tokio::test]
async fn test_container_step_is_wrapped() {
    let definition = definition(FOUR_STEP_PIPELINE);
    let context = context_without_access_key().with_secret("AWS_ACCESS_KEY", "AKIA123");
    let engine = ExecutionEngine::new(MockInvoker::new());

    engine
        .run(&definition, &TriggerEvent::push("devel"), &context)
        .await;

    let generate = &engine.invoker().calls()[2];
    assert_eq!(generate.program, "docker");
    assert_eq!(
        generate.args,
        vec![
            "run",
            "--rm",
            "-v",
            "/work:/src",
            "-w",
            "/src",
            "registry.example.org/platform/dev:1.4.0",
            "sbt",
            "test:runMain GenerateSchema",
        ]
    );
}
