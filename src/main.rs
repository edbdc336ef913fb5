use anyhow::{Context, Result};
use branchline::cli::commands::{HistoryCommand, ListCommand, MatchesCommand, RunCommand, ValidateCommand};
use branchline::cli::output::*;
use branchline::cli::{Cli, Command};
use branchline::core::config::PipelineConfig;
use branchline::core::{ExecutionContext, ExecutionStatus, PipelineDefinition, TriggerEvent};
use branchline::execution::{EnvironmentBinder, ExecutionEngine, ExecutionEvent, RunOutcome, SubprocessInvoker};
use branchline::persistence::{create_summary, ExecutionSummary, PersistenceBackend};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::from_args();

    // Initialize logging; --verbose wins over RUST_LOG
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    // Execute command
    match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd).await,
        Command::Validate(cmd) => validate_pipeline(cmd),
        Command::Matches(cmd) => match_branch(cmd),
        Command::List(cmd) => list_pipelines(cmd).await,
        Command::History(cmd) => show_history(cmd).await,
    }
}

#[cfg(feature = "sqlite")]
async fn open_store() -> Result<Arc<dyn PersistenceBackend>> {
    Ok(Arc::new(
        branchline::persistence::SqliteExecutionStore::with_default_path().await?,
    ))
}

#[cfg(not(feature = "sqlite"))]
async fn open_store() -> Result<Arc<dyn PersistenceBackend>> {
    Ok(Arc::new(branchline::persistence::InMemoryPersistence::new()))
}

fn load_definition(file: &str) -> Result<PipelineDefinition> {
    let config = PipelineConfig::from_file(file).context("Failed to load pipeline config")?;
    Ok(config.to_definition())
}

async fn run_pipeline(cmd: &RunCommand) -> Result<ExitCode> {
    let definition = load_definition(&cmd.file)?;

    println!(
        "{} Loaded pipeline: {}",
        INFO,
        style(&definition.name).bold()
    );

    let event = match &cmd.branch {
        Some(branch) => TriggerEvent::push(branch.clone()),
        None => TriggerEvent::manual(),
    };

    for (key, value) in &cmd.var {
        println!(
            "{} Variable override: {} = {}",
            INFO,
            style(key).cyan(),
            style(value).dim()
        );
    }
    let context = definition.initial_context(&event, &cmd.var);

    if cmd.dry_run {
        return Ok(dry_run(&definition, &event, &context));
    }

    let progress = create_progress_bar(definition.steps().len());
    let mut engine = ExecutionEngine::new(SubprocessInvoker::new());

    // Set up event handler for console output
    let bar = progress.clone();
    engine.add_event_handler(move |event| {
        bar.suspend(|| println!("{}", format_execution_event(&event)));
        match &event {
            ExecutionEvent::StepStarted { step_id, .. } => bar.set_message(step_id.clone()),
            ExecutionEvent::StepSucceeded { .. } => bar.inc(1),
            _ => {}
        }
    });

    println!("{}", style(separator()).dim());
    let outcome = engine.run(&definition, &event, &context).await;
    progress.finish_and_clear();
    println!("{}", style(separator()).dim());

    // History is best effort; the exit code reflects the run alone
    if !cmd.no_history {
        if let Err(e) = save_history(&outcome).await {
            warn!("Execution not saved to history: {:#}", e);
        }
    }

    Ok(report_outcome(&outcome))
}

async fn save_history(outcome: &RunOutcome) -> Result<()> {
    let summary = create_summary(outcome);
    let store = open_store().await?;
    store.save_execution(&summary).await?;
    println!(
        "{} Execution saved to history (ID: {})",
        INFO,
        style(&summary.execution_id.to_string()[..8]).dim()
    );
    Ok(())
}

fn report_outcome(outcome: &RunOutcome) -> ExitCode {
    match outcome.status() {
        ExecutionStatus::Completed => {
            for artifact in &outcome.artifacts {
                println!("{} Published {}", PACKAGE, style(&artifact.key).cyan());
            }
            println!(
                "\n{} {} completed {}",
                CHECK,
                style(&outcome.pipeline_name).bold(),
                style("successfully").green()
            );
            ExitCode::SUCCESS
        }
        ExecutionStatus::NotTriggered => {
            println!(
                "\n{} {} has nothing to do for this branch",
                INFO,
                style(&outcome.pipeline_name).bold()
            );
            ExitCode::SUCCESS
        }
        _ => {
            println!(
                "\n{} {} {}",
                CROSS,
                style(&outcome.pipeline_name).bold(),
                style("failed").red()
            );
            if let Some(failure) = &outcome.failure {
                error!(
                    "Step {} ({}) failed: {}",
                    failure.index + 1,
                    failure.step_id,
                    failure.error
                );
            }
            ExitCode::FAILURE
        }
    }
}

fn dry_run(definition: &PipelineDefinition, event: &TriggerEvent, context: &ExecutionContext) -> ExitCode {
    if !definition.is_triggered_by(event) {
        println!(
            "{} {} would not run for {}",
            INFO,
            style(&definition.name).bold(),
            style(event.branch.as_deref().unwrap_or("a manual run")).cyan()
        );
        return ExitCode::SUCCESS;
    }

    println!("{} Dry run, nothing will be executed", INFO);
    let mut ok = true;
    for planned in EnvironmentBinder::new().plan(definition, context) {
        match &planned.bound {
            Ok(bound) => {
                println!(
                    "  {:>2}. {} {}",
                    planned.index + 1,
                    style(&planned.step_id).cyan(),
                    style(format!("$ {}", context.redact(&bound.command.display_line()))).dim()
                );
                if let Some(publish) = &bound.publish {
                    println!("      {} {} → {}", PACKAGE, publish.file, style(&publish.key).cyan());
                }
            }
            Err(e) => {
                ok = false;
                println!(
                    "  {:>2}. {} {}",
                    planned.index + 1,
                    style(&planned.step_id).red(),
                    style(e).red()
                );
            }
        }
    }

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<ExitCode> {
    println!("{} Validating pipeline...", INFO);

    match PipelineConfig::from_file(&cmd.file) {
        Ok(config) => {
            println!("{} Pipeline configuration is valid!", CHECK);
            println!("  Name: {}", style(&config.name).bold());
            match &config.triggers {
                Some(triggers) => println!("  Triggers: {}", style(triggers.branches.join(", ")).cyan()),
                None => println!("  Triggers: {}", style("every branch").dim()),
            }
            println!("  Steps: {}", style(config.steps.len()).cyan());
            println!("  Variables: {}", style(config.variable_count()).cyan());
            println!("  Secrets: {}", style(config.secrets.len()).cyan());

            let definition = config.to_definition();
            let unresolved = definition.unresolved_names();
            if !unresolved.is_empty() {
                println!(
                    "{} Not bound by the pipeline (pass with --var or the environment): {}",
                    WARN,
                    style(unresolved.join(", ")).yellow()
                );
            }

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            Ok(ExitCode::FAILURE)
        }
    }
}

fn match_branch(cmd: &MatchesCommand) -> Result<ExitCode> {
    let definition = load_definition(&cmd.file)?;
    let triggered = definition.is_triggered_by(&TriggerEvent::push(cmd.branch.clone()));

    if let Some(triggers) = &definition.triggers {
        let patterns: Vec<&str> = triggers.patterns().collect();
        println!("{} Patterns: {}", INFO, style(patterns.join(", ")).dim());
    }

    if triggered {
        println!(
            "{} {} triggers {}",
            CHECK,
            style(&cmd.branch).cyan(),
            style(&definition.name).bold()
        );
        Ok(ExitCode::SUCCESS)
    } else {
        println!(
            "{} {} does not trigger {}",
            CROSS,
            style(&cmd.branch).cyan(),
            style(&definition.name).bold()
        );
        Ok(ExitCode::FAILURE)
    }
}

async fn list_pipelines(cmd: &ListCommand) -> Result<ExitCode> {
    let store = open_store().await?;
    let pipelines = store.list_pipelines().await?;

    if cmd.json {
        let mut json_data = Vec::new();
        for pipeline in &pipelines {
            let executions = store.list_executions(pipeline).await?;
            json_data.push(serde_json::json!({
                "name": pipeline,
                "execution_count": executions.len()
            }));
        }
        let data = serde_json::json!({ "pipelines": json_data });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(ExitCode::SUCCESS);
    }

    if pipelines.is_empty() {
        println!("{} No pipelines found in history", INFO);
        return Ok(ExitCode::SUCCESS);
    }

    println!("{} Pipelines in history:", INFO);

    for pipeline_name in &pipelines {
        if cmd.with_counts {
            let executions = store.list_executions(pipeline_name).await?;
            let count = |status: ExecutionStatus| executions.iter().filter(|e| e.status == status).count();
            println!(
                "  {} ({} runs: {} succeeded, {} failed, {} not triggered)",
                style(pipeline_name).bold(),
                style(executions.len()).cyan(),
                style(count(ExecutionStatus::Completed)).green(),
                style(count(ExecutionStatus::Failed)).red(),
                style(count(ExecutionStatus::NotTriggered)).dim()
            );
        } else {
            println!("  {}", style(pipeline_name).bold());
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn show_history(cmd: &HistoryCommand) -> Result<ExitCode> {
    let store = open_store().await?;

    // If specific execution ID is requested
    if let Some(exec_id_str) = &cmd.execution_id {
        let exec_id = uuid::Uuid::parse_str(exec_id_str).context("Invalid execution ID format")?;

        match store.load_execution(exec_id).await? {
            Some(summary) if cmd.json => {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
            Some(summary) => print_execution_details(&summary),
            None => {
                println!("{} Execution not found", WARN);
                return Ok(ExitCode::FAILURE);
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    // List executions for pipeline or all
    let mut executions = match &cmd.pipeline {
        Some(pipeline_name) => store.list_executions(pipeline_name).await?,
        None => {
            let mut all_execs = Vec::new();
            for pipeline in store.list_pipelines().await? {
                all_execs.extend(store.list_executions(&pipeline).await?);
            }
            all_execs
        }
    };
    executions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    executions.truncate(cmd.limit);

    if cmd.json {
        let data = serde_json::json!({ "executions": executions });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(ExitCode::SUCCESS);
    }

    if executions.is_empty() {
        println!("{} No executions found", INFO);
        return Ok(ExitCode::SUCCESS);
    }

    println!("{} Execution history (showing latest {}):", INFO, executions.len());
    for summary in &executions {
        println!("  {}", format_execution_summary(summary));
    }

    Ok(ExitCode::SUCCESS)
}

fn print_execution_details(summary: &ExecutionSummary) {
    println!("{} Execution Details", INFO);
    println!("  ID: {}", style(summary.execution_id).cyan());
    println!("  Pipeline: {}", style(&summary.pipeline_name).bold());
    println!("  Branch: {}", summary.branch.as_deref().unwrap_or("(manual)"));
    println!("  Status: {}", format_status(summary.status));
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        if let Ok(duration) = completed.signed_duration_since(summary.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }
    println!(
        "  Progress: {} ({}/{})",
        style(format!("{:.0}%", summary.progress * 100.0)).cyan(),
        summary.completed_steps,
        summary.total_steps
    );
    if let Some(error) = &summary.error {
        println!("  Error: {}", style(error).red());
    }
    for key in &summary.artifacts {
        println!("  Artifact: {}", style(key).cyan());
    }

    if !summary.steps.is_empty() {
        println!("\n  {}", style("Steps:").bold());
        for step in &summary.steps {
            println!("    {}", format_step_summary(step));
        }
    }
}
