use crewline_core::api::{
    AppContext, CrewExecution, EngineError, ExecutionStatus, ProgressSnapshot, TaskResult,
    TriggerRequest,
};

use super::cli::RunArgs;
use super::engine_with_crews;
use crate::crews::{load_crew_file, parse_input_vars};
use crate::error::CliError;
use crate::progress::ProgressDisplay;

pub fn exit_code_for_status(status: ExecutionStatus) -> i32 {
    match status {
        ExecutionStatus::Completed => 0,
        ExecutionStatus::Cancelled => 2,
        _ => 1,
    }
}

pub async fn handle_run(args: RunArgs, ctx: &AppContext) -> Result<i32, CliError> {
    let crew = load_crew_file(&args.crew_file)?;
    let inputs = parse_input_vars(&args.inputs)?;
    let crew_id = crew.id.clone();
    let planned = crew.tasks.len();
    let (_store, engine) = engine_with_crews(ctx, vec![crew]).await?;

    let mut request = TriggerRequest::new(crew_id).triggered_by("cli");
    request.input_variables = inputs;
    if let Some(mode) = args.mode {
        request = request.mode(mode.into());
    }

    let events = engine.subscribe();
    let execution_id = engine.trigger(request).await?;
    tracing::info!(execution_id = %execution_id, "execution started");

    let display = ProgressDisplay::new(execution_id, planned, !args.json);
    let follower = tokio::spawn(display.clone().follow(events));

    let exec = tokio::select! {
        res = engine.wait(execution_id) => res?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!(execution_id = %execution_id, "interrupted, cancelling execution");
            match engine.cancel(execution_id).await {
                Ok(_) | Err(EngineError::InvalidStateTransition { .. }) => {}
                Err(e) => return Err(e.into()),
            }
            engine.wait(execution_id).await?
        }
    };
    follower.abort();
    display.finish(exec.status.to_string());
    engine.shutdown().await;

    if args.json {
        let snapshot = engine.poll(execution_id).await?;
        println!("{}", render_json(&snapshot)?);
    } else {
        println!("{}", render_summary(&exec));
    }
    Ok(exit_code_for_status(exec.status))
}

fn render_json(snapshot: &ProgressSnapshot) -> Result<String, CliError> {
    serde_json::to_string_pretty(snapshot).map_err(|e| CliError::Command(e.to_string()))
}

pub fn render_summary(exec: &CrewExecution) -> String {
    let mut out = format!(
        "execution {} {} (tokens: {}, cost: ${:.4})",
        exec.id, exec.status, exec.total_tokens_used, exec.cost
    );
    for (task_id, result) in &exec.results {
        match result {
            TaskResult::Completed { output, .. } => {
                out.push_str(&format!("\n[{}] {}", task_id, output.trim()));
            }
            TaskResult::Skipped { blocked_by } => {
                out.push_str(&format!("\n[{}] skipped (blocked by {})", task_id, blocked_by));
            }
        }
    }
    for task_id in &exec.failed_tasks {
        out.push_str(&format!("\n[{}] failed", task_id));
    }
    if let Some(msg) = &exec.error_message {
        out.push_str(&format!("\nerror: {}", msg));
    }
    out
}
