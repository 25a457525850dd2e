use crewline_core::api::{AppContext, PlanSummary, ProcessType};

use super::cli::ValidateArgs;
use super::engine_with_crews;
use crate::crews::load_crew_file;
use crate::error::CliError;

pub async fn handle_validate(args: ValidateArgs, ctx: &AppContext) -> Result<i32, CliError> {
    let crew = load_crew_file(&args.crew_file)?;
    let (_store, engine) = engine_with_crews(ctx, vec![]).await?;
    let summary = engine.validate_crew(&crew)?;

    if args.json {
        let out = serde_json::to_string_pretty(&summary)
            .map_err(|e| CliError::Command(e.to_string()))?;
        println!("{out}");
    } else {
        println!("{}", render_plan(&crew.id, &summary));
    }
    Ok(0)
}

pub fn render_plan(crew_id: &str, summary: &PlanSummary) -> String {
    let mut out = format!("crew '{}' is valid ({})", crew_id, summary.process_type);
    match summary.process_type {
        ProcessType::Sequential => {
            let order = summary.steps.first().map(|s| s.join(" -> ")).unwrap_or_default();
            out.push_str(&format!("\n  order: {}", order));
        }
        ProcessType::Hierarchical => {
            if let Some(manager) = &summary.manager {
                out.push_str(&format!("\n  manager: {}", manager));
            }
            for (i, level) in summary.steps.iter().enumerate() {
                out.push_str(&format!("\n  level {}: {}", i + 1, level.join(", ")));
            }
        }
    }
    out
}
