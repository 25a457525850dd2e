//! Manager delegation backed by the manager agent itself.

use async_trait::async_trait;
use crewline_core::api::{
    AgentConfig, DelegationContext, DelegationDecision, DelegationPolicy, RunRequest, RunnerError,
};

/// Task id used for the manager's own runner call.
pub const DELEGATION_TASK_ID: &str = "manager-delegation";

/// Asks the manager agent which ready task to dispatch next and to whom.
///
/// The answer must contain `task=<id>;agent=<id>`. Anything else, or a pick
/// outside the ready set, falls back to the first ready task; the tokens the
/// manager spent are kept on the decision either way.
#[derive(Debug, Default, Clone, Copy)]
pub struct LlmManagerPolicy;

impl LlmManagerPolicy {
    fn request(ctx: &DelegationContext<'_>) -> RunRequest {
        let crew = ctx.crew;
        let manager = &crew.agents[ctx.manager];

        let mut description = String::from("Choose the next task to run and the agent to run it.\n\nReady tasks:");
        for &idx in ctx.ready {
            let task = &crew.tasks[idx];
            description.push_str(&format!(
                "\n- {} (assigned: {}): {}",
                task.id,
                task.agent_id.as_deref().unwrap_or("none"),
                task.description
            ));
        }
        description.push_str("\n\nAgents:");
        for agent in &crew.agents {
            description.push_str(&format!("\n- {} ({}): {}", agent.id, agent.role, agent.goal));
        }

        let mut context = ctx.input_variables.clone();
        context.extend(ctx.outputs.iter().map(|(k, v)| (k.clone(), v.clone())));

        RunRequest {
            execution_id: ctx.execution_id.to_string(),
            task_id: DELEGATION_TASK_ID.to_string(),
            agent: AgentConfig::from_agent(crew, manager),
            description,
            expected_output: "Exactly one line: task=<task id>;agent=<agent id>".to_string(),
            context,
            mode: ctx.mode,
        }
    }
}

/// Pulls `(task, agent)` out of an answer like `task=B; agent=writer`.
pub fn parse_assignment(answer: &str) -> Option<(String, String)> {
    let mut task = None;
    let mut agent = None;
    for part in answer.split(|c: char| c == ';' || c.is_whitespace() || c == ',') {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'' || c == '`');
        if value.is_empty() {
            continue;
        }
        match key.trim().to_ascii_lowercase().as_str() {
            "task" if task.is_none() => task = Some(value.to_string()),
            "agent" if agent.is_none() => agent = Some(value.to_string()),
            _ => {}
        }
    }
    Some((task?, agent?))
}

#[async_trait]
impl DelegationPolicy for LlmManagerPolicy {
    fn name(&self) -> &str {
        "llm-manager"
    }

    async fn decide(
        &self,
        ctx: &DelegationContext<'_>,
    ) -> Result<DelegationDecision, RunnerError> {
        let out = ctx.runner.run(&Self::request(ctx)).await?;
        let answer = out.output.trim();

        let chosen = parse_assignment(answer).and_then(|(task_id, agent_id)| {
            let task_index = ctx
                .ready
                .iter()
                .copied()
                .find(|&i| ctx.crew.tasks[i].id == task_id)?;
            let agent_index = ctx.crew.agent_index(&agent_id)?;
            Some((task_index, agent_index))
        });

        match chosen {
            Some((task_index, agent_index)) => Ok(DelegationDecision {
                task_index,
                agent_index,
                rationale: answer.to_string(),
                tokens_used: out.tokens_used,
                fallback_reason: None,
            }),
            None => {
                tracing::warn!(
                    target: "crewline.delegation",
                    execution_id = %ctx.execution_id,
                    answer = %answer,
                    "manager answer not usable, falling back to first ready task"
                );
                let mut decision = ctx.first_ready();
                decision.tokens_used = out.tokens_used;
                decision.fallback_reason =
                    Some(format!("unusable manager answer: {}", answer));
                Ok(decision)
            }
        }
    }
}
