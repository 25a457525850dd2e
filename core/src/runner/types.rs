use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{Crew, CrewAgent, CrewConfiguration, LlmConfig, RunMode};

/// What a runner needs to know about the agent it impersonates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub agent_id: String,
    pub name: String,
    pub role: String,
    pub goal: String,
    pub backstory: String,
    pub tools: Vec<String>,
    pub llm: LlmConfig,
    pub max_iterations: u32,
    /// Crew-wide flags (verbose, memory, ...) passed through untouched.
    pub crew_configuration: CrewConfiguration,
}

impl AgentConfig {
    pub fn from_agent(crew: &Crew, agent: &CrewAgent) -> Self {
        Self {
            agent_id: agent.id.clone(),
            name: agent.name.clone(),
            role: agent.role.clone(),
            goal: agent.goal.clone(),
            backstory: agent.backstory.clone(),
            tools: agent.tools.clone(),
            llm: agent.llm.clone(),
            max_iterations: crew
                .configuration
                .max_iterations
                .map(|crew_max| crew_max.min(agent.max_iterations))
                .unwrap_or(agent.max_iterations),
            crew_configuration: crew.configuration.clone(),
        }
    }
}

/// One call into an agent runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub execution_id: String,
    pub task_id: String,
    pub agent: AgentConfig,
    pub description: String,
    pub expected_output: String,
    /// Input variables, task context and dependency outputs, merged.
    pub context: BTreeMap<String, String>,
    pub mode: RunMode,
}

/// Accepted result of a runner call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    pub output: String,
    /// Tokens of the accepted attempt only.
    pub tokens_used: u64,
    /// Attempts the adapter made internally, 1 if it succeeded first time.
    pub attempts: u32,
}

impl RunOutput {
    pub fn new(output: impl Into<String>, tokens_used: u64) -> Self {
        Self {
            output: output.into(),
            tokens_used,
            attempts: 1,
        }
    }
}
