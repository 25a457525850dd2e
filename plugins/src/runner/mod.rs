pub mod llm;
pub mod mock;
pub mod retrying;

pub use llm::{LlmAgentRunner, LlmHttpError, LlmHttpErrorKind};
pub use mock::MockAgentRunner;
pub use retrying::RetryingRunner;

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::BTreeMap;

    use crewline_core::api::{AgentConfig, CrewConfiguration, LlmConfig, RunMode, RunRequest};

    pub fn request(task_id: &str) -> RunRequest {
        let mut context = BTreeMap::new();
        context.insert("topic".to_string(), "rust".to_string());
        RunRequest {
            execution_id: "exec-1".to_string(),
            task_id: task_id.to_string(),
            agent: AgentConfig {
                agent_id: "writer".to_string(),
                name: "Writer".to_string(),
                role: "writer".to_string(),
                goal: "write clearly".to_string(),
                backstory: "ten years of docs".to_string(),
                tools: vec![],
                llm: LlmConfig {
                    model: "gpt-4o-mini".to_string(),
                    ..LlmConfig::default()
                },
                max_iterations: 3,
                crew_configuration: CrewConfiguration::default(),
            },
            description: format!("do {task_id}"),
            expected_output: "a paragraph".to_string(),
            context,
            mode: RunMode::Mock,
        }
    }
}
