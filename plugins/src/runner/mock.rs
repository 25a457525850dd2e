use std::collections::HashSet;

use async_trait::async_trait;
use crewline_core::api::{AgentRunner, RunOutput, RunRequest, RunnerError};

/// Deterministic runner for `mock` mode: canned output, no network, no cost.
#[derive(Debug, Clone, Default)]
pub struct MockAgentRunner {
    output: Option<String>,
    tokens: u64,
    fail_on: HashSet<String>,
}

impl MockAgentRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixed output for every call instead of the generated one.
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_tokens(mut self, tokens: u64) -> Self {
        self.tokens = tokens;
        self
    }

    /// Make calls for `task_id` fail with a non-retryable error.
    pub fn fail_on(mut self, task_id: impl Into<String>) -> Self {
        self.fail_on.insert(task_id.into());
        self
    }

    fn render(&self, request: &RunRequest) -> String {
        match &self.output {
            Some(out) => out.clone(),
            None => format!(
                "[mock:{}] {} -> {}",
                request.agent.role, request.task_id, request.expected_output
            ),
        }
    }
}

#[async_trait]
impl AgentRunner for MockAgentRunner {
    fn name(&self) -> &str {
        "mock"
    }

    async fn run(&self, request: &RunRequest) -> Result<RunOutput, RunnerError> {
        tracing::debug!(
            target: "crewline.runner",
            runner = "mock",
            execution_id = %request.execution_id,
            task_id = %request.task_id,
            context_keys = request.context.len()
        );
        if self.fail_on.contains(&request.task_id) {
            return Err(RunnerError::Failed(format!(
                "mock failure for task '{}'",
                request.task_id
            )));
        }
        Ok(RunOutput::new(self.render(request), self.tokens))
    }
}
