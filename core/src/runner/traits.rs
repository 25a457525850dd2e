use std::time::Duration;

use async_trait::async_trait;

use super::types::{RunOutput, RunRequest};
use crate::error::RunnerError;

/// Agent runner adapter: executes one task with one agent.
///
/// Implementations may retry transient failures internally but must report
/// only the finally accepted result.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, request: &RunRequest) -> Result<RunOutput, RunnerError>;
}

/// Backoff policy for transient failures inside an adapter.
pub trait RetryStrategyPlugin: Send + Sync {
    fn name(&self) -> &str;
    fn next_delay(&self, attempt: u32, error: &RunnerError) -> Option<Duration>;
    fn max_attempts(&self) -> u32;
    fn should_retry(&self, attempt: u32, error: &RunnerError) -> bool {
        attempt < self.max_attempts() && !self.is_fatal_error(error)
    }
    fn is_fatal_error(&self, error: &RunnerError) -> bool {
        !error.is_transient()
    }
}
