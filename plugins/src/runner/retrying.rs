use std::sync::Arc;

use async_trait::async_trait;
use crewline_core::api::{AgentRunner, RetryStrategyPlugin, RunOutput, RunRequest, RunnerError};

/// Retries transient failures of an inner runner.
///
/// Only the accepted attempt's output and tokens are reported; `attempts`
/// tells how many calls it took.
pub struct RetryingRunner {
    inner: Arc<dyn AgentRunner>,
    strategy: Arc<dyn RetryStrategyPlugin>,
}

impl RetryingRunner {
    pub fn new(inner: Arc<dyn AgentRunner>, strategy: Arc<dyn RetryStrategyPlugin>) -> Self {
        Self { inner, strategy }
    }
}

#[async_trait]
impl AgentRunner for RetryingRunner {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn run(&self, request: &RunRequest) -> Result<RunOutput, RunnerError> {
        let mut attempt = 1u32;
        loop {
            match self.inner.run(request).await {
                Ok(mut out) => {
                    out.attempts = attempt;
                    return Ok(out);
                }
                Err(err) => {
                    let Some(delay) = self.strategy.next_delay(attempt, &err) else {
                        return Err(err);
                    };
                    tracing::warn!(
                        target: "crewline.runner",
                        strategy = self.strategy.name(),
                        task_id = %request.task_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "retrying agent call: {}",
                        err
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use crewline_core::api::RetryConfig;

    use super::*;
    use crate::runner::test_support::request;
    use crate::strategies::{ExponentialBackoffPlugin, NoRetryPlugin};

    /// Fails transiently `failures` times, then succeeds.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
        error: fn() -> RunnerError,
    }

    impl Flaky {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                error: || RunnerError::Transient("503".to_string()),
            }
        }
    }

    #[async_trait]
    impl AgentRunner for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn run(&self, _request: &RunRequest) -> Result<RunOutput, RunnerError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.failures {
                return Err((self.error)());
            }
            Ok(RunOutput::new("done", 12))
        }
    }

    fn backoff(max_attempts: u32) -> Arc<dyn RetryStrategyPlugin> {
        Arc::new(ExponentialBackoffPlugin::new(RetryConfig {
            strategy: "exponential-backoff".to_string(),
            base_delay_ms: 1,
            max_delay_ms: 5,
            max_attempts,
        }))
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let inner = Arc::new(Flaky::new(2));
        let runner = RetryingRunner::new(inner.clone(), backoff(3));
        let out = runner.run(&request("A")).await.unwrap();
        assert_eq!(out.output, "done");
        assert_eq!(out.tokens_used, 12);
        assert_eq!(out.attempts, 3);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let inner = Arc::new(Flaky::new(5));
        let runner = RetryingRunner::new(inner.clone(), backoff(2));
        let err = runner.run(&request("A")).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let inner = Arc::new(Flaky {
            error: || RunnerError::Fatal("401".to_string()),
            ..Flaky::new(1)
        });
        let runner = RetryingRunner::new(inner.clone(), backoff(5));
        let err = runner.run(&request("A")).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_retry_strategy_makes_one_call() {
        let inner = Arc::new(Flaky::new(1));
        let runner = RetryingRunner::new(inner.clone(), Arc::new(NoRetryPlugin));
        assert!(runner.run(&request("A")).await.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }
}
