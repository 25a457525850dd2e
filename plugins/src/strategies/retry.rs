use std::time::Duration;

use crewline_core::api::{RetryConfig, RetryStrategyPlugin, RunnerError};

/// Doubles the delay per attempt, capped at `max_delay_ms`.
pub struct ExponentialBackoffPlugin {
    config: RetryConfig,
}

/// Grows the delay by `base_delay_ms` per attempt, capped at `max_delay_ms`.
pub struct LinearRetryPlugin {
    config: RetryConfig,
}

/// Single attempt; transient failures surface immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRetryPlugin;

impl ExponentialBackoffPlugin {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl LinearRetryPlugin {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl RetryStrategyPlugin for ExponentialBackoffPlugin {
    fn name(&self) -> &str {
        "exponential-backoff"
    }

    fn next_delay(&self, attempt: u32, error: &RunnerError) -> Option<Duration> {
        if !self.should_retry(attempt, error) {
            return None;
        }
        let exp = 1u64 << attempt.saturating_sub(1).min(30);
        let delay = self.config.base_delay_ms.saturating_mul(exp);
        Some(Duration::from_millis(delay.min(self.config.max_delay_ms)))
    }

    fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }
}

impl RetryStrategyPlugin for LinearRetryPlugin {
    fn name(&self) -> &str {
        "linear"
    }

    fn next_delay(&self, attempt: u32, error: &RunnerError) -> Option<Duration> {
        if !self.should_retry(attempt, error) {
            return None;
        }
        let delay = self
            .config
            .base_delay_ms
            .saturating_mul(u64::from(attempt.max(1)));
        Some(Duration::from_millis(delay.min(self.config.max_delay_ms)))
    }

    fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }
}

impl RetryStrategyPlugin for NoRetryPlugin {
    fn name(&self) -> &str {
        "none"
    }

    fn next_delay(&self, _attempt: u32, _error: &RunnerError) -> Option<Duration> {
        None
    }

    fn max_attempts(&self) -> u32 {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transient() -> RunnerError {
        RunnerError::Transient("429 too many requests".to_string())
    }

    #[test]
    fn test_exponential_backoff() {
        let cfg = RetryConfig {
            base_delay_ms: 100,
            max_delay_ms: 1000,
            max_attempts: 3,
            strategy: "exponential-backoff".to_string(),
        };
        let plugin = ExponentialBackoffPlugin::new(cfg);
        assert_eq!(plugin.next_delay(1, &transient()).unwrap().as_millis(), 100);
        assert_eq!(plugin.next_delay(2, &transient()).unwrap().as_millis(), 200);
        assert_eq!(plugin.next_delay(3, &transient()), None);
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let cfg = RetryConfig {
            base_delay_ms: 400,
            max_delay_ms: 1000,
            max_attempts: 10,
            strategy: "exponential-backoff".to_string(),
        };
        let plugin = ExponentialBackoffPlugin::new(cfg);
        assert_eq!(plugin.next_delay(5, &transient()).unwrap().as_millis(), 1000);
    }

    #[test]
    fn test_linear_backoff() {
        let cfg = RetryConfig {
            base_delay_ms: 50,
            max_delay_ms: 200,
            max_attempts: 4,
            strategy: "linear".to_string(),
        };
        let plugin = LinearRetryPlugin::new(cfg);
        assert_eq!(plugin.next_delay(1, &transient()).unwrap().as_millis(), 50);
        assert_eq!(plugin.next_delay(3, &transient()).unwrap().as_millis(), 150);
        assert_eq!(plugin.next_delay(4, &transient()), None);
    }

    #[test]
    fn test_non_transient_errors_are_not_retried() {
        let plugin = ExponentialBackoffPlugin::new(RetryConfig::default());
        let fatal = RunnerError::Fatal("401 unauthorized".to_string());
        let failed = RunnerError::Failed("empty completion".to_string());
        assert_eq!(plugin.next_delay(1, &fatal), None);
        assert_eq!(plugin.next_delay(1, &failed), None);
    }

    #[test]
    fn test_no_retry() {
        assert_eq!(NoRetryPlugin.next_delay(1, &transient()), None);
        assert_eq!(NoRetryPlugin.max_attempts(), 1);
    }
}
