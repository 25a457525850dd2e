use std::sync::Arc;

use anyhow::{bail, Result};

use crewline_core::api::{
    AgentRunner, DelegationPolicy, EngineConfig, FirstReadyPolicy, PricingTable, RetryConfig,
    RetryStrategyPlugin, RunMode, RunnerSet,
};

use crate::delegation::LlmManagerPolicy;
use crate::pricing::StaticPricingTable;
use crate::runner::{LlmAgentRunner, MockAgentRunner, RetryingRunner};
use crate::strategies::{ExponentialBackoffPlugin, LinearRetryPlugin, NoRetryPlugin};

pub fn build_retry_strategy(cfg: &RetryConfig) -> Result<Arc<dyn RetryStrategyPlugin>> {
    match cfg.strategy.as_str() {
        "exponential-backoff" => Ok(Arc::new(ExponentialBackoffPlugin::new(cfg.clone()))),
        "linear" => Ok(Arc::new(LinearRetryPlugin::new(cfg.clone()))),
        "none" => Ok(Arc::new(NoRetryPlugin)),
        other => bail!("unknown retry strategy '{}'", other),
    }
}

/// Mock mode is always available; real mode only with an API key.
pub fn build_runners(cfg: &EngineConfig) -> Result<RunnerSet> {
    let mut runners = RunnerSet::new().with(RunMode::Mock, Arc::new(MockAgentRunner::new()));

    if cfg.llm.api_key.trim().is_empty() {
        tracing::debug!(target: "crewline.factory", "no llm api key configured, real mode disabled");
        return Ok(runners);
    }
    let llm: Arc<dyn AgentRunner> = Arc::new(LlmAgentRunner::new(&cfg.llm)?);
    let strategy = build_retry_strategy(&cfg.retry)?;
    runners = runners.with(RunMode::Real, Arc::new(RetryingRunner::new(llm, strategy)));
    Ok(runners)
}

pub fn build_pricing(cfg: &EngineConfig) -> Arc<dyn PricingTable> {
    Arc::new(StaticPricingTable::from_config(&cfg.pricing))
}

pub fn build_delegation(name: &str) -> Result<Arc<dyn DelegationPolicy>> {
    match name {
        "first-ready" => Ok(Arc::new(FirstReadyPolicy)),
        "llm-manager" => Ok(Arc::new(LlmManagerPolicy)),
        other => bail!("unknown delegation policy '{}'", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runners_without_api_key_are_mock_only() {
        let runners = build_runners(&EngineConfig::default()).unwrap();
        assert!(runners.supports(RunMode::Mock));
        assert!(!runners.supports(RunMode::Real));
    }

    #[test]
    fn test_runners_with_api_key_support_real_mode() {
        let mut cfg = EngineConfig::default();
        cfg.llm.api_key = "sk-test".to_string();
        let runners = build_runners(&cfg).unwrap();
        assert!(runners.supports(RunMode::Real));
        assert_eq!(runners.get(RunMode::Real).unwrap().name(), "llm");
    }

    #[test]
    fn test_retry_strategy_names() {
        let mut cfg = RetryConfig::default();
        assert_eq!(build_retry_strategy(&cfg).unwrap().name(), "exponential-backoff");
        cfg.strategy = "linear".to_string();
        assert_eq!(build_retry_strategy(&cfg).unwrap().name(), "linear");
        cfg.strategy = "none".to_string();
        assert_eq!(build_retry_strategy(&cfg).unwrap().max_attempts(), 1);
        cfg.strategy = "forever".to_string();
        assert!(build_retry_strategy(&cfg).is_err());
    }

    #[test]
    fn test_delegation_names() {
        assert_eq!(build_delegation("first-ready").unwrap().name(), "first-ready");
        assert_eq!(build_delegation("llm-manager").unwrap().name(), "llm-manager");
        assert!(build_delegation("coin-flip").is_err());
    }
}
