//! `ServicesFactory` that wires runners, pricing and delegation from config.
use async_trait::async_trait;
use crewline_core::api::{EngineConfig, EngineError, Services, ServicesFactory};

use crate::factory;

#[derive(Debug, Default, Clone, Copy)]
pub struct PluginServicesFactory;

#[async_trait]
impl ServicesFactory for PluginServicesFactory {
    async fn build_services(&self, cfg: &EngineConfig) -> Result<Services, EngineError> {
        let plugin_err = |e: anyhow::Error| EngineError::Config(format!("{e:#}"));
        let runners = factory::build_runners(cfg).map_err(plugin_err)?;
        let delegation =
            factory::build_delegation(&cfg.engine.delegation_policy).map_err(plugin_err)?;
        Ok(Services::new(runners)
            .with_pricing(factory::build_pricing(cfg))
            .with_delegation(delegation))
    }
}

#[cfg(test)]
mod tests {
    use crewline_core::api::RunMode;

    use super::*;

    #[tokio::test]
    async fn test_default_config_builds_mock_services() {
        let services = PluginServicesFactory
            .build_services(&EngineConfig::default())
            .await
            .unwrap();
        assert!(services.runners.supports(RunMode::Mock));
        assert_eq!(services.delegation.name(), "first-ready");
        assert_eq!(services.pricing.cost("any", 1000), 0.0);
    }

    #[tokio::test]
    async fn test_unknown_delegation_policy_is_an_error() {
        let mut cfg = EngineConfig::default();
        cfg.engine.delegation_policy = "coin-flip".to_string();
        let err = PluginServicesFactory.build_services(&cfg).await.err().unwrap();
        assert!(err.to_string().contains("coin-flip"));
    }
}
