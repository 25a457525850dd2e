use std::sync::Arc;

use crate::config::EngineConfig;
use crate::engine::CrewEngine;
use crate::error::EngineError;
use crate::events_out::{start_events_out, EventsOutTx};
use crate::executor::{DelegationPolicy, FirstReadyPolicy};
use crate::metering::{FreePricing, PricingTable};
use crate::runner::RunnerSet;
use crate::store::{CrewStore, ExecutionStore};

/// Collaborators the engine calls out to.
#[derive(Clone)]
pub struct Services {
    pub runners: RunnerSet,
    pub pricing: Arc<dyn PricingTable>,
    pub delegation: Arc<dyn DelegationPolicy>,
}

impl Services {
    /// Free pricing and first-ready delegation.
    pub fn new(runners: RunnerSet) -> Self {
        Self {
            runners,
            pricing: Arc::new(FreePricing),
            delegation: Arc::new(FirstReadyPolicy),
        }
    }

    pub fn with_pricing(mut self, pricing: Arc<dyn PricingTable>) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_delegation(mut self, delegation: Arc<dyn DelegationPolicy>) -> Self {
        self.delegation = delegation;
        self
    }
}

#[async_trait::async_trait]
pub trait ServicesFactory: Send + Sync {
    async fn build_services(&self, cfg: &EngineConfig) -> Result<Services, EngineError>;
}

/// Process-wide wiring: config, the events mirror and the services factory.
#[derive(Clone)]
pub struct AppContext {
    cfg: EngineConfig,
    events_out: Option<EventsOutTx>,
    services_factory: Option<Arc<dyn ServicesFactory>>,
}

impl AppContext {
    pub async fn new(
        cfg: EngineConfig,
        services_factory: Option<Arc<dyn ServicesFactory>>,
    ) -> Result<Self, EngineError> {
        let events_out = start_events_out(&cfg.events_out)
            .await
            .map_err(EngineError::Internal)?;
        Ok(Self {
            cfg,
            events_out,
            services_factory,
        })
    }

    pub fn cfg(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn events_out(&self) -> Option<EventsOutTx> {
        self.events_out.clone()
    }

    pub async fn build_services(&self) -> Result<Services, EngineError> {
        let Some(factory) = self.services_factory.as_ref() else {
            return Err(EngineError::Internal(
                "services_factory missing (cannot build runners/pricing)".into(),
            ));
        };
        factory.build_services(&self.cfg).await
    }

    /// Build an engine over the given stores using the configured services.
    pub async fn build_engine(
        &self,
        crews: Arc<dyn CrewStore>,
        store: Arc<dyn ExecutionStore>,
    ) -> Result<CrewEngine, EngineError> {
        let services = self.build_services().await?;
        Ok(CrewEngine::builder(crews, store)
            .services(services)
            .settings(self.cfg.engine.clone())
            .events_out(self.events_out())
            .build())
    }
}
