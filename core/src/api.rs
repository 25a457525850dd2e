//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `crewline_core::api` instead of reaching into internal modules.

pub use crate::config::{
    get_crewline_data_dir, load_default, load_from_path, EngineConfig, EngineSettings,
    EventsOutConfig, HttpServerConfig, LlmServiceConfig, LoggingConfig, PricingConfig,
    RetryConfig,
};
pub use crate::context::{AppContext, Services, ServicesFactory};
pub use crate::engine::{CrewEngine, EngineBuilder, ProgressSnapshot, TriggerRequest};
pub use crate::error::{EngineError, ErrorKind, GraphError, RunnerError, StoreError};
pub use crate::events_out::EventsOutTx;
pub use crate::executor::{
    DelegationContext, DelegationDecision, DelegationPolicy, ExecutionPlan, FirstReadyPolicy,
    PlanSummary, ProcessPlan,
};
pub use crate::metering::{FreePricing, PricingTable};
pub use crate::model::{
    Crew, CrewAgent, CrewConfiguration, CrewExecution, CrewExecutionLog, CrewStats, CrewStatus,
    CrewTask, ExecutionStatus, LlmConfig, LogEvent, LogLevel, ProcessType, RunMode, TaskResult,
};
pub use crate::runner::{
    AgentConfig, AgentRunner, RetryStrategyPlugin, RunOutput, RunRequest, RunnerSet,
};
pub use crate::state::{ExecutionEvent, TransitionError};
pub use crate::store::{CrewStore, ExecutionStore, InMemoryStore};
