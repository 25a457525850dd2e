//! Agent runner adapter boundary.
//!
//! The engine never decides how an agent produces output; it hands a
//! `RunRequest` to the `AgentRunner` registered for the execution's mode.

pub mod traits;
pub mod types;

use std::collections::HashMap;
use std::sync::Arc;

pub use traits::{AgentRunner, RetryStrategyPlugin};
pub use types::{AgentConfig, RunOutput, RunRequest};

use crate::error::RunnerError;
use crate::model::RunMode;

/// Runners keyed by mode.
#[derive(Clone, Default)]
pub struct RunnerSet {
    runners: HashMap<RunMode, Arc<dyn AgentRunner>>,
}

impl RunnerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, mode: RunMode, runner: Arc<dyn AgentRunner>) -> Self {
        self.runners.insert(mode, runner);
        self
    }

    pub fn get(&self, mode: RunMode) -> Result<Arc<dyn AgentRunner>, RunnerError> {
        self.runners
            .get(&mode)
            .cloned()
            .ok_or_else(|| RunnerError::Unavailable(mode.to_string()))
    }

    pub fn supports(&self, mode: RunMode) -> bool {
        self.runners.contains_key(&mode)
    }
}
