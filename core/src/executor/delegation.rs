//! Manager delegation for hierarchical crews.
//!
//! For each ready set the scheduler asks a `DelegationPolicy` which task to
//! dispatch next and to which agent. The decision is logged as a
//! `manager_delegation` row whatever the policy.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::RunnerError;
use crate::model::{Crew, RunMode};
use crate::runner::AgentRunner;

/// What a policy sees when asked for the next dispatch.
pub struct DelegationContext<'a> {
    pub execution_id: Uuid,
    pub crew: &'a Crew,
    /// Index of the manager agent in `crew.agents`.
    pub manager: usize,
    /// Ready task indices, lowest `order` first. Never empty.
    pub ready: &'a [usize],
    /// Outputs of the tasks completed so far, by task id.
    pub outputs: &'a BTreeMap<String, String>,
    pub input_variables: &'a BTreeMap<String, String>,
    pub mode: RunMode,
    pub runner: Arc<dyn AgentRunner>,
}

impl DelegationContext<'_> {
    /// The deterministic choice: first ready task, to its assigned agent or
    /// to the manager when unassigned.
    pub fn first_ready(&self) -> DelegationDecision {
        let task_index = self.ready[0];
        let agent_index = self.crew.tasks[task_index]
            .agent_id
            .as_deref()
            .and_then(|id| self.crew.agent_index(id))
            .unwrap_or(self.manager);
        DelegationDecision {
            task_index,
            agent_index,
            rationale: "first ready task".to_string(),
            tokens_used: 0,
            fallback_reason: None,
        }
    }

    pub fn is_ready(&self, task_index: usize) -> bool {
        self.ready.contains(&task_index)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DelegationDecision {
    pub task_index: usize,
    pub agent_index: usize,
    pub rationale: String,
    /// Tokens the manager spent deciding; recorded on the delegation row only.
    pub tokens_used: u64,
    /// Set when the policy could not use its own answer and fell back.
    pub fallback_reason: Option<String>,
}

#[async_trait]
pub trait DelegationPolicy: Send + Sync {
    fn name(&self) -> &str;

    async fn decide(&self, ctx: &DelegationContext<'_>)
        -> Result<DelegationDecision, RunnerError>;
}

/// Dispatch the lowest-`order` ready task; never calls the runner.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstReadyPolicy;

#[async_trait]
impl DelegationPolicy for FirstReadyPolicy {
    fn name(&self) -> &str {
        "first-ready"
    }

    async fn decide(
        &self,
        ctx: &DelegationContext<'_>,
    ) -> Result<DelegationDecision, RunnerError> {
        Ok(ctx.first_ready())
    }
}
