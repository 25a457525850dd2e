use thiserror::Error;
use uuid::Uuid;

use crate::state::TransitionError;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("crew not found: {0}")]
    CrewNotFound(String),

    #[error("execution not found: {0}")]
    ExecutionNotFound(Uuid),

    #[error("execution already exists: {0}")]
    DuplicateExecution(Uuid),

    #[error("execution {execution_id} is leased by worker '{holder}'")]
    LeaseHeld { execution_id: Uuid, holder: String },

    #[error("worker '{worker_id}' no longer holds the lease on execution {execution_id}")]
    LeaseLost { execution_id: Uuid, worker_id: String },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// The caller is not, or no longer, the worker allowed to drive the execution.
    pub fn is_lease_conflict(&self) -> bool {
        matches!(self, Self::LeaseHeld { .. } | Self::LeaseLost { .. })
    }
}
