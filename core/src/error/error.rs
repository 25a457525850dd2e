use thiserror::Error;
use uuid::Uuid;

use super::{GraphError, RunnerError, StoreError};
use crate::model::ExecutionStatus;
use crate::state::TransitionError;

/// Coarse classification used by the outer surfaces (exit codes, HTTP status).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    TaskExecution,
    Cancelled,
    InvalidState,
    NotFound,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration_error",
            Self::TaskExecution => "task_execution_error",
            Self::Cancelled => "cancelled",
            Self::InvalidState => "invalid_state_transition",
            Self::NotFound => "not_found",
            Self::Internal => "internal_error",
        }
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Graph(#[from] GraphError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("crew '{crew_id}' is {status} and cannot be executed")]
    CrewNotActive { crew_id: String, status: String },

    #[error("cannot {operation} execution {execution_id} in status '{status}'")]
    InvalidStateTransition {
        operation: &'static str,
        execution_id: Uuid,
        status: ExecutionStatus,
    },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("task execution failed: {0}")]
    Runner(#[from] RunnerError),

    #[error("execution {0} was cancelled")]
    Cancelled(Uuid),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("engine error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Graph(_) | Self::Config(_) | Self::CrewNotActive { .. } => {
                ErrorKind::Configuration
            }
            Self::InvalidStateTransition { .. } | Self::Transition(_) => ErrorKind::InvalidState,
            Self::Runner(RunnerError::Unavailable(_)) => ErrorKind::Configuration,
            Self::Runner(_) => ErrorKind::TaskExecution,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Store(StoreError::CrewNotFound(_) | StoreError::ExecutionNotFound(_)) => {
                ErrorKind::NotFound
            }
            Self::Store(StoreError::Transition(_)) => ErrorKind::InvalidState,
            Self::Store(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Another worker owns the execution; the caller must not write to it.
    pub fn is_lease_conflict(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_lease_conflict())
    }
}
