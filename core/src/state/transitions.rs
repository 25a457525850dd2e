//! Execution lifecycle rules.
//!
//! ```text
//! pending ──> running ──> completed
//!    │           ├──────> failed
//!    └───────────┴──────> cancelled
//! ```
//!
//! Terminal states never transition again; a retry creates a new execution.

use chrono::Utc;
use thiserror::Error;

use crate::model::{CrewExecution, ExecutionStatus};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        from: ExecutionStatus,
        to: ExecutionStatus,
    },
    #[error("Cannot transition from terminal state {state}")]
    FromTerminalState { state: ExecutionStatus },
}

impl TransitionError {
    /// Status the execution was in when the transition was refused.
    pub fn current(&self) -> ExecutionStatus {
        match self {
            Self::InvalidTransition { from, .. } => *from,
            Self::FromTerminalState { state } => *state,
        }
    }
}

pub struct StateTransition;

impl StateTransition {
    pub fn validate(from: ExecutionStatus, to: ExecutionStatus) -> Result<(), TransitionError> {
        if from.is_terminal() {
            return Err(TransitionError::FromTerminalState { state: from });
        }

        let is_valid = matches!(
            (from, to),
            (ExecutionStatus::Pending, ExecutionStatus::Running)
                | (ExecutionStatus::Running, ExecutionStatus::Completed)
                | (ExecutionStatus::Running, ExecutionStatus::Failed)
                | (ExecutionStatus::Pending, ExecutionStatus::Cancelled)
                | (ExecutionStatus::Running, ExecutionStatus::Cancelled)
        );

        if is_valid {
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition { from, to })
        }
    }

    /// `pending -> running`, stamping `started_at`.
    pub fn start(exec: &mut CrewExecution) -> Result<(), TransitionError> {
        Self::validate(exec.status, ExecutionStatus::Running)?;
        exec.status = ExecutionStatus::Running;
        exec.started_at = Some(Utc::now());
        Ok(())
    }

    /// `running -> completed`. Results and totals are already in place.
    pub fn complete(exec: &mut CrewExecution) -> Result<(), TransitionError> {
        Self::validate(exec.status, ExecutionStatus::Completed)?;
        exec.status = ExecutionStatus::Completed;
        exec.completed_at = Some(Utc::now());
        exec.error_message = None;
        Ok(())
    }

    /// `running -> failed`. Partial results are kept.
    pub fn fail(exec: &mut CrewExecution, message: String) -> Result<(), TransitionError> {
        Self::validate(exec.status, ExecutionStatus::Failed)?;
        exec.status = ExecutionStatus::Failed;
        exec.completed_at = Some(Utc::now());
        exec.error_message = Some(message);
        Ok(())
    }

    /// `pending|running -> cancelled`.
    pub fn cancel(exec: &mut CrewExecution, message: String) -> Result<(), TransitionError> {
        Self::validate(exec.status, ExecutionStatus::Cancelled)?;
        exec.status = ExecutionStatus::Cancelled;
        exec.completed_at = Some(Utc::now());
        exec.error_message = Some(message);
        Ok(())
    }
}
