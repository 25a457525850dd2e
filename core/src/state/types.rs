//! Events broadcast to live watchers of executions.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::model::{CrewExecutionLog, ExecutionStatus};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    StatusChanged {
        execution_id: Uuid,
        status: ExecutionStatus,
        timestamp: DateTime<Utc>,
    },
    Log(CrewExecutionLog),
}

impl ExecutionEvent {
    pub fn status_changed(execution_id: Uuid, status: ExecutionStatus) -> Self {
        Self::StatusChanged {
            execution_id,
            status,
            timestamp: Utc::now(),
        }
    }

    pub fn execution_id(&self) -> Uuid {
        match self {
            Self::StatusChanged { execution_id, .. } => *execution_id,
            Self::Log(entry) => entry.execution_id,
        }
    }
}
