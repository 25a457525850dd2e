use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{CrewExecution, CrewExecutionLog, ExecutionStatus, RunMode, TaskResult};

/// Inbound call that starts an execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerRequest {
    pub crew_id: String,
    #[serde(default)]
    pub input_variables: BTreeMap<String, String>,
    /// Falls back to the engine's default mode.
    #[serde(default)]
    pub mode: Option<RunMode>,
    #[serde(default = "default_triggered_by")]
    pub triggered_by: String,
}

fn default_triggered_by() -> String {
    "api".to_string()
}

impl TriggerRequest {
    pub fn new(crew_id: impl Into<String>) -> Self {
        Self {
            crew_id: crew_id.into(),
            input_variables: BTreeMap::new(),
            mode: None,
            triggered_by: default_triggered_by(),
        }
    }

    pub fn input(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.input_variables.insert(key.into(), value.into());
        self
    }

    pub fn mode(mut self, mode: RunMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn triggered_by(mut self, actor: impl Into<String>) -> Self {
        self.triggered_by = actor.into();
        self
    }
}

/// Read-only view returned by progress polling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub execution_id: Uuid,
    pub crew_id: String,
    pub status: ExecutionStatus,
    pub mode: RunMode,
    pub progress: f64,
    pub total_tokens_used: u64,
    pub cost: f64,
    pub results: BTreeMap<String, TaskResult>,
    pub failed_tasks: Vec<String>,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub retry_of: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub logs: Vec<CrewExecutionLog>,
}

impl ProgressSnapshot {
    pub fn new(exec: CrewExecution, logs: Vec<CrewExecutionLog>) -> Self {
        Self {
            execution_id: exec.id,
            progress: exec.progress(),
            duration_ms: exec.duration_ms(),
            crew_id: exec.crew_id,
            status: exec.status,
            mode: exec.mode,
            total_tokens_used: exec.total_tokens_used,
            cost: exec.cost,
            results: exec.results,
            failed_tasks: exec.failed_tasks,
            error_message: exec.error_message,
            retry_count: exec.retry_count,
            retry_of: exec.retry_of,
            started_at: exec.started_at,
            completed_at: exec.completed_at,
            logs,
        }
    }
}
