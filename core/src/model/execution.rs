use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::crew::Crew;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Persisted at creation, not yet picked up by a worker.
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which agent runner backs an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    Mock,
    Real,
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mock => "mock",
            Self::Real => "real",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mock" => Ok(Self::Mock),
            "real" => Ok(Self::Real),
            other => Err(format!("unknown run mode '{other}' (expected mock|real)")),
        }
    }
}

/// Per-task entry of `CrewExecution::results`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskResult {
    Completed {
        output: String,
        tokens_used: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
    },
    /// Not executed and not charged: a dependency failed or was itself skipped.
    Skipped { blocked_by: String },
}

impl TaskResult {
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::Completed { output, .. } => Some(output),
            Self::Skipped { .. } => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }
}

/// One run of a crew against a specific input payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrewExecution {
    pub id: Uuid,
    pub crew_id: String,
    pub tenant_id: String,
    pub triggered_by: String,
    pub mode: RunMode,
    pub input_variables: BTreeMap<String, String>,
    pub status: ExecutionStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_tokens_used: u64,
    pub cost: f64,
    pub results: BTreeMap<String, TaskResult>,
    /// Tasks whose call raised an error, in the order they failed.
    #[serde(default)]
    pub failed_tasks: Vec<String>,
    /// Number of tasks in the resolved plan.
    #[serde(default)]
    pub planned_tasks: usize,
    pub error_message: Option<String>,
    pub retry_count: u32,
    /// Execution this one retries, if any.
    #[serde(default)]
    pub retry_of: Option<Uuid>,
}

impl CrewExecution {
    pub fn new(
        crew: &Crew,
        input_variables: BTreeMap<String, String>,
        triggered_by: impl Into<String>,
        mode: RunMode,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            crew_id: crew.id.clone(),
            tenant_id: crew.tenant_id.clone(),
            triggered_by: triggered_by.into(),
            mode,
            input_variables,
            status: ExecutionStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            total_tokens_used: 0,
            cost: 0.0,
            results: BTreeMap::new(),
            failed_tasks: Vec::new(),
            planned_tasks: crew.tasks.len(),
            error_message: None,
            retry_count: 0,
            retry_of: None,
        }
    }

    /// Fresh pending execution with the same crew and input. `self` is not touched.
    pub fn new_retry(&self, triggered_by: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            crew_id: self.crew_id.clone(),
            tenant_id: self.tenant_id.clone(),
            triggered_by: triggered_by.into(),
            mode: self.mode,
            input_variables: self.input_variables.clone(),
            status: ExecutionStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            total_tokens_used: 0,
            cost: 0.0,
            results: BTreeMap::new(),
            failed_tasks: Vec::new(),
            planned_tasks: self.planned_tasks,
            error_message: None,
            retry_count: self.retry_count + 1,
            retry_of: Some(self.id),
        }
    }

    /// Wall-clock run time; `None` until the execution has started.
    pub fn duration_ms(&self) -> Option<u64> {
        let started = self.started_at?;
        let end = self.completed_at.unwrap_or_else(Utc::now);
        Some((end - started).num_milliseconds().max(0) as u64)
    }

    /// Fraction of planned tasks with a final outcome, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        if self.status == ExecutionStatus::Completed || self.planned_tasks == 0 {
            return 1.0;
        }
        let done = self.results.len() + self.failed_tasks.len();
        (done as f64 / self.planned_tasks as f64).min(1.0)
    }

    /// Outputs of successfully completed tasks only.
    pub fn outputs(&self) -> BTreeMap<String, String> {
        self.results
            .iter()
            .filter_map(|(id, r)| r.output().map(|o| (id.clone(), o.to_string())))
            .collect()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
