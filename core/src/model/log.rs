use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Kind of significant event a log row records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEvent {
    TaskStarted,
    TaskCompleted,
    TaskFailed,
    TaskSkipped,
    ManagerDelegation,
    CancellationAcknowledged,
    ExecutionAborted,
}

impl LogEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TaskStarted => "task_started",
            Self::TaskCompleted => "task_completed",
            Self::TaskFailed => "task_failed",
            Self::TaskSkipped => "task_skipped",
            Self::ManagerDelegation => "manager_delegation",
            Self::CancellationAcknowledged => "cancellation_acknowledged",
            Self::ExecutionAborted => "execution_aborted",
        }
    }
}

/// Append-only audit row. Never updated or deleted once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrewExecutionLog {
    /// Monotonic sequence within the execution, starting at 1.
    pub seq: u64,
    pub execution_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub level: LogLevel,
    pub event: LogEvent,
    pub message: String,
    pub data: serde_json::Value,
    pub tokens_used: u64,
    pub logged_at: DateTime<Utc>,
}

/// A row about to be appended; the store assigns `seq` and `logged_at`.
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub execution_id: Uuid,
    pub task_id: Option<String>,
    pub agent_id: Option<String>,
    pub level: LogLevel,
    pub event: LogEvent,
    pub message: String,
    pub data: serde_json::Value,
    pub tokens_used: u64,
    /// Rows sharing a key are written once; later appends are reported as duplicates.
    pub idempotency_key: Option<String>,
}

impl NewLogEntry {
    pub fn new(
        execution_id: Uuid,
        level: LogLevel,
        event: LogEvent,
        message: impl Into<String>,
    ) -> Self {
        Self {
            execution_id,
            task_id: None,
            agent_id: None,
            level,
            event,
            message: message.into(),
            data: serde_json::Value::Null,
            tokens_used: 0,
            idempotency_key: None,
        }
    }

    pub fn task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn agent(mut self, agent_id: Option<&str>) -> Self {
        self.agent_id = agent_id.map(str::to_string);
        self
    }

    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn tokens(mut self, tokens_used: u64) -> Self {
        self.tokens_used = tokens_used;
        self
    }

    /// Key rows by (execution, task, event) so a replayed event is written once.
    pub fn idempotent(mut self) -> Self {
        let task = self.task_id.as_deref().unwrap_or("-");
        self.idempotency_key = Some(format!("{}:{}:{}", self.execution_id, task, self.event.as_str()));
        self
    }
}
