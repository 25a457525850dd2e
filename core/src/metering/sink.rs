use std::sync::Arc;

use serde_json::json;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::pricing::PricingTable;
use crate::error::StoreError;
use crate::events_out::{write_log_row, EventsOutTx};
use crate::model::{
    CrewExecution, CrewExecutionLog, ExecutionStatus, LogEvent, LogLevel, NewLogEntry, TaskResult,
};
use crate::state::ExecutionEvent;
use crate::store::{AppendOutcome, ExecutionStore};

/// Token and cost totals of one execution.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Totals {
    pub tokens_used: u64,
    pub cost: f64,
}

/// Writes log rows, bills accepted task results and fans rows out to
/// watchers and the events file.
///
/// Every row goes through the store first; only rows the store actually
/// appended are published, so watchers never see a duplicate.
#[derive(Clone)]
pub struct MeteringSink {
    store: Arc<dyn ExecutionStore>,
    pricing: Arc<dyn PricingTable>,
    events: broadcast::Sender<ExecutionEvent>,
    events_out: Option<EventsOutTx>,
}

impl MeteringSink {
    pub fn new(
        store: Arc<dyn ExecutionStore>,
        pricing: Arc<dyn PricingTable>,
        events: broadcast::Sender<ExecutionEvent>,
        events_out: Option<EventsOutTx>,
    ) -> Self {
        Self {
            store,
            pricing,
            events,
            events_out,
        }
    }

    pub fn pricing(&self) -> &dyn PricingTable {
        self.pricing.as_ref()
    }

    pub async fn append(&self, entry: NewLogEntry) -> Result<AppendOutcome, StoreError> {
        let outcome = self.store.append_log(entry).await?;
        if outcome.duplicate {
            tracing::debug!(
                execution_id = %outcome.entry.execution_id,
                task_id = outcome.entry.task_id.as_deref().unwrap_or("-"),
                event = outcome.entry.event.as_str(),
                "duplicate log row ignored"
            );
        } else {
            self.publish(&outcome.entry).await;
        }
        Ok(outcome)
    }

    async fn publish(&self, row: &CrewExecutionLog) {
        // no receivers is fine
        let _ = self.events.send(ExecutionEvent::Log(row.clone()));
        write_log_row(self.events_out.as_ref(), row).await;
    }

    pub fn status_changed(&self, execution_id: Uuid, status: ExecutionStatus) {
        let _ = self
            .events
            .send(ExecutionEvent::status_changed(execution_id, status));
    }

    pub async fn task_started(
        &self,
        execution_id: Uuid,
        task_id: &str,
        agent_id: Option<&str>,
    ) -> Result<AppendOutcome, StoreError> {
        self.append(
            NewLogEntry::new(execution_id, LogLevel::Info, LogEvent::TaskStarted, "Task started")
                .task(task_id)
                .agent(agent_id)
                .idempotent(),
        )
        .await
    }

    /// Record an accepted task result. Returns false if this task was
    /// already billed, in which case nothing changes.
    pub async fn task_completed(
        &self,
        execution_id: Uuid,
        task_id: &str,
        agent_id: Option<&str>,
        model: &str,
        output: &str,
        tokens_used: u64,
    ) -> Result<bool, StoreError> {
        let appended = self
            .append(
                NewLogEntry::new(
                    execution_id,
                    LogLevel::Info,
                    LogEvent::TaskCompleted,
                    "Task completed",
                )
                .task(task_id)
                .agent(agent_id)
                .tokens(tokens_used)
                .data(json!({ "output": output, "model": model }))
                .idempotent(),
            )
            .await?;
        if appended.duplicate {
            return Ok(false);
        }

        let cost = self.pricing.cost(model, tokens_used);
        let task_id = task_id.to_string();
        let result = TaskResult::Completed {
            output: output.to_string(),
            tokens_used,
            agent_id: agent_id.map(str::to_string),
        };
        self.store
            .update_execution(
                execution_id,
                Box::new(move |exec: &mut CrewExecution| {
                    exec.results.insert(task_id, result);
                    exec.total_tokens_used += tokens_used;
                    exec.cost += cost;
                    Ok(())
                }),
            )
            .await?;
        Ok(true)
    }

    pub async fn task_failed(
        &self,
        execution_id: Uuid,
        task_id: &str,
        agent_id: Option<&str>,
        error: &str,
    ) -> Result<(), StoreError> {
        let appended = self
            .append(
                NewLogEntry::new(
                    execution_id,
                    LogLevel::Error,
                    LogEvent::TaskFailed,
                    format!("Task failed: {error}"),
                )
                .task(task_id)
                .agent(agent_id)
                .data(json!({ "error": error }))
                .idempotent(),
            )
            .await?;
        if appended.duplicate {
            return Ok(());
        }

        let task_id = task_id.to_string();
        self.store
            .update_execution(
                execution_id,
                Box::new(move |exec: &mut CrewExecution| {
                    if !exec.failed_tasks.contains(&task_id) {
                        exec.failed_tasks.push(task_id);
                    }
                    Ok(())
                }),
            )
            .await?;
        Ok(())
    }

    pub async fn task_skipped(
        &self,
        execution_id: Uuid,
        task_id: &str,
        blocked_by: &str,
    ) -> Result<(), StoreError> {
        self.append(
            NewLogEntry::new(
                execution_id,
                LogLevel::Warning,
                LogEvent::TaskSkipped,
                format!("Task skipped: dependency '{blocked_by}' did not complete"),
            )
            .task(task_id)
            .data(json!({ "blocked_by": blocked_by }))
            .idempotent(),
        )
        .await?;

        let task_id = task_id.to_string();
        let blocked_by = blocked_by.to_string();
        self.store
            .update_execution(
                execution_id,
                Box::new(move |exec: &mut CrewExecution| {
                    exec.results
                        .entry(task_id)
                        .or_insert(TaskResult::Skipped { blocked_by });
                    Ok(())
                }),
            )
            .await?;
        Ok(())
    }

    /// Log a manager decision. Tokens the manager spent are kept on this row
    /// and never added to the execution totals.
    pub async fn delegation(
        &self,
        execution_id: Uuid,
        task_id: &str,
        manager_id: &str,
        assigned_agent_id: &str,
        policy: &str,
        rationale: &str,
        tokens_used: u64,
        fallback_reason: Option<&str>,
    ) -> Result<AppendOutcome, StoreError> {
        let (level, message) = match fallback_reason {
            Some(reason) => (
                LogLevel::Warning,
                format!("Manager delegated task to '{assigned_agent_id}' after fallback: {reason}"),
            ),
            None => (
                LogLevel::Info,
                format!("Manager delegated task to '{assigned_agent_id}'"),
            ),
        };
        self.append(
            NewLogEntry::new(execution_id, level, LogEvent::ManagerDelegation, message)
                .task(task_id)
                .agent(Some(manager_id))
                .tokens(tokens_used)
                .data(json!({
                    "policy": policy,
                    "assigned_agent_id": assigned_agent_id,
                    "rationale": rationale,
                    "fallback_reason": fallback_reason,
                }))
                .idempotent(),
        )
        .await
    }

    pub async fn cancellation_acknowledged(
        &self,
        execution_id: Uuid,
        pending_tasks: usize,
    ) -> Result<AppendOutcome, StoreError> {
        self.append(
            NewLogEntry::new(
                execution_id,
                LogLevel::Info,
                LogEvent::CancellationAcknowledged,
                "Cancellation acknowledged",
            )
            .data(json!({ "pending_tasks": pending_tasks }))
            .idempotent(),
        )
        .await
    }

    pub async fn aborted(
        &self,
        execution_id: Uuid,
        error: &str,
    ) -> Result<AppendOutcome, StoreError> {
        self.append(
            NewLogEntry::new(
                execution_id,
                LogLevel::Error,
                LogEvent::ExecutionAborted,
                format!("Execution aborted: {error}"),
            )
            .data(json!({ "error": error }))
            .idempotent(),
        )
        .await
    }

    /// Totals derived from the audit trail: the sum over info-level
    /// task-completion rows, priced by the model recorded on each row.
    pub async fn totals_from_logs(&self, execution_id: Uuid) -> Result<Totals, StoreError> {
        let rows = self.store.list_logs(execution_id, None).await?;
        Ok(rows
            .iter()
            .filter(|r| r.level == LogLevel::Info && r.event == LogEvent::TaskCompleted)
            .fold(Totals::default(), |acc, r| {
                let model = r.data.get("model").and_then(|m| m.as_str()).unwrap_or("");
                Totals {
                    tokens_used: acc.tokens_used + r.tokens_used,
                    cost: acc.cost + self.pricing.cost(model, r.tokens_used),
                }
            }))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::model::{
        Crew, CrewConfiguration, CrewExecution, CrewStats, CrewStatus, ProcessType, RunMode,
    };
    use crate::store::InMemoryStore;

    struct PerThousand(f64);

    impl PricingTable for PerThousand {
        fn cost(&self, _model: &str, tokens: u64) -> f64 {
            self.0 * tokens as f64 / 1000.0
        }
    }

    async fn setup() -> (Arc<InMemoryStore>, MeteringSink, Uuid) {
        let store = Arc::new(InMemoryStore::new());
        let crew = Crew {
            id: "c".into(),
            tenant_id: "t".into(),
            name: "c".into(),
            process_type: ProcessType::Sequential,
            configuration: CrewConfiguration::default(),
            status: CrewStatus::Active,
            stats: CrewStats::default(),
            agents: vec![],
            tasks: vec![],
        };
        let exec = CrewExecution::new(&crew, BTreeMap::new(), "tester", RunMode::Mock);
        let id = exec.id;
        store.insert_execution(exec).await.unwrap();
        let (tx, _) = broadcast::channel(16);
        let sink = MeteringSink::new(store.clone(), Arc::new(PerThousand(2.0)), tx, None);
        (store, sink, id)
    }

    #[tokio::test]
    async fn test_completion_is_billed_once() {
        let (store, sink, id) = setup().await;

        assert!(sink.task_completed(id, "a", Some("w"), "m", "ok", 500).await.unwrap());
        assert!(!sink.task_completed(id, "a", Some("w"), "m", "ok", 500).await.unwrap());

        let exec = store.get_execution(id).await.unwrap();
        assert_eq!(exec.total_tokens_used, 500);
        assert!((exec.cost - 1.0).abs() < 1e-9);
        assert_eq!(store.list_logs(id, None).await.unwrap().len(), 1);

        let totals = sink.totals_from_logs(id).await.unwrap();
        assert_eq!(totals.tokens_used, exec.total_tokens_used);
        assert!((totals.cost - exec.cost).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_delegation_tokens_stay_on_row() {
        let (store, sink, id) = setup().await;
        sink.delegation(id, "a", "mgr", "w", "llm-manager", "best fit", 42, None)
            .await
            .unwrap();
        sink.task_completed(id, "a", Some("w"), "m", "ok", 10).await.unwrap();

        let exec = store.get_execution(id).await.unwrap();
        assert_eq!(exec.total_tokens_used, 10);
        let rows = store.list_logs(id, None).await.unwrap();
        assert_eq!(rows[0].event, LogEvent::ManagerDelegation);
        assert_eq!(rows[0].tokens_used, 42);
        assert_eq!(sink.totals_from_logs(id).await.unwrap().tokens_used, 10);
    }

    #[tokio::test]
    async fn test_failed_and_skipped_are_recorded() {
        let (store, sink, id) = setup().await;
        sink.task_failed(id, "b", Some("w"), "boom").await.unwrap();
        sink.task_skipped(id, "c", "b").await.unwrap();

        let exec = store.get_execution(id).await.unwrap();
        assert_eq!(exec.failed_tasks, vec!["b".to_string()]);
        assert_eq!(
            exec.results.get("c"),
            Some(&TaskResult::Skipped { blocked_by: "b".into() })
        );
        assert_eq!(exec.total_tokens_used, 0);

        let rows = store.list_logs(id, None).await.unwrap();
        assert_eq!(rows[0].level, LogLevel::Error);
        assert!(rows[0].message.contains("boom"));
        assert_eq!(rows[1].level, LogLevel::Warning);
    }

    #[tokio::test]
    async fn test_rows_are_broadcast_once() {
        let (_store, sink, id) = setup().await;
        let mut rx = sink.events.subscribe();

        sink.task_started(id, "a", Some("w")).await.unwrap();
        sink.task_started(id, "a", Some("w")).await.unwrap();
        sink.status_changed(id, ExecutionStatus::Running);

        match rx.recv().await.unwrap() {
            ExecutionEvent::Log(row) => assert_eq!(row.event, LogEvent::TaskStarted),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(
            rx.recv().await.unwrap(),
            ExecutionEvent::StatusChanged { status: ExecutionStatus::Running, .. }
        ));
    }
}
