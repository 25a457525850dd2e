//! Retry/Cancel Controller.

use uuid::Uuid;

use super::CrewEngine;
use crate::error::{EngineError, StoreError};
use crate::model::{CrewExecution, ExecutionStatus};
use crate::state::{StateTransition, TerminalOutcome};

impl CrewEngine {
    /// Cancel a pending or running execution.
    ///
    /// The transition is made here and returns at once; the worker stops at
    /// its next checkpoint and logs the acknowledgement.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, execution_id: Uuid) -> Result<CrewExecution, EngineError> {
        let message = self.inner.settings.cancel_message.clone();
        let cancelled = self
            .inner
            .store
            .update_execution(
                execution_id,
                Box::new(move |e: &mut CrewExecution| StateTransition::cancel(e, message)),
            )
            .await;

        let exec = match cancelled {
            Ok(exec) => exec,
            Err(StoreError::Transition(e)) => {
                return Err(EngineError::InvalidStateTransition {
                    operation: "cancel",
                    execution_id,
                    status: e.current(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(crew_id = %exec.crew_id, "execution cancelled");
        self.inner
            .sink
            .status_changed(execution_id, ExecutionStatus::Cancelled);
        self.inner.stats.record(TerminalOutcome::from_execution(&exec));

        if let Some(worker) = self.workers().get(&execution_id) {
            worker.cancel.cancel();
        }
        Ok(exec)
    }

    /// Start a new execution with the same crew and input as a failed or
    /// cancelled one. The original and its logs are left untouched.
    #[tracing::instrument(skip(self, triggered_by))]
    pub async fn retry(
        &self,
        execution_id: Uuid,
        triggered_by: &str,
    ) -> Result<Uuid, EngineError> {
        let original = self.inner.store.get_execution(execution_id).await?;
        if !matches!(
            original.status,
            ExecutionStatus::Failed | ExecutionStatus::Cancelled
        ) {
            return Err(EngineError::InvalidStateTransition {
                operation: "retry",
                execution_id,
                status: original.status,
            });
        }

        let crew = self.inner.crews.fetch_crew(&original.crew_id).await?;
        let plan = self.validate_crew(&crew)?;
        self.ensure_mode(original.mode)?;

        let mut retry = original.new_retry(triggered_by);
        retry.planned_tasks = plan.steps.iter().map(Vec::len).sum();
        let retry_id = retry.id;
        self.inner.store.insert_execution(retry).await?;
        tracing::info!(
            retry_id = %retry_id,
            retry_count = original.retry_count + 1,
            "retry created"
        );

        self.spawn_worker(retry_id);
        Ok(retry_id)
    }
}
