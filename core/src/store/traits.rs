use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{Crew, CrewExecution, CrewExecutionLog, CrewStats, NewLogEntry};
use crate::state::{TerminalOutcome, TransitionError};

/// Read access to crew definitions, already scoped to a tenant by the caller.
#[async_trait]
pub trait CrewStore: Send + Sync {
    async fn fetch_crew(&self, crew_id: &str) -> Result<Crew, StoreError>;

    /// Apply one terminal outcome to the crew's rolling statistics.
    ///
    /// Only the stats aggregator calls this.
    async fn record_outcome(&self, outcome: &TerminalOutcome) -> Result<CrewStats, StoreError>;
}

/// Mutation applied atomically to a stored execution.
pub type ExecutionMutation =
    Box<dyn FnOnce(&mut CrewExecution) -> Result<(), TransitionError> + Send>;

#[derive(Debug, Clone)]
pub struct AppendOutcome {
    pub entry: CrewExecutionLog,
    /// True if a row with the same idempotency key already existed; `entry` is that row.
    pub duplicate: bool,
}

#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn insert_execution(&self, execution: CrewExecution) -> Result<(), StoreError>;

    async fn get_execution(&self, execution_id: Uuid) -> Result<CrewExecution, StoreError>;

    /// Run `mutation` under the store's write lock. Nothing is persisted if it errors.
    async fn update_execution(
        &self,
        execution_id: Uuid,
        mutation: ExecutionMutation,
    ) -> Result<CrewExecution, StoreError>;

    /// Removes the execution together with its log rows.
    async fn delete_execution(&self, execution_id: Uuid) -> Result<(), StoreError>;

    async fn list_executions(&self, crew_id: &str) -> Result<Vec<CrewExecution>, StoreError>;

    /// Append a row, assigning its sequence number and timestamp.
    async fn append_log(&self, entry: NewLogEntry) -> Result<AppendOutcome, StoreError>;

    /// Rows of one execution in write order, optionally only those after `after_seq`.
    async fn list_logs(
        &self,
        execution_id: Uuid,
        after_seq: Option<u64>,
    ) -> Result<Vec<CrewExecutionLog>, StoreError>;

    /// Claim the right to drive an execution. A lease older than `ttl` may be taken over.
    async fn acquire_lease(
        &self,
        execution_id: Uuid,
        worker_id: &str,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Extend a lease `worker_id` still holds. Fails with `LeaseHeld` once
    /// another worker took it over, or `LeaseLost` if nobody holds it.
    async fn renew_lease(
        &self,
        execution_id: Uuid,
        worker_id: &str,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    async fn release_lease(&self, execution_id: Uuid, worker_id: &str) -> Result<(), StoreError>;
}
