use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::traits::{AppendOutcome, CrewStore, ExecutionMutation, ExecutionStore};
use crate::error::StoreError;
use crate::model::{Crew, CrewExecution, CrewExecutionLog, CrewStats, ExecutionStatus, NewLogEntry};
use crate::state::TerminalOutcome;

struct Lease {
    holder: String,
    acquired: Instant,
}

#[derive(Default)]
struct ExecutionSlot {
    execution: Option<CrewExecution>,
    logs: Vec<CrewExecutionLog>,
    keys: HashMap<String, usize>,
}

/// Process-local store. Each execution's logs live with it and go with it.
#[derive(Default)]
pub struct InMemoryStore {
    crews: RwLock<HashMap<String, Crew>>,
    executions: RwLock<HashMap<Uuid, ExecutionSlot>>,
    leases: RwLock<HashMap<Uuid, Lease>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a crew definition.
    pub async fn put_crew(&self, crew: Crew) {
        self.crews.write().await.insert(crew.id.clone(), crew);
    }

    pub async fn crew_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.crews.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl CrewStore for InMemoryStore {
    async fn fetch_crew(&self, crew_id: &str) -> Result<Crew, StoreError> {
        self.crews
            .read()
            .await
            .get(crew_id)
            .cloned()
            .ok_or_else(|| StoreError::CrewNotFound(crew_id.to_string()))
    }

    async fn record_outcome(&self, outcome: &TerminalOutcome) -> Result<CrewStats, StoreError> {
        let mut crews = self.crews.write().await;
        let crew = crews
            .get_mut(&outcome.crew_id)
            .ok_or_else(|| StoreError::CrewNotFound(outcome.crew_id.clone()))?;

        match outcome.status {
            ExecutionStatus::Completed => {
                let secs = outcome.duration_ms.unwrap_or(0) as f64 / 1000.0;
                crew.stats.record_completed(secs);
            }
            ExecutionStatus::Failed => crew.stats.record_failed(),
            ExecutionStatus::Cancelled => crew.stats.record_cancelled(),
            other => {
                return Err(StoreError::Backend(format!(
                    "outcome with non-terminal status {other}"
                )))
            }
        }
        Ok(crew.stats.clone())
    }
}

#[async_trait]
impl ExecutionStore for InMemoryStore {
    async fn insert_execution(&self, execution: CrewExecution) -> Result<(), StoreError> {
        let mut executions = self.executions.write().await;
        if executions.contains_key(&execution.id) {
            return Err(StoreError::DuplicateExecution(execution.id));
        }
        executions.insert(
            execution.id,
            ExecutionSlot {
                execution: Some(execution),
                ..Default::default()
            },
        );
        Ok(())
    }

    async fn get_execution(&self, execution_id: Uuid) -> Result<CrewExecution, StoreError> {
        self.executions
            .read()
            .await
            .get(&execution_id)
            .and_then(|slot| slot.execution.clone())
            .ok_or(StoreError::ExecutionNotFound(execution_id))
    }

    async fn update_execution(
        &self,
        execution_id: Uuid,
        mutation: ExecutionMutation,
    ) -> Result<CrewExecution, StoreError> {
        let mut executions = self.executions.write().await;
        let current = executions
            .get_mut(&execution_id)
            .and_then(|slot| slot.execution.as_mut())
            .ok_or(StoreError::ExecutionNotFound(execution_id))?;

        let mut draft = current.clone();
        mutation(&mut draft)?;
        *current = draft.clone();
        Ok(draft)
    }

    async fn delete_execution(&self, execution_id: Uuid) -> Result<(), StoreError> {
        self.leases.write().await.remove(&execution_id);
        self.executions
            .write()
            .await
            .remove(&execution_id)
            .map(|_| ())
            .ok_or(StoreError::ExecutionNotFound(execution_id))
    }

    async fn list_executions(&self, crew_id: &str) -> Result<Vec<CrewExecution>, StoreError> {
        let executions = self.executions.read().await;
        let mut out: Vec<CrewExecution> = executions
            .values()
            .filter_map(|slot| slot.execution.as_ref())
            .filter(|e| e.crew_id == crew_id)
            .cloned()
            .collect();
        out.sort_by_key(|e| e.created_at);
        Ok(out)
    }

    async fn append_log(&self, entry: NewLogEntry) -> Result<AppendOutcome, StoreError> {
        let mut executions = self.executions.write().await;
        let slot = executions
            .get_mut(&entry.execution_id)
            .ok_or(StoreError::ExecutionNotFound(entry.execution_id))?;

        if let Some(key) = entry.idempotency_key.as_ref() {
            if let Some(&pos) = slot.keys.get(key) {
                return Ok(AppendOutcome {
                    entry: slot.logs[pos].clone(),
                    duplicate: true,
                });
            }
        }

        // Timestamps never go backwards within an execution even if the clock does.
        let now = Utc::now();
        let logged_at = match slot.logs.last() {
            Some(last) if last.logged_at > now => last.logged_at,
            _ => now,
        };

        let row = CrewExecutionLog {
            seq: slot.logs.len() as u64 + 1,
            execution_id: entry.execution_id,
            task_id: entry.task_id,
            agent_id: entry.agent_id,
            level: entry.level,
            event: entry.event,
            message: entry.message,
            data: entry.data,
            tokens_used: entry.tokens_used,
            logged_at,
        };

        if let Some(key) = entry.idempotency_key {
            slot.keys.insert(key, slot.logs.len());
        }
        slot.logs.push(row.clone());

        Ok(AppendOutcome {
            entry: row,
            duplicate: false,
        })
    }

    async fn list_logs(
        &self,
        execution_id: Uuid,
        after_seq: Option<u64>,
    ) -> Result<Vec<CrewExecutionLog>, StoreError> {
        let executions = self.executions.read().await;
        let slot = executions
            .get(&execution_id)
            .ok_or(StoreError::ExecutionNotFound(execution_id))?;
        let after = after_seq.unwrap_or(0);
        Ok(slot.logs.iter().filter(|l| l.seq > after).cloned().collect())
    }

    async fn acquire_lease(
        &self,
        execution_id: Uuid,
        worker_id: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        if !self.executions.read().await.contains_key(&execution_id) {
            return Err(StoreError::ExecutionNotFound(execution_id));
        }

        let mut leases = self.leases.write().await;
        if let Some(lease) = leases.get(&execution_id) {
            if lease.holder != worker_id && lease.acquired.elapsed() < ttl {
                return Err(StoreError::LeaseHeld {
                    execution_id,
                    holder: lease.holder.clone(),
                });
            }
        }
        leases.insert(
            execution_id,
            Lease {
                holder: worker_id.to_string(),
                acquired: Instant::now(),
            },
        );
        Ok(())
    }

    async fn renew_lease(
        &self,
        execution_id: Uuid,
        worker_id: &str,
        _ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut leases = self.leases.write().await;
        match leases.get_mut(&execution_id) {
            Some(lease) if lease.holder == worker_id => {
                lease.acquired = Instant::now();
                Ok(())
            }
            Some(lease) => Err(StoreError::LeaseHeld {
                execution_id,
                holder: lease.holder.clone(),
            }),
            None => Err(StoreError::LeaseLost {
                execution_id,
                worker_id: worker_id.to_string(),
            }),
        }
    }

    async fn release_lease(&self, execution_id: Uuid, worker_id: &str) -> Result<(), StoreError> {
        let mut leases = self.leases.write().await;
        if leases.get(&execution_id).map(|l| l.holder.as_str()) == Some(worker_id) {
            leases.remove(&execution_id);
        }
        Ok(())
    }
}

impl InMemoryStore {
    /// Idempotency keys written so far for one execution.
    pub async fn idempotency_keys(&self, execution_id: Uuid) -> HashSet<String> {
        self.executions
            .read()
            .await
            .get(&execution_id)
            .map(|slot| slot.keys.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::model::{
        CrewConfiguration, CrewStatus, LogEvent, LogLevel, ProcessType, RunMode,
    };
    use crate::state::StateTransition;

    fn crew() -> Crew {
        Crew {
            id: "c1".into(),
            tenant_id: "t1".into(),
            name: "crew".into(),
            process_type: ProcessType::Sequential,
            configuration: CrewConfiguration::default(),
            status: CrewStatus::Active,
            stats: CrewStats::default(),
            agents: vec![],
            tasks: vec![],
        }
    }

    async fn seeded() -> (InMemoryStore, Uuid) {
        let store = InMemoryStore::new();
        store.put_crew(crew()).await;
        let exec = CrewExecution::new(&crew(), BTreeMap::new(), "tester", RunMode::Mock);
        let id = exec.id;
        store.insert_execution(exec).await.unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn test_append_log_is_ordered_and_idempotent() {
        let (store, id) = seeded().await;

        let first = NewLogEntry::new(id, LogLevel::Info, LogEvent::TaskCompleted, "done")
            .task("a")
            .tokens(10)
            .idempotent();
        let a = store.append_log(first.clone()).await.unwrap();
        let b = store.append_log(first).await.unwrap();
        let c = store
            .append_log(NewLogEntry::new(id, LogLevel::Info, LogEvent::TaskStarted, "go").task("b"))
            .await
            .unwrap();

        assert!(!a.duplicate);
        assert!(b.duplicate);
        assert_eq!(b.entry.seq, a.entry.seq);
        assert_eq!(c.entry.seq, 2);

        let logs = store.list_logs(id, None).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert!(logs[0].logged_at <= logs[1].logged_at);
        assert_eq!(store.list_logs(id, Some(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_mutation_is_not_persisted() {
        let (store, id) = seeded().await;

        let err = store
            .update_execution(
                id,
                Box::new(|exec: &mut CrewExecution| {
                    exec.total_tokens_used = 99;
                    StateTransition::complete(exec)
                }),
            )
            .await;
        assert!(matches!(err, Err(StoreError::Transition(_))));
        assert_eq!(store.get_execution(id).await.unwrap().total_tokens_used, 0);
    }

    #[tokio::test]
    async fn test_lease_is_exclusive_until_released_or_expired() {
        let (store, id) = seeded().await;
        let ttl = Duration::from_secs(60);

        store.acquire_lease(id, "w1", ttl).await.unwrap();
        store.acquire_lease(id, "w1", ttl).await.unwrap();
        assert!(matches!(
            store.acquire_lease(id, "w2", ttl).await,
            Err(StoreError::LeaseHeld { .. })
        ));

        store.release_lease(id, "w2").await.unwrap();
        assert!(store.acquire_lease(id, "w2", ttl).await.is_err());

        store.release_lease(id, "w1").await.unwrap();
        store.acquire_lease(id, "w2", ttl).await.unwrap();

        // expired leases may be taken over
        assert!(store.acquire_lease(id, "w3", Duration::ZERO).await.is_ok());
    }

    #[tokio::test]
    async fn test_renew_keeps_the_lease_until_taken_over() {
        let (store, id) = seeded().await;
        let ttl = Duration::from_millis(50);

        assert!(matches!(
            store.renew_lease(id, "w1", ttl).await,
            Err(StoreError::LeaseLost { .. })
        ));

        store.acquire_lease(id, "w1", ttl).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        store.renew_lease(id, "w1", ttl).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        // 60ms after acquiring, but only 30ms after the renewal
        assert!(store.acquire_lease(id, "w2", ttl).await.is_err());

        store.acquire_lease(id, "w2", Duration::ZERO).await.unwrap();
        let err = store.renew_lease(id, "w1", ttl).await.unwrap_err();
        assert!(matches!(err, StoreError::LeaseHeld { ref holder, .. } if holder == "w2"));
        assert!(err.is_lease_conflict());
    }

    #[tokio::test]
    async fn test_delete_execution_cascades_logs() {
        let (store, id) = seeded().await;
        store
            .append_log(NewLogEntry::new(id, LogLevel::Info, LogEvent::TaskStarted, "go"))
            .await
            .unwrap();

        store.delete_execution(id).await.unwrap();
        assert!(matches!(
            store.list_logs(id, None).await,
            Err(StoreError::ExecutionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_record_outcome_updates_stats() {
        let (store, id) = seeded().await;
        let stats = store
            .record_outcome(&TerminalOutcome {
                crew_id: "c1".into(),
                execution_id: id,
                status: ExecutionStatus::Completed,
                duration_ms: Some(2_000),
            })
            .await
            .unwrap();
        assert_eq!(stats.successful_executions, 1);
        assert!((stats.average_execution_time - 2.0).abs() < 1e-9);
    }
}
