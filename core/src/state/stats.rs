//! Single-writer aggregation of crew rolling statistics.
//!
//! Every terminal transition sends one `TerminalOutcome`; a dedicated task
//! applies them in arrival order, so concurrent executions of the same crew
//! never race on the counters.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::model::{CrewExecution, ExecutionStatus};
use crate::store::CrewStore;

/// How many recent execution ids are remembered for deduplication. Duplicate
/// outcomes come from the controller and worker racing on one execution, so
/// they arrive close together.
const DEDUP_WINDOW: usize = 4096;

/// Execution ids already applied, oldest evicted first.
#[derive(Debug)]
struct RecentOutcomes {
    ids: HashSet<Uuid>,
    order: VecDeque<Uuid>,
    capacity: usize,
}

impl RecentOutcomes {
    fn new(capacity: usize) -> Self {
        Self {
            ids: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// False if `id` was already seen inside the window.
    fn insert(&mut self, id: Uuid) -> bool {
        if !self.ids.insert(id) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        true
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TerminalOutcome {
    pub crew_id: String,
    pub execution_id: Uuid,
    pub status: ExecutionStatus,
    pub duration_ms: Option<u64>,
}

impl TerminalOutcome {
    pub fn from_execution(execution: &CrewExecution) -> Self {
        Self {
            crew_id: execution.crew_id.clone(),
            execution_id: execution.id,
            status: execution.status,
            duration_ms: execution.duration_ms(),
        }
    }
}

enum StatsMessage {
    Outcome(TerminalOutcome),
    Flush(oneshot::Sender<()>),
}

#[derive(Clone)]
pub struct StatsAggregator {
    tx: mpsc::UnboundedSender<StatsMessage>,
}

impl StatsAggregator {
    pub fn spawn(store: Arc<dyn CrewStore>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<StatsMessage>();

        tokio::spawn(async move {
            let mut applied = RecentOutcomes::new(DEDUP_WINDOW);
            while let Some(msg) = rx.recv().await {
                match msg {
                    StatsMessage::Outcome(outcome) => {
                        if !applied.insert(outcome.execution_id) {
                            tracing::debug!(
                                execution_id = %outcome.execution_id,
                                "stats already applied, ignoring duplicate outcome"
                            );
                            continue;
                        }
                        match store.record_outcome(&outcome).await {
                            Ok(stats) => tracing::debug!(
                                crew_id = %outcome.crew_id,
                                total = stats.total_executions,
                                successful = stats.successful_executions,
                                failed = stats.failed_executions,
                                "crew stats updated"
                            ),
                            Err(e) => tracing::error!(
                                crew_id = %outcome.crew_id,
                                execution_id = %outcome.execution_id,
                                "failed to update crew stats: {}",
                                e
                            ),
                        }
                    }
                    StatsMessage::Flush(done) => {
                        tracing::trace!(remembered = applied.len(), "stats flush");
                        let _ = done.send(());
                    }
                }
            }
        });

        Self { tx }
    }

    pub fn record(&self, outcome: TerminalOutcome) {
        if !outcome.status.is_terminal() {
            tracing::warn!(status = %outcome.status, "ignoring non-terminal stats outcome");
            return;
        }
        if self.tx.send(StatsMessage::Outcome(outcome)).is_err() {
            tracing::error!("stats aggregator stopped; outcome dropped");
        }
    }

    /// Resolves once every outcome sent before this call has been applied.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(StatsMessage::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Crew, CrewConfiguration, CrewStats, CrewStatus, ProcessType};
    use crate::store::InMemoryStore;

    #[test]
    fn test_recent_outcomes_stay_bounded() {
        let mut recent = RecentOutcomes::new(3);
        let ids: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            assert!(recent.insert(*id));
        }
        assert_eq!(recent.len(), 3);
        assert!(!recent.insert(ids[4]));
        // evicted ids are forgotten
        assert!(recent.insert(ids[0]));
        assert_eq!(recent.len(), 3);
    }

    #[tokio::test]
    async fn test_duplicate_outcomes_apply_once() {
        let store = Arc::new(InMemoryStore::new());
        store
            .put_crew(Crew {
                id: "c".into(),
                tenant_id: "t".into(),
                name: "c".into(),
                process_type: ProcessType::Sequential,
                configuration: CrewConfiguration::default(),
                status: CrewStatus::Active,
                stats: CrewStats::default(),
                agents: vec![],
                tasks: vec![],
            })
            .await;
        let stats = StatsAggregator::spawn(store.clone());

        let done = TerminalOutcome {
            crew_id: "c".into(),
            execution_id: Uuid::new_v4(),
            status: ExecutionStatus::Completed,
            duration_ms: Some(2_000),
        };
        stats.record(done.clone());
        stats.record(done);
        stats.record(TerminalOutcome {
            crew_id: "c".into(),
            execution_id: Uuid::new_v4(),
            status: ExecutionStatus::Cancelled,
            duration_ms: None,
        });
        stats.flush().await;

        let crew = store.fetch_crew("c").await.unwrap();
        assert_eq!(crew.stats.total_executions, 2);
        assert_eq!(crew.stats.successful_executions, 1);
        assert_eq!(crew.stats.failed_executions, 0);
        assert!((crew.stats.average_execution_time - 2.0).abs() < 1e-9);
    }
}
