//! Engine facade: trigger, progress polling, cancel and retry.
//!
//! Each execution is handed to one supervised worker task that runs the
//! `TaskScheduler`. The engine keeps the worker's cancellation token so
//! cancel can signal it; the worker removes itself when it finishes.

mod controller;
mod types;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub use types::{ProgressSnapshot, TriggerRequest};

use crate::config::EngineSettings;
use crate::context::Services;
use crate::error::{EngineError, RunnerError};
use crate::events_out::EventsOutTx;
use crate::executor::{ExecutionPlan, PlanSummary, TaskScheduler};
use crate::metering::MeteringSink;
use crate::model::{Crew, CrewExecution, CrewExecutionLog, CrewStatus, RunMode};
use crate::runner::RunnerSet;
use crate::state::{ExecutionEvent, StatsAggregator};
use crate::store::{CrewStore, ExecutionStore};

struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct EngineInner {
    crews: Arc<dyn CrewStore>,
    store: Arc<dyn ExecutionStore>,
    runners: RunnerSet,
    scheduler: TaskScheduler,
    sink: MeteringSink,
    stats: StatsAggregator,
    events: broadcast::Sender<ExecutionEvent>,
    settings: EngineSettings,
    workers: Mutex<HashMap<Uuid, Worker>>,
}

#[derive(Clone)]
pub struct CrewEngine {
    inner: Arc<EngineInner>,
}

pub struct EngineBuilder {
    crews: Arc<dyn CrewStore>,
    store: Arc<dyn ExecutionStore>,
    services: Services,
    settings: EngineSettings,
    events_out: Option<EventsOutTx>,
}

impl EngineBuilder {
    pub fn services(mut self, services: Services) -> Self {
        self.services = services;
        self
    }

    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn events_out(mut self, events_out: Option<EventsOutTx>) -> Self {
        self.events_out = events_out;
        self
    }

    /// Must be called inside a tokio runtime: starts the stats aggregator.
    pub fn build(self) -> CrewEngine {
        let (events, _) = broadcast::channel(self.settings.event_channel_capacity.max(1));
        let stats = StatsAggregator::spawn(self.crews.clone());
        let sink = MeteringSink::new(
            self.store.clone(),
            self.services.pricing.clone(),
            events.clone(),
            self.events_out,
        );
        let scheduler = TaskScheduler::new(
            self.crews.clone(),
            self.store.clone(),
            self.services.runners.clone(),
            self.services.delegation.clone(),
            sink.clone(),
            stats.clone(),
            self.settings.clone(),
        );

        CrewEngine {
            inner: Arc::new(EngineInner {
                crews: self.crews,
                store: self.store,
                runners: self.services.runners,
                scheduler,
                sink,
                stats,
                events,
                settings: self.settings,
                workers: Mutex::new(HashMap::new()),
            }),
        }
    }
}

impl CrewEngine {
    pub fn builder(crews: Arc<dyn CrewStore>, store: Arc<dyn ExecutionStore>) -> EngineBuilder {
        EngineBuilder {
            crews,
            store,
            services: Services::new(RunnerSet::new()),
            settings: EngineSettings::default(),
            events_out: None,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.inner.settings
    }

    /// Launch-time checks: the crew is active and its plan resolves.
    pub fn validate_crew(&self, crew: &Crew) -> Result<PlanSummary, EngineError> {
        if crew.status != CrewStatus::Active {
            return Err(EngineError::CrewNotActive {
                crew_id: crew.id.clone(),
                status: crew.status.to_string(),
            });
        }
        let plan = ExecutionPlan::resolve(crew, self.inner.settings.manager_role.as_deref())?;
        Ok(plan.summary())
    }

    fn ensure_mode(&self, mode: RunMode) -> Result<(), EngineError> {
        if self.inner.runners.supports(mode) {
            Ok(())
        } else {
            Err(RunnerError::Unavailable(mode.to_string()).into())
        }
    }

    /// Validate, persist a `pending` execution and hand it to a worker.
    ///
    /// Configuration errors are returned before anything is written.
    #[tracing::instrument(skip_all, fields(crew_id = %request.crew_id))]
    pub async fn trigger(&self, request: TriggerRequest) -> Result<Uuid, EngineError> {
        let crew = self.inner.crews.fetch_crew(&request.crew_id).await?;
        let plan = self.validate_crew(&crew)?;
        let mode = request.mode.unwrap_or(self.inner.settings.default_mode);
        self.ensure_mode(mode)?;

        let mut exec = CrewExecution::new(&crew, request.input_variables, request.triggered_by, mode);
        exec.planned_tasks = plan.steps.iter().map(Vec::len).sum();
        let execution_id = exec.id;
        self.inner.store.insert_execution(exec).await?;
        tracing::info!(execution_id = %execution_id, mode = %mode, "execution created");

        self.spawn_worker(execution_id);
        Ok(execution_id)
    }

    /// Hand an unfinished execution to a new worker, e.g. after a restart.
    /// The store lease keeps a second worker from running it twice.
    pub async fn resume(&self, execution_id: Uuid) -> Result<(), EngineError> {
        let exec = self.inner.store.get_execution(execution_id).await?;
        if exec.is_terminal() {
            return Err(EngineError::InvalidStateTransition {
                operation: "resume",
                execution_id,
                status: exec.status,
            });
        }
        if self.is_running(execution_id) {
            tracing::debug!(execution_id = %execution_id, "worker already running");
            return Ok(());
        }
        self.spawn_worker(execution_id);
        Ok(())
    }

    pub async fn get(&self, execution_id: Uuid) -> Result<CrewExecution, EngineError> {
        Ok(self.inner.store.get_execution(execution_id).await?)
    }

    /// Progress polling surface: status, counters and the full audit trail.
    pub async fn poll(&self, execution_id: Uuid) -> Result<ProgressSnapshot, EngineError> {
        let exec = self.inner.store.get_execution(execution_id).await?;
        let logs = self.inner.store.list_logs(execution_id, None).await?;
        Ok(ProgressSnapshot::new(exec, logs))
    }

    pub async fn logs_since(
        &self,
        execution_id: Uuid,
        after_seq: Option<u64>,
    ) -> Result<Vec<CrewExecutionLog>, EngineError> {
        Ok(self.inner.store.list_logs(execution_id, after_seq).await?)
    }

    pub async fn executions_of(&self, crew_id: &str) -> Result<Vec<CrewExecution>, EngineError> {
        Ok(self.inner.store.list_executions(crew_id).await?)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.inner.events.subscribe()
    }

    /// Resolves once the execution is terminal.
    pub async fn wait(&self, execution_id: Uuid) -> Result<CrewExecution, EngineError> {
        let mut rx = self.subscribe();
        loop {
            let exec = self.inner.store.get_execution(execution_id).await?;
            if exec.is_terminal() {
                return Ok(exec);
            }
            // the store is re-read on every wakeup, so a missed event only costs a tick
            match tokio::time::timeout(Duration::from_millis(250), rx.recv()).await {
                Ok(Ok(_)) | Err(_) => {}
                Ok(Err(broadcast::error::RecvError::Lagged(_))) => {}
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        }
    }

    /// Resolves once every stats outcome sent so far is applied.
    pub async fn flush_stats(&self) {
        self.inner.stats.flush().await;
    }

    pub fn is_running(&self, execution_id: Uuid) -> bool {
        self.workers().contains_key(&execution_id)
    }

    /// Wait for every worker started so far.
    pub async fn drain(&self) {
        let workers: Vec<(Uuid, Worker)> = self.workers().drain().collect();
        let joined = futures::future::join_all(
            workers
                .into_iter()
                .map(|(execution_id, worker)| async move { (execution_id, worker.handle.await) }),
        )
        .await;
        for (execution_id, res) in joined {
            if let Err(e) = res {
                tracing::error!(execution_id = %execution_id, "worker panicked: {}", e);
            }
        }
    }

    /// Signal every worker to stop at its next checkpoint, then wait for them.
    pub async fn shutdown(&self) {
        for worker in self.workers().values() {
            worker.cancel.cancel();
        }
        self.drain().await;
    }

    fn workers(&self) -> MutexGuard<'_, HashMap<Uuid, Worker>> {
        self.inner
            .workers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn spawn_worker(&self, execution_id: Uuid) {
        let cancel = CancellationToken::new();
        let scheduler = self.inner.scheduler.clone();
        let engine = self.clone();
        let token = cancel.clone();

        // registry lock held across spawn so the worker's own removal comes after the insert
        let mut workers = self.workers();
        let handle = tokio::spawn(async move {
            match scheduler.drive(execution_id, token).await {
                Ok(status) => {
                    tracing::debug!(execution_id = %execution_id, %status, "worker finished")
                }
                Err(e) => {
                    tracing::warn!(execution_id = %execution_id, "worker stopped: {}", e)
                }
            }
            engine.workers().remove(&execution_id);
        });
        workers.insert(execution_id, Worker { cancel, handle });
    }
}
