//! Task Scheduler: drives one execution's plan through the agent runner.
//!
//! One worker per execution, guarded by a store lease that a heartbeat keeps
//! renewed. Tasks of the same execution never run concurrently. Cancellation
//! is checked between tasks; a call already in flight runs to completion or
//! its own timeout. A worker that loses its lease stops without writing.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::context::{interpolate, merge_context};
use super::delegation::{DelegationContext, DelegationDecision, DelegationPolicy};
use super::plan::{ExecutionPlan, ProcessPlan};
use crate::config::EngineSettings;
use crate::error::{EngineError, RunnerError, StoreError};
use crate::metering::MeteringSink;
use crate::model::{Crew, CrewExecution, ExecutionStatus, TaskResult};
use crate::runner::{AgentConfig, AgentRunner, RunRequest, RunnerSet};
use crate::state::{StateTransition, StatsAggregator, TerminalOutcome};
use crate::store::{CrewStore, ExecutionMutation, ExecutionStore};

/// Outcomes gathered while the worker walks the plan.
#[derive(Debug, Default)]
struct RunState {
    outputs: BTreeMap<String, String>,
    /// (task id, error) in the order tasks failed.
    failures: Vec<(String, String)>,
    skipped: Vec<String>,
    /// Set when the runner reported a fault that stops all further work.
    fatal: Option<String>,
}

impl RunState {
    /// Pick up what an earlier worker already recorded.
    fn from_execution(exec: &CrewExecution) -> Self {
        let mut state = Self {
            outputs: exec.outputs(),
            ..Self::default()
        };
        for (task_id, result) in &exec.results {
            if let TaskResult::Skipped { .. } = result {
                state.skipped.push(task_id.clone());
            }
        }
        for task_id in &exec.failed_tasks {
            state
                .failures
                .push((task_id.clone(), "failed before the worker resumed".to_string()));
        }
        state
    }

    fn has_outcome(&self, task_id: &str) -> bool {
        self.outputs.contains_key(task_id)
            || self.skipped.iter().any(|t| t == task_id)
            || self.failures.iter().any(|(t, _)| t == task_id)
    }

    fn finished(&self) -> usize {
        self.outputs.len() + self.skipped.len() + self.failures.len()
    }

    fn failure_message(&self) -> Option<String> {
        if let Some(fatal) = &self.fatal {
            return Some(fatal.clone());
        }
        if self.failures.is_empty() && self.skipped.is_empty() {
            return None;
        }

        let mut msg = match self.failures.first() {
            Some((task_id, error)) => format!("Task '{task_id}' failed: {error}"),
            None => "Execution did not complete every task".to_string(),
        };
        if self.failures.len() > 1 {
            msg.push_str(&format!(" ({} more task(s) failed)", self.failures.len() - 1));
        }
        if !self.skipped.is_empty() {
            msg.push_str(&format!("; {} task(s) skipped", self.skipped.len()));
        }
        Some(msg)
    }
}

/// The worker's claim on an execution.
struct WorkerLease {
    worker_id: String,
    /// Cancelled once a renewal fails.
    lost: CancellationToken,
}

impl WorkerLease {
    fn lost_error(&self, execution_id: Uuid) -> EngineError {
        StoreError::LeaseLost {
            execution_id,
            worker_id: self.worker_id.clone(),
        }
        .into()
    }
}

enum Flow {
    Finished,
    Cancelled,
}

/// Everything one worker needs while walking a plan.
struct RunContext<'a> {
    exec: &'a CrewExecution,
    crew: &'a Crew,
    plan: &'a ExecutionPlan<'a>,
    runner: Arc<dyn AgentRunner>,
    cancel: &'a CancellationToken,
    lease: &'a WorkerLease,
}

#[derive(Clone)]
pub struct TaskScheduler {
    crews: Arc<dyn CrewStore>,
    store: Arc<dyn ExecutionStore>,
    runners: RunnerSet,
    delegation: Arc<dyn DelegationPolicy>,
    sink: MeteringSink,
    stats: StatsAggregator,
    settings: EngineSettings,
}

impl TaskScheduler {
    pub fn new(
        crews: Arc<dyn CrewStore>,
        store: Arc<dyn ExecutionStore>,
        runners: RunnerSet,
        delegation: Arc<dyn DelegationPolicy>,
        sink: MeteringSink,
        stats: StatsAggregator,
        settings: EngineSettings,
    ) -> Self {
        Self {
            crews,
            store,
            runners,
            delegation,
            sink,
            stats,
            settings,
        }
    }

    /// Drive an execution to a terminal status.
    ///
    /// Fails with `StoreError::LeaseHeld` without touching the execution if
    /// another worker holds it, or with a lease conflict if the lease is lost
    /// mid-run. Any other error is recorded as an `execution_aborted` row and
    /// the execution is marked failed.
    #[tracing::instrument(name = "drive", skip_all, fields(execution_id = %execution_id))]
    pub async fn drive(
        &self,
        execution_id: Uuid,
        cancel: CancellationToken,
    ) -> Result<ExecutionStatus, EngineError> {
        let worker_id = format!("worker-{}", Uuid::new_v4());
        self.store
            .acquire_lease(execution_id, &worker_id, self.settings.lease_ttl())
            .await?;
        tracing::debug!(worker_id = %worker_id, "lease acquired");

        let lease = WorkerLease {
            worker_id,
            lost: CancellationToken::new(),
        };
        let stop_heartbeat = CancellationToken::new();
        let heartbeat = self.spawn_heartbeat(execution_id, &lease, stop_heartbeat.clone());

        let result = match self.run(execution_id, &cancel, &lease).await {
            Ok(status) => Ok(status),
            Err(e) if e.is_lease_conflict() || lease.lost.is_cancelled() => {
                tracing::warn!(worker_id = %lease.worker_id, "lease lost, worker stopped: {}", e);
                Err(e)
            }
            Err(e) => {
                tracing::error!("execution aborted: {}", e);
                self.abort(execution_id, &e).await;
                Err(e)
            }
        };

        stop_heartbeat.cancel();
        if let Err(e) = heartbeat.await {
            tracing::debug!("lease heartbeat ended abnormally: {}", e);
        }
        if let Err(e) = self.store.release_lease(execution_id, &lease.worker_id).await {
            tracing::warn!(worker_id = %lease.worker_id, "failed to release lease: {}", e);
        }
        result
    }

    /// Renew the lease every third of its ttl until stopped or a renewal fails.
    fn spawn_heartbeat(
        &self,
        execution_id: Uuid,
        lease: &WorkerLease,
        stop: CancellationToken,
    ) -> JoinHandle<()> {
        let store = self.store.clone();
        let worker_id = lease.worker_id.clone();
        let lost = lease.lost.clone();
        let ttl = self.settings.lease_ttl();
        let every = (ttl / 3).max(Duration::from_millis(1));

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.cancelled() => return,
                    _ = tokio::time::sleep(every) => {}
                }
                if let Err(e) = store.renew_lease(execution_id, &worker_id, ttl).await {
                    tracing::warn!(
                        execution_id = %execution_id,
                        worker_id = %worker_id,
                        "lease renewal failed: {}",
                        e
                    );
                    lost.cancel();
                    return;
                }
            }
        })
    }

    /// Checkpoint before writing: the lease must still be ours.
    async fn hold_lease(&self, execution_id: Uuid, lease: &WorkerLease) -> Result<(), EngineError> {
        if lease.lost.is_cancelled() {
            return Err(lease.lost_error(execution_id));
        }
        let renewed = self
            .store
            .renew_lease(execution_id, &lease.worker_id, self.settings.lease_ttl())
            .await;
        if let Err(e) = renewed {
            lease.lost.cancel();
            return Err(e.into());
        }
        Ok(())
    }

    async fn run(
        &self,
        execution_id: Uuid,
        cancel: &CancellationToken,
        lease: &WorkerLease,
    ) -> Result<ExecutionStatus, EngineError> {
        let exec = self.store.get_execution(execution_id).await?;
        match exec.status {
            ExecutionStatus::Pending => {}
            ExecutionStatus::Running => {
                tracing::info!("resuming execution left running by an earlier worker")
            }
            // cancelled before the worker got to start it
            ExecutionStatus::Cancelled => {
                let pending = self.unfinished_steps(&exec).await;
                tracing::info!(pending_tasks = pending, "cancellation acknowledged");
                self.sink
                    .cancellation_acknowledged(execution_id, pending)
                    .await?;
                return Ok(ExecutionStatus::Cancelled);
            }
            status => {
                tracing::debug!(%status, "execution already finished");
                return Ok(status);
            }
        }

        let crew = self.crews.fetch_crew(&exec.crew_id).await?;
        let plan = ExecutionPlan::resolve(&crew, self.settings.manager_role.as_deref())?;
        let runner = self.runners.get(exec.mode)?;

        if exec.status == ExecutionStatus::Pending {
            let started = self
                .store
                .update_execution(
                    execution_id,
                    Box::new(|e: &mut CrewExecution| StateTransition::start(e)),
                )
                .await;
            match started {
                Ok(_) => {
                    tracing::info!(
                        crew_id = %crew.id,
                        mode = %exec.mode,
                        steps = plan.process.step_count(),
                        "execution started"
                    );
                    self.sink
                        .status_changed(execution_id, ExecutionStatus::Running);
                }
                Err(StoreError::Transition(e)) if e.current() == ExecutionStatus::Cancelled => {
                    self.sink
                        .cancellation_acknowledged(execution_id, plan.process.step_count())
                        .await?;
                    return Ok(ExecutionStatus::Cancelled);
                }
                Err(e) => return Err(e.into()),
            }
        }

        let mut state = RunState::from_execution(&exec);
        let ctx = RunContext {
            exec: &exec,
            crew: &crew,
            plan: &plan,
            runner,
            cancel,
            lease,
        };

        let flow = match &plan.process {
            ProcessPlan::Sequential { order } => {
                self.run_sequential(&ctx, order, &mut state).await?
            }
            ProcessPlan::Hierarchical { levels, manager } => {
                self.run_hierarchical(&ctx, levels, *manager, &mut state)
                    .await?
            }
        };

        self.hold_lease(execution_id, lease).await?;
        match flow {
            Flow::Cancelled => {
                let pending = plan.process.step_count().saturating_sub(state.finished());
                self.acknowledge_cancel(execution_id, pending).await
            }
            Flow::Finished => self.finalize(execution_id, &state).await,
        }
    }

    async fn run_sequential(
        &self,
        ctx: &RunContext<'_>,
        order: &[usize],
        state: &mut RunState,
    ) -> Result<Flow, EngineError> {
        for &i in order {
            let task = &ctx.crew.tasks[i];
            if state.has_outcome(&task.id) {
                continue;
            }
            self.hold_lease(ctx.exec.id, ctx.lease).await?;
            if ctx.cancel.is_cancelled() {
                return Ok(Flow::Cancelled);
            }
            if state.fatal.is_some() {
                break;
            }
            if let Some(blocker) = blocker(ctx, state, i) {
                self.skip(ctx, state, i, &blocker).await?;
                continue;
            }

            let agent_index = task
                .agent_id
                .as_deref()
                .and_then(|id| ctx.crew.agent_index(id))
                .ok_or_else(|| {
                    EngineError::Internal(format!("task '{}' lost its agent", task.id))
                })?;
            self.run_task(ctx, state, i, agent_index).await?;
        }
        Ok(Flow::Finished)
    }

    async fn run_hierarchical(
        &self,
        ctx: &RunContext<'_>,
        levels: &[Vec<usize>],
        manager: usize,
        state: &mut RunState,
    ) -> Result<Flow, EngineError> {
        for level in levels {
            let mut ready = Vec::with_capacity(level.len());
            for &i in level {
                if state.has_outcome(&ctx.crew.tasks[i].id) {
                    continue;
                }
                self.hold_lease(ctx.exec.id, ctx.lease).await?;
                if ctx.cancel.is_cancelled() {
                    return Ok(Flow::Cancelled);
                }
                if state.fatal.is_some() {
                    return Ok(Flow::Finished);
                }
                match blocker(ctx, state, i) {
                    Some(blocker) => self.skip(ctx, state, i, &blocker).await?,
                    None => ready.push(i),
                }
            }

            while !ready.is_empty() {
                self.hold_lease(ctx.exec.id, ctx.lease).await?;
                if ctx.cancel.is_cancelled() {
                    return Ok(Flow::Cancelled);
                }
                if state.fatal.is_some() {
                    return Ok(Flow::Finished);
                }
                let decision = self.delegate(ctx, manager, &ready, state).await?;
                ready.retain(|&i| i != decision.task_index);
                self.run_task(ctx, state, decision.task_index, decision.agent_index)
                    .await?;
            }
        }
        Ok(Flow::Finished)
    }

    /// Ask the delegation policy for the next dispatch and log the decision.
    /// The call gets the manager's task ceiling. A failing, timed out or
    /// out-of-range answer falls back to the first ready task.
    async fn delegate(
        &self,
        ctx: &RunContext<'_>,
        manager: usize,
        ready: &[usize],
        state: &RunState,
    ) -> Result<DelegationDecision, EngineError> {
        let dctx = DelegationContext {
            execution_id: ctx.exec.id,
            crew: ctx.crew,
            manager,
            ready,
            outputs: &state.outputs,
            input_variables: &ctx.exec.input_variables,
            mode: ctx.exec.mode,
            runner: ctx.runner.clone(),
        };

        let manager_config = AgentConfig::from_agent(ctx.crew, &ctx.crew.agents[manager]);
        let ceiling = self.settings.task_timeout(manager_config.max_iterations);
        let decided = match tokio::time::timeout(ceiling, self.delegation.decide(&dctx)).await {
            Ok(result) => result,
            Err(_) => Err(RunnerError::Timeout(ceiling)),
        };
        let mut decision = match decided {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(policy = self.delegation.name(), "delegation failed: {}", e);
                DelegationDecision {
                    fallback_reason: Some(format!("delegation call failed: {e}")),
                    ..dctx.first_ready()
                }
            }
        };
        if !dctx.is_ready(decision.task_index) || decision.agent_index >= ctx.crew.agents.len() {
            decision = DelegationDecision {
                tokens_used: decision.tokens_used,
                fallback_reason: Some("policy chose a task or agent outside the ready set".into()),
                ..dctx.first_ready()
            };
        }

        let task = &ctx.crew.tasks[decision.task_index];
        self.sink
            .delegation(
                ctx.exec.id,
                &task.id,
                &ctx.crew.agents[manager].id,
                &ctx.crew.agents[decision.agent_index].id,
                self.delegation.name(),
                &decision.rationale,
                decision.tokens_used,
                decision.fallback_reason.as_deref(),
            )
            .await?;
        Ok(decision)
    }

    async fn skip(
        &self,
        ctx: &RunContext<'_>,
        state: &mut RunState,
        task_index: usize,
        blocked_by: &str,
    ) -> Result<(), EngineError> {
        let task_id = &ctx.crew.tasks[task_index].id;
        tracing::info!(task_id = %task_id, blocked_by, "task skipped");
        self.sink
            .task_skipped(ctx.exec.id, task_id, blocked_by)
            .await?;
        state.skipped.push(task_id.clone());
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(task_id = %ctx.crew.tasks[task_index].id))]
    async fn run_task(
        &self,
        ctx: &RunContext<'_>,
        state: &mut RunState,
        task_index: usize,
        agent_index: usize,
    ) -> Result<(), EngineError> {
        let exec = ctx.exec;
        let task = &ctx.crew.tasks[task_index];
        let agent = &ctx.crew.agents[agent_index];

        self.sink
            .task_started(exec.id, &task.id, Some(&agent.id))
            .await?;

        let dependency_outputs = ctx.plan.graph.deps(task_index).iter().filter_map(|&d| {
            let dep_id = ctx.crew.tasks[d].id.as_str();
            state
                .outputs
                .get(dep_id)
                .map(|output| (dep_id, output.as_str()))
        });
        let request = RunRequest {
            execution_id: exec.id.to_string(),
            task_id: task.id.clone(),
            agent: AgentConfig::from_agent(ctx.crew, agent),
            description: interpolate(&task.description, &exec.input_variables),
            expected_output: interpolate(&task.expected_output, &exec.input_variables),
            context: merge_context(&exec.input_variables, &task.context, dependency_outputs),
            mode: exec.mode,
        };

        let ceiling = self.settings.task_timeout(request.agent.max_iterations);
        let started = Instant::now();
        let result = tokio::select! {
            called = tokio::time::timeout(ceiling, ctx.runner.run(&request)) => match called {
                Ok(result) => result,
                Err(_) => Err(RunnerError::Timeout(ceiling)),
            },
            _ = ctx.lease.lost.cancelled() => return Err(ctx.lease.lost_error(exec.id)),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;
        self.hold_lease(exec.id, ctx.lease).await?;

        match result {
            Ok(out) => {
                tracing::info!(
                    agent_id = %agent.id,
                    tokens = out.tokens_used,
                    attempts = out.attempts,
                    elapsed_ms,
                    "task completed"
                );
                self.sink
                    .task_completed(
                        exec.id,
                        &task.id,
                        Some(&agent.id),
                        &agent.llm.model,
                        &out.output,
                        out.tokens_used,
                    )
                    .await?;
                state.outputs.insert(task.id.clone(), out.output);
            }
            Err(err) => {
                let detail = err.to_string();
                tracing::warn!(agent_id = %agent.id, elapsed_ms, "task failed: {}", detail);
                self.sink
                    .task_failed(exec.id, &task.id, Some(&agent.id), &detail)
                    .await?;
                if err.is_fatal() {
                    state.fatal = Some(format!("Agent runner fault on task '{}': {detail}", task.id));
                }
                state.failures.push((task.id.clone(), detail));
            }
        }
        Ok(())
    }

    async fn finalize(
        &self,
        execution_id: Uuid,
        state: &RunState,
    ) -> Result<ExecutionStatus, EngineError> {
        let totals = self.sink.totals_from_logs(execution_id).await?;
        let failure = state.failure_message();

        let mutation: ExecutionMutation = Box::new(move |e: &mut CrewExecution| {
            e.total_tokens_used = totals.tokens_used;
            e.cost = totals.cost;
            match failure {
                Some(message) => StateTransition::fail(e, message),
                None => StateTransition::complete(e),
            }
        });

        match self.store.update_execution(execution_id, mutation).await {
            Ok(done) => {
                tracing::info!(
                    status = %done.status,
                    tokens = done.total_tokens_used,
                    cost = done.cost,
                    duration_ms = done.duration_ms().unwrap_or(0),
                    "execution finished"
                );
                self.sink.status_changed(execution_id, done.status);
                self.stats.record(TerminalOutcome::from_execution(&done));
                Ok(done.status)
            }
            // cancelled while the last task was in flight
            Err(StoreError::Transition(e)) if e.current() == ExecutionStatus::Cancelled => {
                self.sink
                    .cancellation_acknowledged(execution_id, 0)
                    .await?;
                Ok(ExecutionStatus::Cancelled)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Stop at a checkpoint. The controller normally made the transition
    /// already; if not (shutdown), the worker makes it.
    async fn acknowledge_cancel(
        &self,
        execution_id: Uuid,
        pending_tasks: usize,
    ) -> Result<ExecutionStatus, EngineError> {
        let message = self.settings.cancel_message.clone();
        let cancelled = self
            .store
            .update_execution(
                execution_id,
                Box::new(move |e: &mut CrewExecution| StateTransition::cancel(e, message)),
            )
            .await;
        match cancelled {
            Ok(done) => {
                self.sink.status_changed(execution_id, done.status);
                self.stats.record(TerminalOutcome::from_execution(&done));
            }
            Err(StoreError::Transition(e)) if e.current() == ExecutionStatus::Cancelled => {}
            Err(e) => return Err(e.into()),
        }

        tracing::info!(pending_tasks, "cancellation acknowledged");
        self.sink
            .cancellation_acknowledged(execution_id, pending_tasks)
            .await?;
        Ok(ExecutionStatus::Cancelled)
    }

    /// Steps of the crew's current plan without a recorded result; 0 if the
    /// plan no longer resolves.
    async fn unfinished_steps(&self, exec: &CrewExecution) -> usize {
        let crew = match self.crews.fetch_crew(&exec.crew_id).await {
            Ok(crew) => crew,
            Err(_) => return 0,
        };
        match ExecutionPlan::resolve(&crew, self.settings.manager_role.as_deref()) {
            Ok(plan) => plan.process.step_count().saturating_sub(exec.results.len()),
            Err(_) => 0,
        }
    }

    /// Best effort: record the error and move the execution to `failed`.
    async fn abort(&self, execution_id: Uuid, error: &EngineError) {
        let message = error.to_string();
        if let Err(e) = self.sink.aborted(execution_id, &message).await {
            tracing::error!("failed to log abort: {}", e);
        }

        let failed = self
            .store
            .update_execution(
                execution_id,
                Box::new(move |e: &mut CrewExecution| {
                    if e.status == ExecutionStatus::Pending {
                        StateTransition::start(e)?;
                    }
                    StateTransition::fail(e, message)
                }),
            )
            .await;
        match failed {
            Ok(done) => {
                self.sink.status_changed(execution_id, done.status);
                self.stats.record(TerminalOutcome::from_execution(&done));
            }
            Err(e) => tracing::warn!("could not mark execution failed: {}", e),
        }
    }
}

/// First dependency of `task_index` without a successful result.
fn blocker(ctx: &RunContext<'_>, state: &RunState, task_index: usize) -> Option<String> {
    ctx.plan
        .graph
        .deps(task_index)
        .iter()
        .map(|&d| &ctx.crew.tasks[d].id)
        .find(|dep_id| !state.outputs.contains_key(dep_id.as_str()))
        .cloned()
}
