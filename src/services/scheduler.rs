//! Scheduler / dispatcher.
//!
//! Owns every task status transition. Claims go through the ledger's
//! compare-and-swap before a worker ever sees the task, so at most one
//! execution per task is active. No in-memory lock is shared between
//! workers; a worker whose task was killed underneath it simply loses the
//! CAS when it reports back.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::compliance_engine::ComplianceEngine;
use super::dependency_resolver::DependencyResolver;
use super::event_bus::EventBus;
use super::goal_tracker::GoalTracker;
use super::priority_calculator::{PriorityCalculator, ScoreInputs, ScoredTask};
use super::retry_policy::{RetryOutcome, RetryPolicy};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Config, Escalation, GoalStatus, SchedulerConfig, Task, TaskStatus, TaskTransition,
};
use crate::domain::ports::{AgentRegistry, ExecutionContext, TaskExecutor, TaskLedger};

#[derive(Clone)]
pub struct Scheduler {
    ledger: Arc<dyn TaskLedger>,
    executor: Arc<dyn TaskExecutor>,
    agents: Arc<dyn AgentRegistry>,
    compliance: Arc<ComplianceEngine>,
    goals: Arc<GoalTracker>,
    events: Arc<EventBus>,
    resolver: DependencyResolver,
    priority: PriorityCalculator,
    retry: RetryPolicy,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        ledger: Arc<dyn TaskLedger>,
        executor: Arc<dyn TaskExecutor>,
        agents: Arc<dyn AgentRegistry>,
        compliance: Arc<ComplianceEngine>,
        goals: Arc<GoalTracker>,
        events: Arc<EventBus>,
        config: &Config,
    ) -> Self {
        Self {
            ledger,
            executor,
            agents,
            compliance,
            goals,
            events,
            resolver: DependencyResolver::new(),
            priority: PriorityCalculator::new(&config.scoring),
            retry: RetryPolicy::from_hours(config.scheduler.stall_threshold_hours),
            config: config.scheduler.clone(),
        }
    }

    fn claim_attempts(&self) -> u32 {
        self.config.claim_attempts.max(1)
    }

    /// Ready tasks of a goal, best first.
    pub async fn select(&self, goal_id: Uuid) -> DomainResult<Vec<ScoredTask>> {
        let tasks = self.ledger.list(goal_id).await?;
        let dependents = self.resolver.outstanding_dependents(&tasks);
        let now = Utc::now();

        let mut scored = Vec::new();
        for task in self.resolver.ready_tasks(&tasks) {
            let agent_available = match &task.assigned_agent {
                Some(agent) => self.agents.is_available(agent).await,
                None => true,
            };
            let inputs = ScoreInputs {
                outstanding_dependents: dependents.get(&task.id).copied().unwrap_or(0),
                agent_available,
                now,
            };
            scored.push(ScoredTask {
                score: self.priority.score(task, &inputs),
                task: task.clone(),
            });
        }
        Ok(self.priority.rank(scored))
    }

    async fn dependencies_completed(&self, task: &Task) -> DomainResult<bool> {
        for dep in &task.dependencies {
            if self.ledger.get(*dep).await?.status != TaskStatus::Completed {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Move a task `pending → in_progress`.
    ///
    /// Returns `None` when the task is no longer claimable: another
    /// dispatcher won the race, it left `pending`, or a dependency is not
    /// `completed`. Conflicts are retried by re-reading.
    #[instrument(skip(self))]
    pub async fn claim(&self, task_id: Uuid) -> DomainResult<Option<Task>> {
        for attempt in 0..self.claim_attempts() {
            let task = self.ledger.get(task_id).await?;
            if task.status != TaskStatus::Pending {
                return Ok(None);
            }
            // Completed has no exits, so this check cannot go stale before the CAS
            if !self.dependencies_completed(&task).await? {
                return Ok(None);
            }

            let transition = TaskTransition::from_observed(&task, TaskStatus::InProgress);
            match self.ledger.update(task_id, &transition).await {
                Ok(claimed) => {
                    info!(task_id = %task_id, attempt = claimed.retry_count, "task claimed");
                    self.published(&claimed).await;
                    if let Err(e) = self.compliance.on_task_started(task_id).await {
                        warn!(task_id = %task_id, error = %e, "instruction start hook failed");
                    }
                    return Ok(Some(claimed));
                }
                Err(e) if e.is_conflict() => {
                    debug!(task_id = %task_id, attempt, "claim lost a race, re-reading");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// One dispatch cycle: settle blocked tasks, flag stalls, then claim
    /// the best ready tasks up to `capacity`.
    pub async fn dispatch_cycle(&self, goal_id: Uuid, capacity: usize) -> DomainResult<Vec<Task>> {
        self.sync_blocked(goal_id).await?;
        self.sweep_stalled(goal_id).await?;

        let mut claimed = Vec::new();
        if capacity == 0 {
            return Ok(claimed);
        }
        for candidate in self.select(goal_id).await? {
            if let Some(task) = self.claim(candidate.task.id).await? {
                claimed.push(task);
                if claimed.len() >= capacity {
                    break;
                }
            }
        }
        Ok(claimed)
    }

    /// Run the executor for a claimed task and record the outcome.
    pub async fn execute(&self, claimed: Task) -> DomainResult<Task> {
        let ctx = ExecutionContext::new(claimed.id, claimed.retry_count, self.ledger.clone());
        let outcome = AssertUnwindSafe(self.executor.execute(&claimed, &ctx))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err("executor panicked".to_string()));

        match outcome {
            Ok(result) => self.complete_task(&claimed, result).await,
            Err(error) => self.fail_task(&claimed, &error).await.map(|(task, _)| task),
        }
    }

    /// Record a result for the attempt described by `claimed`.
    ///
    /// Fails with `Conflict` when the task moved on (e.g. it was killed).
    pub async fn complete_task(&self, claimed: &Task, result: Value) -> DomainResult<Task> {
        let transition =
            TaskTransition::from_observed(claimed, TaskStatus::Completed).with_result(result);
        let task = self.ledger.update(claimed.id, &transition).await?;
        info!(task_id = %task.id, "task completed");

        self.published(&task).await;
        if let Err(e) = self.compliance.on_task_completed(task.id).await {
            warn!(task_id = %task.id, error = %e, "instruction completion hook failed");
        }
        Ok(task)
    }

    /// Record a failed attempt and apply the retry policy.
    pub async fn fail_task(
        &self,
        claimed: &Task,
        error: &str,
    ) -> DomainResult<(Task, RetryOutcome)> {
        let (transition, outcome) = self.retry.on_failure(claimed, error);
        let task = self.ledger.update(claimed.id, &transition).await?;

        match outcome {
            RetryOutcome::Retry => {
                info!(task_id = %task.id, retry_count = task.retry_count, error, "task failed, retrying");
                self.published(&task).await;
            }
            RetryOutcome::Exhausted => {
                warn!(task_id = %task.id, retry_count = task.retry_count, error, "task retries exhausted");
                self.settle_terminal_failure(&task).await?;
            }
        }
        Ok((task, outcome))
    }

    /// Apply an externally reported result to whatever attempt is in flight.
    pub async fn report_result(
        &self,
        task_id: Uuid,
        outcome: Result<Value, String>,
    ) -> DomainResult<Task> {
        let current = self.ledger.get(task_id).await?;
        if current.status != TaskStatus::InProgress {
            let to = if outcome.is_ok() {
                TaskStatus::Completed
            } else {
                TaskStatus::Failed
            };
            return Err(DomainError::InvalidStateTransition {
                from: current.status,
                to,
            });
        }
        match outcome {
            Ok(result) => self.complete_task(&current, result).await,
            Err(error) => self.fail_task(&current, &error).await.map(|(task, _)| task),
        }
    }

    /// Kill a task regardless of worker progress. Killing is terminal and
    /// idempotent.
    #[instrument(skip(self))]
    pub async fn kill_task(&self, task_id: Uuid) -> DomainResult<Task> {
        let mut last_conflict = None;
        for _ in 0..self.claim_attempts() {
            let task = self.ledger.get(task_id).await?;
            if task.status == TaskStatus::Killed {
                return Ok(task);
            }
            if !task.status.can_transition_to(TaskStatus::Killed) {
                return Err(DomainError::InvalidStateTransition {
                    from: task.status,
                    to: TaskStatus::Killed,
                });
            }

            let transition = TaskTransition::from_observed(&task, TaskStatus::Killed);
            match self.ledger.update(task_id, &transition).await {
                Ok(killed) => {
                    warn!(task_id = %task_id, previous = %task.status, "task killed");
                    self.settle_terminal_failure(&killed).await?;
                    return Ok(killed);
                }
                Err(e) if e.is_conflict() => last_conflict = Some(e),
                Err(e) => return Err(e),
            }
        }
        Err(last_conflict.unwrap_or_else(|| DomainError::Storage("kill not applied".to_string())))
    }

    /// Operator re-dispatch of a failed task with a fresh retry budget.
    pub async fn requeue_task(&self, task_id: Uuid) -> DomainResult<Task> {
        let task = self.ledger.get(task_id).await?;
        if task.status != TaskStatus::Failed {
            return Err(DomainError::InvalidStateTransition {
                from: task.status,
                to: TaskStatus::Pending,
            });
        }

        let transition =
            TaskTransition::from_observed(&task, TaskStatus::Pending).with_retry_count(0);
        let requeued = self.ledger.update(task_id, &transition).await?;
        info!(task_id = %task_id, "task requeued");

        if let Err(e) = self.compliance.on_task_requeued(task_id).await {
            warn!(task_id = %task_id, error = %e, "instruction requeue hook failed");
        }
        self.events.task_changed(&requeued);
        self.sync_blocked(requeued.goal_id).await?;
        self.refresh_goal(requeued.goal_id).await;
        Ok(requeued)
    }

    async fn settle_terminal_failure(&self, task: &Task) -> DomainResult<()> {
        self.events.task_changed(task);
        if let Err(e) = self.compliance.on_task_failed(task.id).await {
            error!(task_id = %task.id, error = %e, "instruction failure hook failed");
        }
        self.sync_blocked(task.goal_id).await?;
        self.refresh_goal(task.goal_id).await;
        Ok(())
    }

    /// Make `blocked` mirror upstream failure. Returns the number of tasks changed.
    pub async fn sync_blocked(&self, goal_id: Uuid) -> DomainResult<usize> {
        let tasks = self.ledger.list(goal_id).await?;
        let updates = self.resolver.blocking_updates(&tasks)?;
        if updates.is_empty() {
            return Ok(0);
        }

        let by_id: HashMap<Uuid, &Task> = tasks.iter().map(|t| (t.id, t)).collect();
        let mut changed = 0;
        for (task_id, status) in updates {
            let Some(task) = by_id.get(&task_id) else {
                continue;
            };
            let transition = TaskTransition::from_observed(task, status);
            match self.ledger.update(task_id, &transition).await {
                Ok(updated) => {
                    debug!(task_id = %task_id, status = %status, "blocked state synced");
                    self.events.task_changed(&updated);
                    changed += 1;
                }
                // The next cycle sees the fresh state
                Err(e) if e.is_conflict() => debug!(task_id = %task_id, "blocked sync raced"),
                Err(e) => return Err(e),
            }
        }
        Ok(changed)
    }

    /// Flag non-terminal tasks without a status change for longer than the
    /// stall threshold. Tasks are left running.
    pub async fn sweep_stalled(&self, goal_id: Uuid) -> DomainResult<Vec<Escalation>> {
        let tasks = self.ledger.list(goal_id).await?;
        let mut raised = Vec::new();
        for task in self.retry.stalled(&tasks, Utc::now()) {
            match self.compliance.flag_stalled(task).await {
                Ok(Some(escalation)) => raised.push(escalation),
                Ok(None) => {}
                Err(e) => warn!(task_id = %task.id, error = %e, "stall escalation failed"),
            }
        }
        Ok(raised)
    }

    async fn published(&self, task: &Task) {
        self.events.task_changed(task);
        self.refresh_goal(task.goal_id).await;
    }

    async fn refresh_goal(&self, goal_id: Uuid) {
        if let Err(e) = self.goals.refresh(goal_id).await {
            // Tasks may be scheduled without a registered goal
            debug!(goal_id = %goal_id, error = %e, "goal refresh skipped");
        }
    }

    /// Drive a goal until nothing is in flight and nothing is ready.
    ///
    /// Up to `max_workers` executions run at once on a `JoinSet`.
    #[instrument(skip(self))]
    pub async fn run_goal(&self, goal_id: Uuid) -> DomainResult<GoalStatus> {
        let capacity = self.config.max_workers.max(1);
        let mut workers: JoinSet<DomainResult<Task>> = JoinSet::new();

        loop {
            let free = capacity.saturating_sub(workers.len());
            for task in self.dispatch_cycle(goal_id, free).await? {
                let scheduler = self.clone();
                workers.spawn(async move { scheduler.execute(task).await });
            }

            match workers.join_next().await {
                Some(Ok(Ok(task))) => {
                    debug!(task_id = %task.id, status = %task.status, "worker finished");
                }
                Some(Ok(Err(e))) if e.is_conflict() => {
                    info!(error = %e, "worker result discarded, task moved on");
                }
                Some(Ok(Err(e))) => error!(error = %e, "worker failed to record outcome"),
                Some(Err(e)) => error!(error = %e, "worker aborted"),
                None => break,
            }
        }

        let goal = self.goals.refresh(goal_id).await?;
        info!(goal_id = %goal_id, status = %goal.status, "goal run finished");
        Ok(goal.status)
    }
}
