use std::sync::Arc;

use serde_json::Value;
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::adapters::memory::{InMemoryComplianceStore, InMemoryGoalRepository, InMemoryTaskLedger};
use crate::adapters::sinks;
use crate::adapters::sqlite::{initialize_database, DatabaseError, PoolConfig, SqliteGoalRepository, SqliteTaskLedger};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Checkpoint, Config, Escalation, EscalationStatus, Goal, GoalPlan,
    GoalStatus, Instruction, Reflection, Review, Task,
};
use crate::domain::ports::{
    AgentRegistry, ComplianceStore, EscalationSink, GoalRepository, TaskExecutor, TaskLedger,
};
use crate::services::{
    ComplianceEngine, DependencyResolver, Event, EventBus, GoalTracker, Scheduler, ScoredTask,
};

/// Facade over the scheduler and compliance engine.
///
/// Every inbound operation a collaborator can perform goes through here:
/// goal submission, result and loop reporting, checkpoint/reflection
/// handling and the operator actions (kill, requeue, resolve).
#[derive(Clone)]
pub struct Coordinator {
    ledger: Arc<dyn TaskLedger>,
    goal_repo: Arc<dyn GoalRepository>,
    goals: Arc<GoalTracker>,
    compliance: Arc<ComplianceEngine>,
    scheduler: Scheduler,
    events: Arc<EventBus>,
    resolver: DependencyResolver,
    default_max_retries: u32,
}

impl Coordinator {
    /// Wire the services over the given storage and collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: Arc<dyn TaskLedger>,
        goal_repo: Arc<dyn GoalRepository>,
        store: Arc<dyn ComplianceStore>,
        executor: Arc<dyn TaskExecutor>,
        agents: Arc<dyn AgentRegistry>,
        sink: Arc<dyn EscalationSink>,
        config: &Config,
    ) -> Self {
        let events = Arc::new(EventBus::default());
        let compliance = Arc::new(ComplianceEngine::new(
            store,
            ledger.clone(),
            sink,
            events.clone(),
        ));
        let goals = Arc::new(GoalTracker::new(
            goal_repo.clone(),
            ledger.clone(),
            events.clone(),
        ));
        let scheduler = Scheduler::new(
            ledger.clone(),
            executor,
            agents,
            compliance.clone(),
            goals.clone(),
            events.clone(),
            config,
        );

        Self {
            ledger,
            goal_repo,
            goals,
            compliance,
            scheduler,
            events,
            resolver: DependencyResolver::new(),
            default_max_retries: config.scheduler.default_max_retries,
        }
    }

    /// Everything in memory.
    pub fn in_memory(
        executor: Arc<dyn TaskExecutor>,
        agents: Arc<dyn AgentRegistry>,
        sink: Arc<dyn EscalationSink>,
        config: &Config,
    ) -> Self {
        Self::new(
            Arc::new(InMemoryTaskLedger::new()),
            Arc::new(InMemoryGoalRepository::new()),
            Arc::new(InMemoryComplianceStore::new()),
            executor,
            agents,
            sink,
            config,
        )
    }

    /// Tasks and goals in SQLite; compliance records stay in memory.
    pub fn sqlite(
        pool: SqlitePool,
        executor: Arc<dyn TaskExecutor>,
        agents: Arc<dyn AgentRegistry>,
        sink: Arc<dyn EscalationSink>,
        config: &Config,
    ) -> Self {
        Self::new(
            Arc::new(SqliteTaskLedger::new(pool.clone())),
            Arc::new(SqliteGoalRepository::new(pool)),
            Arc::new(InMemoryComplianceStore::new()),
            executor,
            agents,
            sink,
            config,
        )
    }

    /// Build from configuration: SQLite when `database.path` is set, the
    /// escalation sink per `escalation.webhook_url`.
    pub async fn from_config(
        executor: Arc<dyn TaskExecutor>,
        agents: Arc<dyn AgentRegistry>,
        config: &Config,
    ) -> Result<Self, DatabaseError> {
        let sink = sinks::from_config(&config.escalation);
        if config.database.path.is_empty() {
            return Ok(Self::in_memory(executor, agents, sink, config));
        }

        let url = format!("sqlite:{}", config.database.path);
        let pool = initialize_database(&url, Some(PoolConfig::from(&config.database))).await?;
        info!(path = %config.database.path, "using sqlite ledger");
        Ok(Self::sqlite(pool, executor, agents, sink, config))
    }

    /// Accept a goal plan.
    ///
    /// The whole plan is checked (unique keys, known dependencies, no
    /// cycles) before anything is written; a rejected plan leaves no trace
    /// in the ledger.
    #[instrument(skip(self, plan), fields(description = %plan.description))]
    pub async fn submit_goal(&self, plan: GoalPlan) -> DomainResult<Goal> {
        let mut goal = Goal::new(&plan.description);
        let tasks = plan.build_tasks(goal.id, self.default_max_retries)?;
        let instructions: Vec<Instruction> = plan
            .tasks
            .iter()
            .zip(&tasks)
            .map(|(spec, task)| spec.instruction_for(task.id))
            .collect();

        self.resolver.ensure_acyclic(&tasks)?;

        let stored = self.ledger.create_all(tasks).await?;
        goal.task_ids = stored.iter().map(|t| t.id).collect();
        self.goal_repo.create(&goal).await?;
        for instruction in &instructions {
            self.compliance.register(instruction).await?;
        }

        info!(goal_id = %goal.id, tasks = stored.len(), "goal accepted");
        for task in &stored {
            self.events.task_changed(task);
        }
        self.events.goal_changed(&goal);
        Ok(goal)
    }

    /// Result of an attempt executed outside the worker pool.
    pub async fn report_task_result(
        &self,
        task_id: Uuid,
        outcome: Result<Value, String>,
    ) -> DomainResult<Task> {
        self.scheduler.report_result(task_id, outcome).await
    }

    /// One reasoning-loop iteration or tool invocation of a governed agent.
    ///
    /// Returns the escalation raised, if any. A repeat of a condition that
    /// already has a pending escalation returns `None`.
    pub async fn report_loop_iteration(
        &self,
        instruction_id: Uuid,
        loop_count: u32,
        tool_used: Option<&str>,
    ) -> DomainResult<Option<Escalation>> {
        self.compliance
            .evaluate_iteration(instruction_id, loop_count, tool_used)
            .await
    }

    pub async fn submit_checkpoint(
        &self,
        instruction_id: Uuid,
        agent_id: &str,
        tag: &str,
        content: Value,
    ) -> DomainResult<Checkpoint> {
        self.compliance
            .submit_checkpoint(instruction_id, agent_id, tag, content)
            .await
    }

    pub async fn approve_checkpoint(
        &self,
        checkpoint_id: Uuid,
        review: Review,
    ) -> DomainResult<Checkpoint> {
        self.compliance.approve_checkpoint(checkpoint_id, review).await
    }

    pub async fn submit_reflection(
        &self,
        instruction_id: Uuid,
        agent_id: &str,
        tag: &str,
        content: Value,
    ) -> DomainResult<Reflection> {
        self.compliance
            .submit_reflection(instruction_id, agent_id, tag, content)
            .await
    }

    pub async fn kill_task(&self, task_id: Uuid) -> DomainResult<Task> {
        self.scheduler.kill_task(task_id).await
    }

    /// Re-dispatch a failed task with a fresh retry budget.
    pub async fn requeue_task(&self, task_id: Uuid) -> DomainResult<Task> {
        self.scheduler.requeue_task(task_id).await
    }

    /// Resolving never re-dispatches anything; pair it with
    /// [`Coordinator::requeue_task`] when the work should run again.
    pub async fn resolve_escalation(&self, escalation_id: Uuid) -> DomainResult<Escalation> {
        self.compliance.resolve_escalation(escalation_id).await
    }

    /// Drive a goal to quiescence on the worker pool.
    pub async fn run_goal(&self, goal_id: Uuid) -> DomainResult<GoalStatus> {
        self.goals.get(goal_id).await?;
        self.scheduler.run_goal(goal_id).await
    }

    /// Claim up to `capacity` ready tasks for an external worker pool.
    pub async fn dispatch(&self, goal_id: Uuid, capacity: usize) -> DomainResult<Vec<Task>> {
        self.scheduler.dispatch_cycle(goal_id, capacity).await
    }

    /// Ready tasks of a goal, best first, without claiming them.
    pub async fn ready_tasks(&self, goal_id: Uuid) -> DomainResult<Vec<ScoredTask>> {
        self.scheduler.select(goal_id).await
    }

    pub async fn get_goal(&self, goal_id: Uuid) -> DomainResult<Goal> {
        self.goals.refresh(goal_id).await
    }

    pub async fn list_goals(&self) -> DomainResult<Vec<Goal>> {
        self.goal_repo.list().await
    }

    pub async fn get_task(&self, task_id: Uuid) -> DomainResult<Task> {
        self.ledger.get(task_id).await
    }

    pub async fn list_tasks(&self, goal_id: Uuid) -> DomainResult<Vec<Task>> {
        self.ledger.list(goal_id).await
    }

    pub async fn instruction_for_task(&self, task_id: Uuid) -> DomainResult<Instruction> {
        self.compliance
            .instruction_for_task(task_id)
            .await?
            .ok_or(DomainError::TaskNotFound(task_id))
    }

    pub async fn get_instruction(&self, instruction_id: Uuid) -> DomainResult<Instruction> {
        self.compliance.get_instruction(instruction_id).await
    }

    pub async fn checkpoints_for(&self, instruction_id: Uuid) -> DomainResult<Vec<Checkpoint>> {
        self.compliance.checkpoints_for(instruction_id).await
    }

    pub async fn reflections_for(&self, instruction_id: Uuid) -> DomainResult<Vec<Reflection>> {
        self.compliance.reflections_for(instruction_id).await
    }

    pub async fn list_escalations(
        &self,
        status: Option<EscalationStatus>,
    ) -> DomainResult<Vec<Escalation>> {
        self.compliance.list_escalations(status).await
    }

    /// Outbound notifications: task/goal status changes and escalations.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator").finish_non_exhaustive()
    }
}
