//! Taskwarden - task-graph scheduler with instruction compliance
//!
//! Taskwarden schedules the tasks of a goal over a dependency graph, retries
//! failures within a per-task budget, and governs each task's agent through an
//! instruction: loop limits, permitted tools and required checkpoints or
//! reflections. Violations become escalations delivered to operators.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Models, errors and port traits
//! - **Service Layer** (`services`): Scheduler, compliance engine, resolver and policies
//! - **Application Layer** (`application`): The `Coordinator` facade
//! - **Adapters** (`adapters`): In-memory and SQLite storage, escalation sinks
//! - **Infrastructure Layer** (`infrastructure`): Configuration and logging
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use taskwarden::adapters::{agents::StaticAgentRegistry, sinks::TracingEscalationSink};
//! use taskwarden::{Config, Coordinator, GoalPlan, TaskSpec};
//!
//! # async fn run(executor: Arc<dyn taskwarden::TaskExecutor>) -> anyhow::Result<()> {
//! let coordinator = Coordinator::in_memory(
//!     executor,
//!     Arc::new(StaticAgentRegistry::new()),
//!     Arc::new(TracingEscalationSink),
//!     &Config::default(),
//! );
//! let goal = coordinator
//!     .submit_goal(GoalPlan::new("ship").with_task(TaskSpec::new("build")))
//!     .await?;
//! coordinator.run_goal(goal.id).await?;
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::Coordinator;
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    Checkpoint, Config, Escalation, EscalationReason, EscalationStatus, ExpectedOutput, Goal,
    GoalPlan, GoalStatus, Instruction, InstructionSpec, InstructionStatus, Reflection, Review,
    Task, TaskSpec, TaskStatus,
};
pub use domain::ports::{
    AgentRegistry, ComplianceStore, EscalationSink, ExecutionContext, GoalRepository,
    TaskExecutor, TaskLedger,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{ComplianceEngine, DependencyResolver, EventPayload, Scheduler};
