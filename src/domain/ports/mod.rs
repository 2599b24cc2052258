//! Port trait definitions (Hexagonal Architecture)
//!
//! Async trait interfaces that infrastructure adapters implement:
//! - TaskLedger: compare-and-swap task storage
//! - GoalRepository / ComplianceStore: goal and compliance record storage
//! - EscalationSink: delivery of escalations to operators
//! - AgentRegistry / TaskExecutor: injected agent collaborators

pub mod agent_registry;
pub mod compliance_store;
pub mod escalation_sink;
pub mod goal_repository;
pub mod task_executor;
pub mod task_ledger;

pub use agent_registry::AgentRegistry;
pub use compliance_store::ComplianceStore;
pub use escalation_sink::EscalationSink;
pub use goal_repository::GoalRepository;
pub use task_executor::{ExecutionContext, TaskExecutor};
pub use task_ledger::TaskLedger;
