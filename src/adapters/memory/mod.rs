//! In-memory adapters, used by tests and the `simulate` command.

pub mod compliance_store;
pub mod goal_repository;
pub mod task_ledger;

pub use compliance_store::InMemoryComplianceStore;
pub use goal_repository::InMemoryGoalRepository;
pub use task_ledger::InMemoryTaskLedger;
