pub mod compliance;
pub mod config;
pub mod goal;
pub mod instruction;
pub mod plan;
pub mod task;

pub use compliance::{
    Checkpoint, CheckpointStatus, Escalation, EscalationReason, EscalationStatus, Reflection,
    Review,
};
pub use config::{
    Config, DatabaseConfig, EscalationConfig, LoggingConfig, SchedulerConfig, ScoringConfig,
};
pub use goal::{Goal, GoalStatus};
pub use instruction::{ExpectedOutput, Instruction, InstructionStatus, OutputKind};
pub use plan::{GoalPlan, InstructionSpec, TaskSpec, UNASSIGNED_AGENT};
pub use task::{Complexity, Task, TaskStatus, TaskTransition};
