pub mod compliance_engine;
pub mod dependency_resolver;
pub mod escalation_rules;
pub mod event_bus;
pub mod goal_tracker;
pub mod priority_calculator;
pub mod retry_policy;
pub mod scheduler;

pub use compliance_engine::{ComplianceEngine, UnmetOutputs};
pub use dependency_resolver::DependencyResolver;
pub use escalation_rules::{EscalationRule, RuleContext, RuleMatch, RuleTable};
pub use event_bus::{Event, EventBus, EventBusConfig, EventPayload, SequenceNumber};
pub use goal_tracker::{derive_goal_status, GoalTracker};
pub use priority_calculator::{PriorityCalculator, ScoreInputs, ScoredTask};
pub use retry_policy::{RetryOutcome, RetryPolicy};
pub use scheduler::Scheduler;
