use std::cmp::Ordering;

use chrono::{DateTime, Duration, Utc};

use super::retry_policy::saturating_hours;
use crate::domain::models::{ScoringConfig, Task};

/// Per-task inputs the calculator cannot derive from the task itself.
#[derive(Debug, Clone, Copy)]
pub struct ScoreInputs {
    /// Non-terminal tasks directly depending on this one
    pub outstanding_dependents: usize,
    /// Whether the assigned agent (if any) can take work
    pub agent_available: bool,
    pub now: DateTime<Utc>,
}

/// A ready task with its computed score.
#[derive(Debug, Clone)]
pub struct ScoredTask {
    pub task: Task,
    pub score: f64,
}

/// Service for scoring ready tasks.
///
/// Score formula: weighted sum of four factors normalized to `[0, 1]`:
/// dependency count (fewer outstanding dependents scores higher), estimated
/// complexity (lower scores higher), agent availability and time sensitivity.
#[derive(Debug, Clone)]
pub struct PriorityCalculator {
    dependency_weight: f64,
    complexity_weight: f64,
    availability_weight: f64,
    urgency_weight: f64,
    time_horizon: Duration,
}

impl Default for PriorityCalculator {
    fn default() -> Self {
        Self::new(&ScoringConfig::default())
    }
}

impl PriorityCalculator {
    pub fn new(config: &ScoringConfig) -> Self {
        Self {
            dependency_weight: config.dependency_weight,
            complexity_weight: config.complexity_weight,
            availability_weight: config.availability_weight,
            urgency_weight: config.urgency_weight,
            time_horizon: saturating_hours(config.time_horizon_hours.max(1)),
        }
    }

    /// Calculate the score for a task.
    pub fn score(&self, task: &Task, inputs: &ScoreInputs) -> f64 {
        let dependency = 1.0 / (1.0 + inputs.outstanding_dependents as f64);
        let complexity = 1.0 - task.complexity.normalized();
        let availability = if inputs.agent_available { 1.0 } else { 0.0 };
        let urgency = self.time_sensitivity(task, inputs.now);

        self.dependency_weight * dependency
            + self.complexity_weight * complexity
            + self.availability_weight * availability
            + self.urgency_weight * urgency
    }

    /// Urgency in `[0, 1]` from the task deadline.
    ///
    /// - No deadline: 0
    /// - Past deadline: 1
    /// - Otherwise rises linearly as the deadline enters the time horizon
    fn time_sensitivity(&self, task: &Task, now: DateTime<Utc>) -> f64 {
        let Some(deadline) = task.deadline else {
            return 0.0;
        };
        if deadline <= now {
            return 1.0;
        }
        let remaining = (deadline - now).num_seconds() as f64;
        let horizon = self.time_horizon.num_seconds() as f64;
        (1.0 - remaining / horizon).clamp(0.0, 1.0)
    }

    /// Sort highest score first; ties go to higher `priority`, then earlier `created_at`.
    pub fn rank(&self, mut scored: Vec<ScoredTask>) -> Vec<ScoredTask> {
        scored.sort_by(|a, b| compare_scored(a, b));
        scored
    }
}

fn compare_scored(a: &ScoredTask, b: &ScoredTask) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.task.priority.cmp(&a.task.priority))
        .then_with(|| a.task.created_at.cmp(&b.task.created_at))
}
