//! Goal plans: the inbound shape of `submit_goal`.
//!
//! Tasks reference each other by plan-local `key`; the coordinator maps keys
//! to task IDs once the plan is accepted.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use uuid::Uuid;

use super::instruction::{ExpectedOutput, Instruction};
use super::task::Complexity;
use super::task::Task;
use crate::domain::errors::{DomainError, DomainResult};

/// Agent recorded on instructions for tasks planned without one
pub const UNASSIGNED_AGENT: &str = "unassigned";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalPlan {
    pub description: String,
    #[serde(default)]
    pub tasks: Vec<TaskSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Plan-local name, unique within the plan
    pub key: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Falls back to the scheduler default
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub complexity: Complexity,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub instruction: Option<InstructionSpec>,
}

impl TaskSpec {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: String::new(),
            priority: 0,
            agent: None,
            depends_on: Vec::new(),
            max_retries: None,
            complexity: Complexity::default(),
            deadline: None,
            instruction: None,
        }
    }

    pub fn depends_on(mut self, key: impl Into<String>) -> Self {
        self.depends_on.push(key.into());
        self
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_instruction(mut self, instruction: InstructionSpec) -> Self {
        self.instruction = Some(instruction);
        self
    }

    /// The instruction governing this task once it is `task_id`. Tasks
    /// planned without one get an unrestricted instruction.
    pub fn instruction_for(&self, task_id: Uuid) -> Instruction {
        let agent = self.agent.as_deref().unwrap_or(UNASSIGNED_AGENT);
        self.instruction.as_ref().map_or_else(
            || Instruction::unrestricted(task_id, agent),
            |spec| spec.to_instruction(task_id, agent),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionSpec {
    #[serde(default)]
    pub tools_required: BTreeSet<String>,
    pub loop_enforcement: u32,
    #[serde(default)]
    pub expected_outputs: Vec<ExpectedOutput>,
    #[serde(default)]
    pub escalate_on_failure: bool,
}

impl InstructionSpec {
    pub fn new(loop_enforcement: u32) -> Self {
        Self {
            tools_required: BTreeSet::new(),
            loop_enforcement,
            expected_outputs: Vec::new(),
            escalate_on_failure: false,
        }
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tools_required.insert(tool.into());
        self
    }

    pub fn with_output(mut self, output: ExpectedOutput) -> Self {
        self.expected_outputs.push(output);
        self
    }

    pub fn to_instruction(&self, task_id: Uuid, agent_id: &str) -> Instruction {
        let mut instruction = Instruction::new(task_id, agent_id, self.loop_enforcement);
        instruction.tools_required = self.tools_required.clone();
        instruction.expected_outputs = self.expected_outputs.clone();
        instruction.escalate_on_failure = self.escalate_on_failure;
        instruction
    }
}

impl GoalPlan {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            tasks: Vec::new(),
        }
    }

    pub fn with_task(mut self, task: TaskSpec) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn from_yaml(yaml: &str) -> DomainResult<Self> {
        serde_yaml::from_str(yaml).map_err(|e| DomainError::Serialization(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> DomainResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DomainError::ValidationFailed(format!("cannot read plan {}: {e}", path.display()))
        })?;
        Self::from_yaml(&raw)
    }

    /// Turn the plan into tasks of `goal_id`, one per spec in plan order,
    /// with `depends_on` keys mapped to the new task IDs.
    ///
    /// Validates the plan first. A task naming itself in `depends_on` is
    /// rejected as a cycle; longer cycles are not checked here.
    pub fn build_tasks(&self, goal_id: Uuid, default_max_retries: u32) -> DomainResult<Vec<Task>> {
        self.validate()?;

        let ids: HashMap<&str, Uuid> = self
            .tasks
            .iter()
            .map(|spec| (spec.key.as_str(), Uuid::new_v4()))
            .collect();

        let mut tasks = Vec::with_capacity(self.tasks.len());
        for spec in &self.tasks {
            let mut task = Task::new(goal_id, &spec.key, &spec.description)
                .with_priority(spec.priority)
                .with_complexity(spec.complexity)
                .with_max_retries(spec.max_retries.unwrap_or(default_max_retries));
            if let Some(&id) = ids.get(spec.key.as_str()) {
                task.id = id;
            }
            if let Some(agent) = &spec.agent {
                task = task.with_agent(agent);
            }
            if let Some(deadline) = spec.deadline {
                task = task.with_deadline(deadline);
            }
            for dependency in &spec.depends_on {
                if *dependency == spec.key {
                    return Err(DomainError::CyclicDependency(vec![task.id, task.id]));
                }
                if let Some(&dep_id) = ids.get(dependency.as_str()) {
                    task = task.with_dependency(dep_id);
                }
            }
            tasks.push(task);
        }
        Ok(tasks)
    }

    /// Check keys are unique and every dependency names a task in the plan.
    pub fn validate(&self) -> DomainResult<()> {
        if self.description.trim().is_empty() {
            return Err(DomainError::ValidationFailed(
                "Goal description cannot be empty".to_string(),
            ));
        }
        let mut keys = BTreeSet::new();
        for task in &self.tasks {
            if task.key.trim().is_empty() {
                return Err(DomainError::ValidationFailed(
                    "Task key cannot be empty".to_string(),
                ));
            }
            if !keys.insert(task.key.as_str()) {
                return Err(DomainError::ValidationFailed(format!(
                    "Duplicate task key: {}",
                    task.key
                )));
            }
        }
        for task in &self.tasks {
            if let Some(missing) = task.depends_on.iter().find(|d| !keys.contains(d.as_str())) {
                return Err(DomainError::UnknownDependency {
                    task: task.key.clone(),
                    dependency: missing.clone(),
                });
            }
        }
        Ok(())
    }
}
