//! Instruction domain model.
//!
//! An instruction is the compliance contract governing one task's execution:
//! which tools the agent may use, how many reasoning-loop iterations it may
//! spend, and which checkpoints/reflections it must produce.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl Default for InstructionStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl InstructionStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for InstructionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of output an instruction expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    Checkpoint,
    Reflection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedOutput {
    #[serde(rename = "type")]
    pub kind: OutputKind,
    pub tag: String,
    #[serde(default = "default_required")]
    pub required: bool,
}

const fn default_required() -> bool {
    true
}

impl ExpectedOutput {
    pub fn checkpoint(tag: impl Into<String>) -> Self {
        Self {
            kind: OutputKind::Checkpoint,
            tag: tag.into(),
            required: true,
        }
    }

    pub fn reflection(tag: impl Into<String>) -> Self {
        Self {
            kind: OutputKind::Reflection,
            tag: tag.into(),
            required: true,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub id: Uuid,
    /// The governed task
    pub task_id: Uuid,
    pub agent_id: String,
    /// Permitted tool identifiers
    pub tools_required: BTreeSet<String>,
    /// Maximum permitted reasoning-loop iterations
    pub loop_enforcement: u32,
    pub expected_outputs: Vec<ExpectedOutput>,
    pub status: InstructionStatus,
    pub escalate_on_failure: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Instruction {
    pub fn new(task_id: Uuid, agent_id: impl Into<String>, loop_enforcement: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            task_id,
            agent_id: agent_id.into(),
            tools_required: BTreeSet::new(),
            loop_enforcement,
            expected_outputs: Vec::new(),
            status: InstructionStatus::default(),
            escalate_on_failure: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Instruction for a task planned without governance: no loop limit,
    /// no tools and no expected outputs.
    pub fn unrestricted(task_id: Uuid, agent_id: impl Into<String>) -> Self {
        Self::new(task_id, agent_id, u32::MAX)
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tools_required.insert(tool.into());
        self
    }

    pub fn with_output(mut self, output: ExpectedOutput) -> Self {
        self.expected_outputs.push(output);
        self
    }

    pub fn escalating_on_failure(mut self) -> Self {
        self.escalate_on_failure = true;
        self
    }

    pub fn permits_tool(&self, tool: &str) -> bool {
        self.tools_required.contains(tool)
    }

    /// Tags of required outputs of the given kind, in declaration order.
    pub fn required_tags(&self, kind: OutputKind) -> Vec<&str> {
        self.expected_outputs
            .iter()
            .filter(|o| o.required && o.kind == kind)
            .map(|o| o.tag.as_str())
            .collect()
    }

    pub fn set_status(&mut self, status: InstructionStatus) {
        self.status = status;
        self.updated_at = Utc::now().max(self.updated_at);
    }
}
