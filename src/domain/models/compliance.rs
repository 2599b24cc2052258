//! Compliance records: checkpoints, reflections and escalations.
//!
//! All three are owned by the instruction that created them and are only
//! ever written by the compliance engine.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    Pending,
    Approved,
    Rejected,
}

impl Default for CheckpointStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// Verdict an external reviewer gives a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Review {
    Approved,
    Rejected,
}

impl From<Review> for CheckpointStatus {
    fn from(review: Review) -> Self {
        match review {
            Review::Approved => Self::Approved,
            Review::Rejected => Self::Rejected,
        }
    }
}

/// An agent output that requires external approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: Uuid,
    pub tag: String,
    pub content: serde_json::Value,
    pub agent_id: String,
    pub instruction_id: Uuid,
    pub status: CheckpointStatus,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(
        instruction_id: Uuid,
        agent_id: impl Into<String>,
        tag: impl Into<String>,
        content: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tag: tag.into(),
            content,
            agent_id: agent_id.into(),
            instruction_id,
            status: CheckpointStatus::default(),
            created_at: Utc::now(),
        }
    }
}

/// A write-once self report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reflection {
    pub id: Uuid,
    pub tag: String,
    pub content: serde_json::Value,
    pub agent_id: String,
    pub instruction_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Reflection {
    pub fn new(
        instruction_id: Uuid,
        agent_id: impl Into<String>,
        tag: impl Into<String>,
        content: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tag: tag.into(),
            content,
            agent_id: agent_id.into(),
            instruction_id,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    ValidationFailed,
    LoopExceeded,
    MissingOutputs,
    ToolViolation,
    /// No status change for longer than the stall threshold
    Stalled,
}

impl EscalationReason {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationFailed => "validation_failed",
            Self::LoopExceeded => "loop_exceeded",
            Self::MissingOutputs => "missing_outputs",
            Self::ToolViolation => "tool_violation",
            Self::Stalled => "stalled",
        }
    }
}

impl fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationStatus {
    Pending,
    Resolved,
}

/// A policy violation that needs external intervention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escalation {
    pub id: Uuid,
    pub instruction_id: Uuid,
    pub agent_id: String,
    pub reason: EscalationReason,
    pub details: String,
    pub status: EscalationStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Escalation {
    pub fn new(
        instruction_id: Uuid,
        agent_id: impl Into<String>,
        reason: EscalationReason,
        details: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            instruction_id,
            agent_id: agent_id.into(),
            reason,
            details: details.into(),
            status: EscalationStatus::Pending,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == EscalationStatus::Pending
    }

    pub fn resolve(&mut self) {
        self.status = EscalationStatus::Resolved;
        self.resolved_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_maps_to_checkpoint_status() {
        assert_eq!(CheckpointStatus::from(Review::Approved), CheckpointStatus::Approved);
        assert_eq!(CheckpointStatus::from(Review::Rejected), CheckpointStatus::Rejected);
    }

    #[test]
    fn test_escalation_resolve() {
        let mut escalation = Escalation::new(
            Uuid::new_v4(),
            "coder",
            EscalationReason::LoopExceeded,
            "loop 5 > 3",
        );
        assert!(escalation.is_pending());
        escalation.resolve();
        assert!(!escalation.is_pending());
        assert!(escalation.resolved_at.is_some());
    }

    #[test]
    fn test_reason_serializes_snake_case() {
        let json = serde_json::to_string(&EscalationReason::ToolViolation).unwrap();
        assert_eq!(json, "\"tool_violation\"");
    }
}
