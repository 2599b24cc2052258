//! Compliance store port.
//!
//! Holds instructions and the checkpoint/reflection/escalation records the
//! compliance engine owns. Nothing outside the engine writes through it.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Checkpoint, Escalation, EscalationStatus, Instruction, Reflection};

#[async_trait]
pub trait ComplianceStore: Send + Sync {
    async fn insert_instruction(&self, instruction: &Instruction) -> DomainResult<()>;

    /// `InstructionNotFound` when absent.
    async fn get_instruction(&self, id: Uuid) -> DomainResult<Instruction>;

    /// The instruction governing `task_id`, if any.
    async fn instruction_for_task(&self, task_id: Uuid) -> DomainResult<Option<Instruction>>;

    async fn update_instruction(&self, instruction: &Instruction) -> DomainResult<()>;

    async fn insert_checkpoint(&self, checkpoint: &Checkpoint) -> DomainResult<()>;

    /// `CheckpointNotFound` when absent.
    async fn get_checkpoint(&self, id: Uuid) -> DomainResult<Checkpoint>;

    async fn update_checkpoint(&self, checkpoint: &Checkpoint) -> DomainResult<()>;

    async fn checkpoints_for(&self, instruction_id: Uuid) -> DomainResult<Vec<Checkpoint>>;

    /// Reflections are write-once; there is no update.
    async fn insert_reflection(&self, reflection: &Reflection) -> DomainResult<()>;

    async fn reflections_for(&self, instruction_id: Uuid) -> DomainResult<Vec<Reflection>>;

    /// Store `escalation` unless a pending one with the same
    /// `(instruction_id, reason)` exists. Check and insert are atomic.
    ///
    /// Returns the stored escalation, or `None` when it was a duplicate.
    async fn insert_escalation_if_absent(
        &self,
        escalation: Escalation,
    ) -> DomainResult<Option<Escalation>>;

    /// `EscalationNotFound` when absent.
    async fn get_escalation(&self, id: Uuid) -> DomainResult<Escalation>;

    async fn update_escalation(&self, escalation: &Escalation) -> DomainResult<()>;

    /// Escalations in creation order, optionally filtered by status.
    async fn list_escalations(
        &self,
        status: Option<EscalationStatus>,
    ) -> DomainResult<Vec<Escalation>>;
}
