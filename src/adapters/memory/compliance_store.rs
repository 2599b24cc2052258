use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Checkpoint, Escalation, EscalationStatus, Instruction, Reflection};
use crate::domain::ports::ComplianceStore;

#[derive(Default)]
struct ComplianceState {
    instructions: HashMap<Uuid, Instruction>,
    by_task: HashMap<Uuid, Uuid>,
    checkpoints: Vec<Checkpoint>,
    reflections: Vec<Reflection>,
    escalations: Vec<Escalation>,
}

/// In-memory ComplianceStore. One lock covers every record so the
/// duplicate-escalation check and insert are atomic.
#[derive(Default)]
pub struct InMemoryComplianceStore {
    state: RwLock<ComplianceState>,
}

impl InMemoryComplianceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ComplianceStore for InMemoryComplianceStore {
    async fn insert_instruction(&self, instruction: &Instruction) -> DomainResult<()> {
        let mut state = self.state.write().await;
        if state.by_task.contains_key(&instruction.task_id) {
            return Err(DomainError::ValidationFailed(format!(
                "task {} already has an instruction",
                instruction.task_id
            )));
        }
        state.by_task.insert(instruction.task_id, instruction.id);
        state.instructions.insert(instruction.id, instruction.clone());
        Ok(())
    }

    async fn get_instruction(&self, id: Uuid) -> DomainResult<Instruction> {
        self.state
            .read()
            .await
            .instructions
            .get(&id)
            .cloned()
            .ok_or(DomainError::InstructionNotFound(id))
    }

    async fn instruction_for_task(&self, task_id: Uuid) -> DomainResult<Option<Instruction>> {
        let state = self.state.read().await;
        Ok(state
            .by_task
            .get(&task_id)
            .and_then(|id| state.instructions.get(id))
            .cloned())
    }

    async fn update_instruction(&self, instruction: &Instruction) -> DomainResult<()> {
        let mut state = self.state.write().await;
        let stored = state
            .instructions
            .get_mut(&instruction.id)
            .ok_or(DomainError::InstructionNotFound(instruction.id))?;
        *stored = instruction.clone();
        Ok(())
    }

    async fn insert_checkpoint(&self, checkpoint: &Checkpoint) -> DomainResult<()> {
        self.state.write().await.checkpoints.push(checkpoint.clone());
        Ok(())
    }

    async fn get_checkpoint(&self, id: Uuid) -> DomainResult<Checkpoint> {
        self.state
            .read()
            .await
            .checkpoints
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or(DomainError::CheckpointNotFound(id))
    }

    async fn update_checkpoint(&self, checkpoint: &Checkpoint) -> DomainResult<()> {
        let mut state = self.state.write().await;
        let stored = state
            .checkpoints
            .iter_mut()
            .find(|c| c.id == checkpoint.id)
            .ok_or(DomainError::CheckpointNotFound(checkpoint.id))?;
        *stored = checkpoint.clone();
        Ok(())
    }

    async fn checkpoints_for(&self, instruction_id: Uuid) -> DomainResult<Vec<Checkpoint>> {
        Ok(self
            .state
            .read()
            .await
            .checkpoints
            .iter()
            .filter(|c| c.instruction_id == instruction_id)
            .cloned()
            .collect())
    }

    async fn insert_reflection(&self, reflection: &Reflection) -> DomainResult<()> {
        self.state.write().await.reflections.push(reflection.clone());
        Ok(())
    }

    async fn reflections_for(&self, instruction_id: Uuid) -> DomainResult<Vec<Reflection>> {
        Ok(self
            .state
            .read()
            .await
            .reflections
            .iter()
            .filter(|r| r.instruction_id == instruction_id)
            .cloned()
            .collect())
    }

    async fn insert_escalation_if_absent(
        &self,
        escalation: Escalation,
    ) -> DomainResult<Option<Escalation>> {
        let mut state = self.state.write().await;
        let duplicate = state.escalations.iter().any(|e| {
            e.is_pending()
                && e.instruction_id == escalation.instruction_id
                && e.reason == escalation.reason
        });
        if duplicate {
            return Ok(None);
        }
        state.escalations.push(escalation.clone());
        Ok(Some(escalation))
    }

    async fn get_escalation(&self, id: Uuid) -> DomainResult<Escalation> {
        self.state
            .read()
            .await
            .escalations
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or(DomainError::EscalationNotFound(id))
    }

    async fn update_escalation(&self, escalation: &Escalation) -> DomainResult<()> {
        let mut state = self.state.write().await;
        let stored = state
            .escalations
            .iter_mut()
            .find(|e| e.id == escalation.id)
            .ok_or(DomainError::EscalationNotFound(escalation.id))?;
        *stored = escalation.clone();
        Ok(())
    }

    async fn list_escalations(
        &self,
        status: Option<EscalationStatus>,
    ) -> DomainResult<Vec<Escalation>> {
        Ok(self
            .state
            .read()
            .await
            .escalations
            .iter()
            .filter(|e| status.map_or(true, |s| e.status == s))
            .cloned()
            .collect())
    }
}
