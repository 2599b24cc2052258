//! Instruction compliance engine.
//!
//! Tracks each instruction through `pending → in_progress → {completed, failed}`,
//! records checkpoints and reflections, and raises escalations from the
//! ordered rule table. The engine only reads task state; the records it
//! writes (checkpoints, reflections, escalations) are its own.

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::escalation_rules::{RuleContext, RuleTable};
use super::event_bus::{EventBus, EventPayload};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Checkpoint, CheckpointStatus, Escalation, EscalationReason, EscalationStatus, Instruction,
    InstructionStatus, OutputKind, Reflection, Review, Task, TaskStatus,
};
use crate::domain::ports::{ComplianceStore, EscalationSink, TaskLedger};

/// Required outputs that are not yet satisfied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnmetOutputs {
    pub checkpoints: Vec<String>,
    pub reflections: Vec<String>,
}

impl UnmetOutputs {
    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty() && self.reflections.is_empty()
    }
}

pub struct ComplianceEngine {
    store: Arc<dyn ComplianceStore>,
    ledger: Arc<dyn TaskLedger>,
    sink: Arc<dyn EscalationSink>,
    events: Arc<EventBus>,
    rules: RuleTable,
}

impl ComplianceEngine {
    pub fn new(
        store: Arc<dyn ComplianceStore>,
        ledger: Arc<dyn TaskLedger>,
        sink: Arc<dyn EscalationSink>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            ledger,
            sink,
            events,
            rules: RuleTable::standard(),
        }
    }

    /// Replace the rule table.
    pub fn with_rules(mut self, rules: RuleTable) -> Self {
        self.rules = rules;
        self
    }

    pub async fn register(&self, instruction: &Instruction) -> DomainResult<()> {
        self.store.insert_instruction(instruction).await?;
        debug!(instruction_id = %instruction.id, task_id = %instruction.task_id, "instruction registered");
        Ok(())
    }

    pub async fn get_instruction(&self, id: Uuid) -> DomainResult<Instruction> {
        self.store.get_instruction(id).await
    }

    pub async fn instruction_for_task(&self, task_id: Uuid) -> DomainResult<Option<Instruction>> {
        self.store.instruction_for_task(task_id).await
    }

    pub async fn unmet_outputs(&self, instruction: &Instruction) -> DomainResult<UnmetOutputs> {
        let checkpoints = self.store.checkpoints_for(instruction.id).await?;
        let reflections = self.store.reflections_for(instruction.id).await?;

        let unapproved = instruction
            .required_tags(OutputKind::Checkpoint)
            .into_iter()
            .filter(|tag| {
                !checkpoints
                    .iter()
                    .any(|c| c.tag == *tag && c.status == CheckpointStatus::Approved)
            })
            .map(str::to_string)
            .collect();
        let missing = instruction
            .required_tags(OutputKind::Reflection)
            .into_iter()
            .filter(|tag| !reflections.iter().any(|r| r.tag == *tag))
            .map(str::to_string)
            .collect();

        Ok(UnmetOutputs {
            checkpoints: unapproved,
            reflections: missing,
        })
    }

    /// Run the rule table against `instruction`.
    ///
    /// Returns the escalation that would be raised without storing it.
    pub async fn should_escalate(
        &self,
        instruction: &Instruction,
        loop_count: u32,
        tool_used: Option<&str>,
    ) -> DomainResult<Option<Escalation>> {
        self.evaluate(instruction, Some(loop_count), tool_used).await
    }

    async fn evaluate(
        &self,
        instruction: &Instruction,
        loop_count: Option<u32>,
        tool_used: Option<&str>,
    ) -> DomainResult<Option<Escalation>> {
        let unmet = self.unmet_outputs(instruction).await?;
        let ctx = RuleContext {
            instruction,
            loop_count,
            tool_used,
            unapproved_checkpoints: unmet.checkpoints,
            missing_reflections: unmet.reflections,
        };

        Ok(self.rules.evaluate(&ctx).map(|hit| {
            debug!(
                instruction_id = %instruction.id,
                rule = hit.rule,
                reason = %hit.reason,
                "escalation rule matched"
            );
            Escalation::new(instruction.id, &instruction.agent_id, hit.reason, hit.details)
        }))
    }

    /// Store, publish and deliver an escalation.
    ///
    /// A pending escalation with the same `(instruction_id, reason)` makes
    /// this a no-op returning `None`. Delivery failure is returned after the
    /// record is stored, so the escalation stays pending and visible.
    async fn raise(&self, escalation: Escalation) -> DomainResult<Option<Escalation>> {
        let Some(stored) = self.store.insert_escalation_if_absent(escalation).await? else {
            debug!("duplicate pending escalation suppressed");
            return Ok(None);
        };

        warn!(
            escalation_id = %stored.id,
            instruction_id = %stored.instruction_id,
            agent_id = %stored.agent_id,
            reason = %stored.reason,
            details = %stored.details,
            "escalation raised"
        );
        self.events.publish(EventPayload::EscalationRaised(stored.clone()));

        if let Err(e) = self.sink.notify(&stored).await {
            error!(escalation_id = %stored.id, sink = self.sink.name(), error = %e, "escalation delivery failed");
            return Err(e);
        }
        Ok(Some(stored))
    }

    /// Evaluate one reasoning-loop iteration or tool invocation.
    pub async fn evaluate_iteration(
        &self,
        instruction_id: Uuid,
        loop_count: u32,
        tool_used: Option<&str>,
    ) -> DomainResult<Option<Escalation>> {
        let instruction = self.store.get_instruction(instruction_id).await?;
        match self.evaluate(&instruction, Some(loop_count), tool_used).await? {
            Some(escalation) => self.raise(escalation).await,
            None => Ok(None),
        }
    }

    /// The governed task entered `in_progress`.
    pub async fn on_task_started(&self, task_id: Uuid) -> DomainResult<()> {
        let Some(mut instruction) = self.store.instruction_for_task(task_id).await? else {
            return Ok(());
        };
        if instruction.status == InstructionStatus::Pending {
            instruction.set_status(InstructionStatus::InProgress);
            self.store.update_instruction(&instruction).await?;
            debug!(instruction_id = %instruction.id, "instruction in progress");
        }
        Ok(())
    }

    /// The governed task completed; complete the instruction if its outputs are in.
    pub async fn on_task_completed(&self, task_id: Uuid) -> DomainResult<()> {
        if let Some(instruction) = self.store.instruction_for_task(task_id).await? {
            self.reconcile(instruction.id).await?;
        }
        Ok(())
    }

    /// The governed task reached `failed` or `killed`.
    pub async fn on_task_failed(&self, task_id: Uuid) -> DomainResult<Option<Escalation>> {
        let Some(mut instruction) = self.store.instruction_for_task(task_id).await? else {
            return Ok(None);
        };
        if instruction.status.is_terminal() {
            return Ok(None);
        }

        instruction.set_status(InstructionStatus::Failed);
        self.store.update_instruction(&instruction).await?;
        info!(instruction_id = %instruction.id, task_id = %task_id, "instruction failed");

        match self.evaluate(&instruction, None, None).await? {
            Some(escalation) => self.raise(escalation).await,
            None => Ok(None),
        }
    }

    /// An operator requeued the failed task; reopen its instruction.
    pub async fn on_task_requeued(&self, task_id: Uuid) -> DomainResult<()> {
        let Some(mut instruction) = self.store.instruction_for_task(task_id).await? else {
            return Ok(());
        };
        if instruction.status == InstructionStatus::Failed {
            instruction.set_status(InstructionStatus::Pending);
            self.store.update_instruction(&instruction).await?;
            info!(instruction_id = %instruction.id, "instruction reopened");
        }
        Ok(())
    }

    fn ensure_open(instruction: &Instruction) -> DomainResult<()> {
        if instruction.status.is_terminal() {
            return Err(DomainError::ValidationFailed(format!(
                "instruction {} is {}",
                instruction.id, instruction.status
            )));
        }
        Ok(())
    }

    pub async fn submit_checkpoint(
        &self,
        instruction_id: Uuid,
        agent_id: &str,
        tag: &str,
        content: serde_json::Value,
    ) -> DomainResult<Checkpoint> {
        let instruction = self.store.get_instruction(instruction_id).await?;
        Self::ensure_open(&instruction)?;

        let checkpoint = Checkpoint::new(instruction_id, agent_id, tag, content);
        self.store.insert_checkpoint(&checkpoint).await?;
        info!(checkpoint_id = %checkpoint.id, instruction_id = %instruction_id, tag, "checkpoint submitted");
        Ok(checkpoint)
    }

    /// Record an external review. Only pending checkpoints can be reviewed.
    pub async fn approve_checkpoint(
        &self,
        checkpoint_id: Uuid,
        review: Review,
    ) -> DomainResult<Checkpoint> {
        let mut checkpoint = self.store.get_checkpoint(checkpoint_id).await?;
        if checkpoint.status != CheckpointStatus::Pending {
            return Err(DomainError::ValidationFailed(format!(
                "checkpoint {checkpoint_id} already reviewed"
            )));
        }

        checkpoint.status = review.into();
        self.store.update_checkpoint(&checkpoint).await?;
        info!(checkpoint_id = %checkpoint_id, tag = %checkpoint.tag, review = ?review, "checkpoint reviewed");

        self.reconcile(checkpoint.instruction_id).await?;
        Ok(checkpoint)
    }

    pub async fn submit_reflection(
        &self,
        instruction_id: Uuid,
        agent_id: &str,
        tag: &str,
        content: serde_json::Value,
    ) -> DomainResult<Reflection> {
        let instruction = self.store.get_instruction(instruction_id).await?;
        Self::ensure_open(&instruction)?;

        let reflection = Reflection::new(instruction_id, agent_id, tag, content);
        self.store.insert_reflection(&reflection).await?;
        info!(reflection_id = %reflection.id, instruction_id = %instruction_id, tag, "reflection submitted");

        self.reconcile(instruction_id).await?;
        Ok(reflection)
    }

    /// Complete an in-progress instruction whose task is completed and whose
    /// required outputs are all satisfied.
    pub async fn reconcile(&self, instruction_id: Uuid) -> DomainResult<Instruction> {
        let mut instruction = self.store.get_instruction(instruction_id).await?;
        if instruction.status != InstructionStatus::InProgress {
            return Ok(instruction);
        }

        let task = self.ledger.get(instruction.task_id).await?;
        if task.status != TaskStatus::Completed {
            return Ok(instruction);
        }

        let unmet = self.unmet_outputs(&instruction).await?;
        if unmet.is_empty() {
            instruction.set_status(InstructionStatus::Completed);
            self.store.update_instruction(&instruction).await?;
            info!(instruction_id = %instruction.id, "instruction completed");
        } else {
            debug!(
                instruction_id = %instruction.id,
                checkpoints = ?unmet.checkpoints,
                reflections = ?unmet.reflections,
                "instruction awaiting outputs"
            );
        }
        Ok(instruction)
    }

    /// Raise a `stalled` escalation for a task that has not changed status
    /// within the stall threshold. The task itself is left alone.
    pub async fn flag_stalled(&self, task: &Task) -> DomainResult<Option<Escalation>> {
        let Some(instruction) = self.store.instruction_for_task(task.id).await? else {
            warn!(task_id = %task.id, "stalled task has no instruction");
            return Ok(None);
        };
        let details = format!(
            "task {} has been {} since {}",
            task.id,
            task.status,
            task.updated_at.to_rfc3339()
        );
        let escalation = Escalation::new(
            instruction.id,
            &instruction.agent_id,
            EscalationReason::Stalled,
            details,
        );
        self.raise(escalation).await
    }

    /// Mark an escalation resolved. The governed task is not touched;
    /// re-dispatch is a separate operator decision.
    pub async fn resolve_escalation(&self, escalation_id: Uuid) -> DomainResult<Escalation> {
        let mut escalation = self.store.get_escalation(escalation_id).await?;
        if !escalation.is_pending() {
            return Ok(escalation);
        }

        escalation.resolve();
        self.store.update_escalation(&escalation).await?;
        info!(escalation_id = %escalation_id, reason = %escalation.reason, "escalation resolved");
        self.events
            .publish(EventPayload::EscalationResolved(escalation.clone()));
        Ok(escalation)
    }

    pub async fn list_escalations(
        &self,
        status: Option<EscalationStatus>,
    ) -> DomainResult<Vec<Escalation>> {
        self.store.list_escalations(status).await
    }

    pub async fn checkpoints_for(&self, instruction_id: Uuid) -> DomainResult<Vec<Checkpoint>> {
        self.store.checkpoints_for(instruction_id).await
    }

    pub async fn reflections_for(&self, instruction_id: Uuid) -> DomainResult<Vec<Reflection>> {
        self.store.reflections_for(instruction_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryComplianceStore, InMemoryTaskLedger};
    use crate::adapters::sinks::ChannelEscalationSink;
    use crate::domain::models::{ExpectedOutput, TaskTransition};
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::mpsc;

    struct Fixture {
        engine: ComplianceEngine,
        ledger: Arc<InMemoryTaskLedger>,
        rx: mpsc::UnboundedReceiver<Escalation>,
    }

    fn setup() -> Fixture {
        let (sink, rx) = ChannelEscalationSink::pair();
        let ledger = Arc::new(InMemoryTaskLedger::new());
        let engine = ComplianceEngine::new(
            Arc::new(InMemoryComplianceStore::new()),
            ledger.clone(),
            Arc::new(sink),
            Arc::new(EventBus::default()),
        );
        Fixture { engine, ledger, rx }
    }

    async fn running_task(ledger: &InMemoryTaskLedger) -> Task {
        let task = ledger.create(Task::new(Uuid::new_v4(), "t", "d")).await.unwrap();
        ledger
            .update(task.id, &TaskTransition::from_observed(&task, TaskStatus::InProgress))
            .await
            .unwrap()
    }

    async fn register_running(fx: &Fixture, instruction: Instruction) -> Instruction {
        fx.engine.register(&instruction).await.unwrap();
        fx.engine.on_task_started(instruction.task_id).await.unwrap();
        fx.engine.get_instruction(instruction.id).await.unwrap()
    }

    #[tokio::test]
    async fn test_loop_exceeded_beats_approved_checkpoints() {
        let fx = setup();
        let task = running_task(&fx.ledger).await;
        let instruction = register_running(
            &fx,
            Instruction::new(task.id, "planner", 3)
                .with_output(ExpectedOutput::checkpoint("design_review")),
        )
        .await;

        let cp = fx
            .engine
            .submit_checkpoint(instruction.id, "planner", "design_review", json!({}))
            .await
            .unwrap();
        fx.engine.approve_checkpoint(cp.id, Review::Approved).await.unwrap();

        let escalation = fx
            .engine
            .should_escalate(&instruction, 5, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(escalation.reason, EscalationReason::LoopExceeded);
    }

    #[tokio::test]
    async fn test_missing_checkpoint_names_tag() {
        let fx = setup();
        let task = running_task(&fx.ledger).await;
        let instruction = register_running(
            &fx,
            Instruction::new(task.id, "planner", 10)
                .with_output(ExpectedOutput::checkpoint("design_review")),
        )
        .await;

        let escalation = fx
            .engine
            .should_escalate(&instruction, 1, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(escalation.reason, EscalationReason::ValidationFailed);
        assert!(escalation.details.contains("design_review"));
    }

    #[tokio::test]
    async fn test_should_escalate_does_not_store() {
        let fx = setup();
        let task = running_task(&fx.ledger).await;
        let instruction = register_running(&fx, Instruction::new(task.id, "a", 1)).await;

        fx.engine.should_escalate(&instruction, 2, None).await.unwrap();
        assert!(fx.engine.list_escalations(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_escalation_idempotent_per_pending_reason() {
        let mut fx = setup();
        let task = running_task(&fx.ledger).await;
        let instruction = register_running(&fx, Instruction::new(task.id, "a", 1)).await;

        let first = fx.engine.evaluate_iteration(instruction.id, 2, None).await.unwrap();
        let second = fx.engine.evaluate_iteration(instruction.id, 3, None).await.unwrap();
        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(fx.engine.list_escalations(None).await.unwrap().len(), 1);
        assert!(fx.rx.try_recv().is_ok());
        assert!(fx.rx.try_recv().is_err());

        // A different reason is a separate escalation
        let tool = fx
            .engine
            .evaluate_iteration(instruction.id, 1, Some("shell"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tool.reason, EscalationReason::ToolViolation);

        // Resolving frees the pair
        fx.engine.resolve_escalation(first.unwrap().id).await.unwrap();
        let again = fx.engine.evaluate_iteration(instruction.id, 4, None).await.unwrap();
        assert!(again.is_some());
    }

    #[tokio::test]
    async fn test_instruction_completes_after_outputs() {
        let fx = setup();
        let task = running_task(&fx.ledger).await;
        let instruction = register_running(
            &fx,
            Instruction::new(task.id, "a", 5)
                .with_output(ExpectedOutput::checkpoint("plan"))
                .with_output(ExpectedOutput::reflection("retro")),
        )
        .await;
        assert_eq!(instruction.status, InstructionStatus::InProgress);

        let done = TaskTransition::from_observed(&task, TaskStatus::Completed).with_result(json!(1));
        fx.ledger.update(task.id, &done).await.unwrap();
        fx.engine.on_task_completed(task.id).await.unwrap();
        let current = fx.engine.get_instruction(instruction.id).await.unwrap();
        assert_eq!(current.status, InstructionStatus::InProgress);

        let cp = fx
            .engine
            .submit_checkpoint(instruction.id, "a", "plan", json!("v1"))
            .await
            .unwrap();
        fx.engine.approve_checkpoint(cp.id, Review::Approved).await.unwrap();
        assert_eq!(
            fx.engine.get_instruction(instruction.id).await.unwrap().status,
            InstructionStatus::InProgress
        );

        fx.engine
            .submit_reflection(instruction.id, "a", "retro", json!("ok"))
            .await
            .unwrap();
        assert_eq!(
            fx.engine.get_instruction(instruction.id).await.unwrap().status,
            InstructionStatus::Completed
        );

        let late = fx
            .engine
            .submit_reflection(instruction.id, "a", "extra", json!(null))
            .await;
        assert!(matches!(late, Err(DomainError::ValidationFailed(_))));
    }

    #[tokio::test]
    async fn test_rejected_checkpoint_cannot_be_rereviewed() {
        let fx = setup();
        let task = running_task(&fx.ledger).await;
        let instruction = register_running(&fx, Instruction::new(task.id, "a", 5)).await;

        let cp = fx
            .engine
            .submit_checkpoint(instruction.id, "a", "plan", json!({}))
            .await
            .unwrap();
        let reviewed = fx.engine.approve_checkpoint(cp.id, Review::Rejected).await.unwrap();
        assert_eq!(reviewed.status, CheckpointStatus::Rejected);

        let again = fx.engine.approve_checkpoint(cp.id, Review::Approved).await;
        assert!(matches!(again, Err(DomainError::ValidationFailed(_))));
    }

    #[tokio::test]
    async fn test_failure_escalates_only_when_flagged() {
        let fx = setup();
        let quiet = running_task(&fx.ledger).await;
        let loud = running_task(&fx.ledger).await;
        register_running(&fx, Instruction::new(quiet.id, "a", 5)).await;
        let flagged =
            register_running(&fx, Instruction::new(loud.id, "a", 5).escalating_on_failure()).await;

        assert!(fx.engine.on_task_failed(quiet.id).await.unwrap().is_none());
        let escalation = fx.engine.on_task_failed(loud.id).await.unwrap().unwrap();
        assert_eq!(escalation.reason, EscalationReason::ValidationFailed);
        assert_eq!(escalation.instruction_id, flagged.id);

        fx.engine.on_task_requeued(loud.id).await.unwrap();
        assert_eq!(
            fx.engine.get_instruction(flagged.id).await.unwrap().status,
            InstructionStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_stalled_task_is_flagged() {
        let fx = setup();
        let task = running_task(&fx.ledger).await;
        register_running(&fx, Instruction::new(task.id, "a", 5)).await;

        let escalation = fx.engine.flag_stalled(&task).await.unwrap().unwrap();
        assert_eq!(escalation.reason, EscalationReason::Stalled);
        assert!(fx.engine.flag_stalled(&task).await.unwrap().is_none());
        assert_eq!(fx.ledger.get(task.id).await.unwrap().status, TaskStatus::InProgress);
    }

    struct FailingSink;

    #[async_trait]
    impl EscalationSink for FailingSink {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn notify(&self, _escalation: &Escalation) -> DomainResult<()> {
            Err(DomainError::EscalationDelivery("unreachable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_delivery_failure_is_reported_and_recorded() {
        let ledger = Arc::new(InMemoryTaskLedger::new());
        let engine = ComplianceEngine::new(
            Arc::new(InMemoryComplianceStore::new()),
            ledger.clone(),
            Arc::new(FailingSink),
            Arc::new(EventBus::default()),
        );
        let task = running_task(&ledger).await;
        let instruction = Instruction::new(task.id, "a", 1);
        engine.register(&instruction).await.unwrap();

        let result = engine.evaluate_iteration(instruction.id, 9, None).await;
        assert!(matches!(result, Err(DomainError::EscalationDelivery(_))));

        let pending = engine
            .list_escalations(Some(EscalationStatus::Pending))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
    }
}
