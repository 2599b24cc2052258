use async_trait::async_trait;
use tracing::warn;

use crate::domain::errors::DomainResult;
use crate::domain::models::Escalation;
use crate::domain::ports::EscalationSink;

/// Writes escalations to the log. Used when no operator endpoint is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEscalationSink;

#[async_trait]
impl EscalationSink for TracingEscalationSink {
    fn name(&self) -> &'static str {
        "tracing"
    }

    async fn notify(&self, escalation: &Escalation) -> DomainResult<()> {
        warn!(
            target: "taskwarden::escalation",
            escalation_id = %escalation.id,
            instruction_id = %escalation.instruction_id,
            agent_id = %escalation.agent_id,
            reason = %escalation.reason,
            details = %escalation.details,
            "operator attention required"
        );
        Ok(())
    }
}
