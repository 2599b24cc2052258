//! Escalation sink port - delivery to an operator or higher-tier agent.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::Escalation;

/// Delivers escalations. No policy lives here.
///
/// A failed delivery is returned as `EscalationDelivery`, never swallowed.
/// Adapters may retry internally; that budget is separate from task retries.
#[async_trait]
pub trait EscalationSink: Send + Sync {
    /// Sink name for logs.
    fn name(&self) -> &'static str;

    async fn notify(&self, escalation: &Escalation) -> DomainResult<()>;
}
