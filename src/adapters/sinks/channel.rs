//! Queue sink for an in-process operator.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::Escalation;
use crate::domain::ports::EscalationSink;

#[derive(Debug, Clone)]
pub struct ChannelEscalationSink {
    sender: mpsc::UnboundedSender<Escalation>,
}

impl ChannelEscalationSink {
    /// Create the sink and the receiving end of its queue.
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<Escalation>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl EscalationSink for ChannelEscalationSink {
    fn name(&self) -> &'static str {
        "channel"
    }

    async fn notify(&self, escalation: &Escalation) -> DomainResult<()> {
        self.sender
            .send(escalation.clone())
            .map_err(|_| DomainError::EscalationDelivery("operator queue closed".to_string()))
    }
}
