//! Escalation sinks.

pub mod channel;
pub mod tracing_sink;
pub mod webhook;

use std::sync::Arc;

pub use channel::ChannelEscalationSink;
pub use tracing_sink::TracingEscalationSink;
pub use webhook::WebhookEscalationSink;

use crate::domain::models::EscalationConfig;
use crate::domain::ports::EscalationSink;

/// The webhook sink when a URL is configured, the tracing sink otherwise.
pub fn from_config(config: &EscalationConfig) -> Arc<dyn EscalationSink> {
    match &config.webhook_url {
        Some(url) => Arc::new(WebhookEscalationSink::new(url.clone(), config)),
        None => Arc::new(TracingEscalationSink),
    }
}
