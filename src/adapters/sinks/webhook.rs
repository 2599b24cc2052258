//! Webhook escalation sink.
//!
//! POSTs each escalation as JSON. Transient failures (network errors, 429,
//! 5xx) are retried with exponential backoff up to `max_delivery_attempts`;
//! this budget is unrelated to task retries. Anything else fails at once.

use std::time::Duration;

use async_trait::async_trait;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Escalation, EscalationConfig};
use crate::domain::ports::EscalationSink;

pub struct WebhookEscalationSink {
    client: Client,
    url: String,
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl WebhookEscalationSink {
    pub fn new(url: impl Into<String>, config: &EscalationConfig) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            max_attempts: config.max_delivery_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_backoff)
            .with_max_interval(self.max_backoff)
            .with_max_elapsed_time(None)
            .build()
    }
}

fn classify(attempt: u32, max_attempts: u32, message: String, transient: bool) -> backoff::Error<String> {
    if transient && attempt < max_attempts {
        warn!(attempt, max_attempts, error = %message, "escalation delivery failed, retrying");
        backoff::Error::transient(message)
    } else {
        backoff::Error::permanent(message)
    }
}

#[async_trait]
impl EscalationSink for WebhookEscalationSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn notify(&self, escalation: &Escalation) -> DomainResult<()> {
        let max_attempts = self.max_attempts;
        let mut attempt = 0;

        backoff::future::retry(self.backoff(), || {
            attempt += 1;
            let current = attempt;
            let request = self.client.post(&self.url).json(escalation);
            async move {
                let response = request
                    .send()
                    .await
                    .map_err(|e| classify(current, max_attempts, e.to_string(), true))?;

                let status = response.status();
                if status.is_success() {
                    debug!(attempt = current, "escalation delivered");
                    return Ok(());
                }
                let transient =
                    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS;
                Err(classify(
                    current,
                    max_attempts,
                    format!("webhook returned {status}"),
                    transient,
                ))
            }
        })
        .await
        .map_err(DomainError::EscalationDelivery)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::EscalationReason;
    use mockito::{Matcher, Server};
    use uuid::Uuid;

    fn fast_config(attempts: u32) -> EscalationConfig {
        EscalationConfig {
            webhook_url: None,
            max_delivery_attempts: attempts,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
        }
    }

    fn escalation() -> Escalation {
        Escalation::new(
            Uuid::new_v4(),
            "planner",
            EscalationReason::LoopExceeded,
            "loop count 5 exceeds limit 3",
        )
    }

    #[tokio::test]
    async fn test_delivers_json_payload() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/escalations")
            .match_header("content-type", "application/json")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "reason": "loop_exceeded",
                "agent_id": "planner",
                "status": "pending"
            })))
            .with_status(204)
            .expect(1)
            .create_async()
            .await;

        let sink = WebhookEscalationSink::new(format!("{}/escalations", server.url()), &fast_config(3));
        sink.notify(&escalation()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_errors_retry_until_budget() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/escalations")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let sink = WebhookEscalationSink::new(format!("{}/escalations", server.url()), &fast_config(3));
        let err = sink.notify(&escalation()).await.unwrap_err();
        assert!(matches!(err, DomainError::EscalationDelivery(ref msg) if msg.contains("503")));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/escalations")
            .with_status(400)
            .expect(1)
            .create_async()
            .await;

        let sink = WebhookEscalationSink::new(format!("{}/escalations", server.url()), &fast_config(5));
        assert!(sink.notify(&escalation()).await.is_err());
        mock.assert_async().await;
    }
}
