//! Agent registry port.
//!
//! Injected into the scheduler at construction; there is no process-wide
//! agent map.

use async_trait::async_trait;

#[async_trait]
pub trait AgentRegistry: Send + Sync {
    /// Whether `agent_id` can take work right now.
    async fn is_available(&self, agent_id: &str) -> bool;
}
