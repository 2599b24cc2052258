//! Static agent registry.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::ports::AgentRegistry;

/// Every agent is available unless marked busy.
#[derive(Debug, Default)]
pub struct StaticAgentRegistry {
    busy: RwLock<HashSet<String>>,
}

impl StaticAgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_busy<I, S>(agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            busy: RwLock::new(agents.into_iter().map(Into::into).collect()),
        }
    }

    pub async fn set_available(&self, agent_id: &str, available: bool) {
        let mut busy = self.busy.write().await;
        if available {
            busy.remove(agent_id);
        } else {
            busy.insert(agent_id.to_string());
        }
    }
}

#[async_trait]
impl AgentRegistry for StaticAgentRegistry {
    async fn is_available(&self, agent_id: &str) -> bool {
        !self.busy.read().await.contains(agent_id)
    }
}
