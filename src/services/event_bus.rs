//! EventBus service for outbound notifications.
//!
//! A broadcast channel with sequence numbering. Subscribers (UI, logging,
//! operators) attach independently; publishing never blocks and never fails
//! when nobody is listening.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::domain::models::{Escalation, Goal, Task};

/// Monotonically increasing sequence number assigned by EventBus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(pub u64);

impl std::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    TaskStatusChanged(Task),
    GoalStatusChanged(Goal),
    EscalationRaised(Escalation),
    EscalationResolved(Escalation),
}

impl EventPayload {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TaskStatusChanged(_) => "task_status_changed",
            Self::GoalStatusChanged(_) => "goal_status_changed",
            Self::EscalationRaised(_) => "escalation_raised",
            Self::EscalationResolved(_) => "escalation_resolved",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub sequence: SequenceNumber,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

/// Configuration for the EventBus.
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    pub channel_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    sequence: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventBusConfig::default())
    }
}

impl EventBus {
    pub fn new(config: EventBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            sender,
            sequence: AtomicU64::new(0),
        }
    }

    /// Publish a payload and return its sequence number.
    pub fn publish(&self, payload: EventPayload) -> SequenceNumber {
        let sequence = SequenceNumber(self.sequence.fetch_add(1, Ordering::SeqCst));
        tracing::trace!(sequence = %sequence, kind = payload.kind(), "publishing event");
        let event = Event {
            sequence,
            timestamp: Utc::now(),
            payload,
        };
        // No subscribers is not an error
        let _ = self.sender.send(event);
        sequence
    }

    pub fn task_changed(&self, task: &Task) {
        self.publish(EventPayload::TaskStatusChanged(task.clone()));
    }

    pub fn goal_changed(&self, goal: &Goal) {
        self.publish(EventPayload::GoalStatusChanged(goal.clone()));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Sequence number the next event will get.
    pub fn current_sequence(&self) -> SequenceNumber {
        SequenceNumber(self.sequence.load(Ordering::SeqCst))
    }
}
