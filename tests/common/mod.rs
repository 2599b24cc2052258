//! Common test utilities for integration tests
//!
//! Shared fixtures and executors used across the integration test files.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

use taskwarden::adapters::agents::StaticAgentRegistry;
use taskwarden::adapters::memory::{
    InMemoryComplianceStore, InMemoryGoalRepository, InMemoryTaskLedger,
};
use taskwarden::adapters::sinks::{ChannelEscalationSink, TracingEscalationSink};
use taskwarden::domain::models::{Config, Escalation, Task};
use taskwarden::domain::ports::{ExecutionContext, TaskExecutor};
use taskwarden::Coordinator;

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
/// Call this at the beginning of tests that need logging.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn test_config(max_workers: usize) -> Config {
    let mut config = Config::default();
    config.scheduler.max_workers = max_workers;
    config
}

/// Fails each task title the configured number of times, then succeeds.
/// Records every attempt.
#[derive(Default)]
pub struct ScriptedExecutor {
    failures: Mutex<HashMap<String, u32>>,
    runs: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(self, title: &str, times: u32) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(title.to_string(), times);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn runs(&self) -> Vec<String> {
        self.runs.lock().unwrap().clone()
    }

    pub fn runs_of(&self, title: &str) -> usize {
        self.runs().iter().filter(|t| *t == title).count()
    }
}

#[async_trait]
impl TaskExecutor for ScriptedExecutor {
    async fn execute(&self, task: &Task, ctx: &ExecutionContext) -> Result<Value, String> {
        self.runs.lock().unwrap().push(task.title.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if ctx.is_killed().await {
            return Err("killed".to_string());
        }
        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(&task.title) {
            Some(left) if *left > 0 => {
                *left -= 1;
                Err(format!("{} failed on attempt {}", task.title, ctx.attempt))
            }
            _ => Ok(json!({ "done": task.title })),
        }
    }
}

/// In-memory coordinator logging escalations only.
pub fn coordinator(executor: Arc<dyn TaskExecutor>, config: &Config) -> Coordinator {
    Coordinator::in_memory(
        executor,
        Arc::new(StaticAgentRegistry::new()),
        Arc::new(TracingEscalationSink),
        config,
    )
}

/// In-memory coordinator whose escalations the test can receive.
pub fn observed_coordinator(
    executor: Arc<dyn TaskExecutor>,
    config: &Config,
) -> (Coordinator, UnboundedReceiver<Escalation>) {
    let (sink, rx) = ChannelEscalationSink::pair();
    let coordinator = Coordinator::in_memory(
        executor,
        Arc::new(StaticAgentRegistry::new()),
        Arc::new(sink),
        config,
    );
    (coordinator, rx)
}

/// Coordinator over caller-owned storage, so several coordinators can
/// dispatch the same goal.
pub fn shared_coordinator(
    executor: Arc<dyn TaskExecutor>,
    ledger: Arc<InMemoryTaskLedger>,
    goals: Arc<InMemoryGoalRepository>,
    store: Arc<InMemoryComplianceStore>,
    config: &Config,
) -> Coordinator {
    Coordinator::new(
        ledger,
        goals,
        store,
        executor,
        Arc::new(StaticAgentRegistry::new()),
        Arc::new(TracingEscalationSink),
        config,
    )
}

pub fn by_title<'a>(tasks: &'a [Task], title: &str) -> &'a Task {
    tasks
        .iter()
        .find(|t| t.title == title)
        .unwrap_or_else(|| panic!("no task titled {title}"))
}

pub async fn task_id(coordinator: &Coordinator, goal_id: Uuid, title: &str) -> Uuid {
    let tasks = coordinator.list_tasks(goal_id).await.unwrap();
    by_title(&tasks, title).id
}
