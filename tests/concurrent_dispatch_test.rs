//! Two coordinators racing over one ledger never double-dispatch a task.

mod common;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use taskwarden::adapters::memory::{
    InMemoryComplianceStore, InMemoryGoalRepository, InMemoryTaskLedger,
};
use taskwarden::domain::models::{GoalPlan, GoalStatus, Task, TaskSpec, TaskStatus};
use taskwarden::domain::ports::{ExecutionContext, TaskExecutor, TaskLedger};

use common::{setup_test_logging, shared_coordinator, test_config};

/// Records overlapping executions and dependency state at start.
struct AuditingExecutor {
    ledger: Arc<InMemoryTaskLedger>,
    active: Mutex<HashMap<Uuid, u32>>,
    runs: Mutex<HashMap<Uuid, u32>>,
    violations: Mutex<Vec<String>>,
}

impl AuditingExecutor {
    fn new(ledger: Arc<InMemoryTaskLedger>) -> Self {
        Self {
            ledger,
            active: Mutex::new(HashMap::new()),
            runs: Mutex::new(HashMap::new()),
            violations: Mutex::new(Vec::new()),
        }
    }

    fn violation(&self, message: String) {
        self.violations.lock().unwrap().push(message);
    }
}

#[async_trait]
impl TaskExecutor for AuditingExecutor {
    async fn execute(&self, task: &Task, _ctx: &ExecutionContext) -> Result<Value, String> {
        {
            let mut active = self.active.lock().unwrap();
            let count = active.entry(task.id).or_insert(0);
            *count += 1;
            if *count > 1 {
                self.violation(format!("{} executing twice at once", task.title));
            }
        }
        *self.runs.lock().unwrap().entry(task.id).or_insert(0) += 1;

        for dep in &task.dependencies {
            let dep = self.ledger.get(*dep).await.map_err(|e| e.to_string())?;
            if dep.status != TaskStatus::Completed {
                self.violation(format!("{} started before {}", task.title, dep.title));
            }
        }

        tokio::time::sleep(Duration::from_millis(2)).await;

        *self.active.lock().unwrap().entry(task.id).or_insert(1) -= 1;
        Ok(json!({ "done": task.title }))
    }
}

/// Three layers of eight tasks; each task depends on two tasks of the previous layer.
fn layered_plan() -> GoalPlan {
    let mut plan = GoalPlan::new("layered build");
    for layer in 0..3 {
        for i in 0..8 {
            let mut spec = TaskSpec::new(format!("L{layer}-{i}"));
            if layer > 0 {
                spec = spec
                    .depends_on(format!("L{}-{}", layer - 1, i))
                    .depends_on(format!("L{}-{}", layer - 1, (i + 1) % 8));
            }
            plan = plan.with_task(spec);
        }
    }
    plan
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_coordinators_run_each_task_once() {
    setup_test_logging();
    let ledger = Arc::new(InMemoryTaskLedger::new());
    let goals = Arc::new(InMemoryGoalRepository::new());
    let store = Arc::new(InMemoryComplianceStore::new());
    let executor = Arc::new(AuditingExecutor::new(ledger.clone()));
    let config = test_config(4);

    let first = shared_coordinator(
        executor.clone(),
        ledger.clone(),
        goals.clone(),
        store.clone(),
        &config,
    );
    let second = shared_coordinator(
        executor.clone(),
        ledger.clone(),
        goals.clone(),
        store.clone(),
        &config,
    );

    let goal = first.submit_goal(layered_plan()).await.unwrap();
    let (a, b) = tokio::join!(first.run_goal(goal.id), second.run_goal(goal.id));
    a.unwrap();
    b.unwrap();

    let violations = executor.violations.lock().unwrap().clone();
    assert!(violations.is_empty(), "{violations:?}");

    let runs = executor.runs.lock().unwrap().clone();
    assert_eq!(runs.len(), 24);
    assert!(runs.values().all(|&n| n == 1), "{runs:?}");

    let status = first.get_goal(goal.id).await.unwrap().status;
    assert_eq!(status, GoalStatus::Completed);
    assert!(first
        .list_tasks(goal.id)
        .await
        .unwrap()
        .iter()
        .all(|t| t.status == TaskStatus::Completed && t.retry_count == 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_have_one_winner() {
    let ledger = Arc::new(InMemoryTaskLedger::new());
    let goals = Arc::new(InMemoryGoalRepository::new());
    let store = Arc::new(InMemoryComplianceStore::new());
    let executor = Arc::new(AuditingExecutor::new(ledger.clone()));
    let config = test_config(4);

    let coordinators: Vec<_> = (0..6)
        .map(|_| {
            shared_coordinator(
                executor.clone(),
                ledger.clone(),
                goals.clone(),
                store.clone(),
                &config,
            )
        })
        .collect();

    let goal = coordinators[0]
        .submit_goal(GoalPlan::new("single slot").with_task(TaskSpec::new("only")))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for coordinator in coordinators {
        handles.push(tokio::spawn(async move {
            coordinator.dispatch(goal.id, 1).await
        }));
    }

    let mut claimed = 0;
    for handle in handles {
        claimed += handle.await.unwrap().unwrap().len();
    }
    assert_eq!(claimed, 1);

    let task = ledger.list(goal.id).await.unwrap().remove(0);
    assert_eq!(task.status, TaskStatus::InProgress);
    assert_eq!(task.version, 2);
}
