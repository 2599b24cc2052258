//! `taskwarden simulate`: run a plan against a simulated executor.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::Args;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use crate::adapters::agents::StaticAgentRegistry;
use crate::adapters::sinks;
use crate::application::Coordinator;
use crate::cli::output::table::TableFormatter;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{Config, Escalation, GoalPlan, GoalStatus, Task};
use crate::domain::ports::{ExecutionContext, TaskExecutor};

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Path to the goal plan (YAML)
    pub plan: PathBuf,

    /// Task key whose every attempt fails (repeatable)
    #[arg(long, value_name = "KEY")]
    pub fail: Vec<String>,

    /// Simulated work per attempt, in milliseconds
    #[arg(long, default_value_t = 0)]
    pub delay_ms: u64,
}

/// Executor that succeeds unless the task key is marked failing.
pub struct SimulatedExecutor {
    failing: HashSet<String>,
    delay: Duration,
}

impl SimulatedExecutor {
    pub fn new<I, S>(failing: I, delay: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            failing: failing.into_iter().map(Into::into).collect(),
            delay,
        }
    }
}

#[async_trait]
impl TaskExecutor for SimulatedExecutor {
    async fn execute(&self, task: &Task, ctx: &ExecutionContext) -> Result<Value, String> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if ctx.is_killed().await {
            return Err("killed during simulated work".to_string());
        }
        debug!(task = %task.title, attempt = ctx.attempt, "simulated attempt");
        if self.failing.contains(&task.title) {
            return Err(format!(
                "simulated failure of {} (attempt {})",
                task.title,
                ctx.attempt + 1
            ));
        }
        Ok(json!({ "task": task.title, "attempt": ctx.attempt }))
    }
}

#[derive(Debug, Serialize)]
pub struct SimulationOutput {
    pub goal_id: Uuid,
    pub description: String,
    pub status: GoalStatus,
    pub tasks: Vec<Task>,
    pub escalations: Vec<Escalation>,
}

impl CommandOutput for SimulationOutput {
    fn to_human(&self) -> String {
        let formatter = TableFormatter::new();
        let mut lines = vec![
            format!("Goal '{}' finished as {}", self.description, self.status),
            formatter.format_tasks(&self.tasks),
        ];
        if self.escalations.is_empty() {
            lines.push("No escalations raised.".to_string());
        } else {
            lines.push(format!("{} escalation(s) raised:", self.escalations.len()));
            lines.push(formatter.format_escalations(&self.escalations));
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Run `plan` to quiescence in memory with `failing` keys always failing.
pub async fn simulate(
    plan: GoalPlan,
    failing: &[String],
    delay: Duration,
    config: &Config,
) -> Result<SimulationOutput> {
    if let Some(unknown) = failing
        .iter()
        .find(|key| !plan.tasks.iter().any(|t| &t.key == *key))
    {
        bail!("--fail names unknown task key '{unknown}'");
    }

    let coordinator = Coordinator::in_memory(
        Arc::new(SimulatedExecutor::new(failing.iter().cloned(), delay)),
        Arc::new(StaticAgentRegistry::new()),
        sinks::from_config(&config.escalation),
        config,
    );

    let description = plan.description.clone();
    let goal = coordinator
        .submit_goal(plan)
        .await
        .context("Plan was rejected")?;
    let status = coordinator.run_goal(goal.id).await?;

    Ok(SimulationOutput {
        goal_id: goal.id,
        description,
        status,
        tasks: coordinator.list_tasks(goal.id).await?,
        escalations: coordinator.list_escalations(None).await?,
    })
}

pub async fn execute(args: SimulateArgs, config: &Config, json_mode: bool) -> Result<()> {
    let plan = GoalPlan::from_file(&args.plan)
        .with_context(|| format!("Failed to load plan {}", args.plan.display()))?;
    let result = simulate(
        plan,
        &args.fail,
        Duration::from_millis(args.delay_ms),
        config,
    )
    .await?;
    output(&result, json_mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{
        EscalationReason, InstructionSpec, TaskSpec, TaskStatus,
    };

    fn release_plan() -> GoalPlan {
        GoalPlan::new("release")
            .with_task(TaskSpec::new("build"))
            .with_task(TaskSpec::new("docs"))
            .with_task(
                TaskSpec::new("publish")
                    .depends_on("build")
                    .depends_on("docs"),
            )
    }

    fn status_of(output: &SimulationOutput, key: &str) -> TaskStatus {
        output
            .tasks
            .iter()
            .find(|t| t.title == key)
            .map(|t| t.status)
            .unwrap()
    }

    #[tokio::test]
    async fn test_clean_run_completes_goal() {
        let output = simulate(release_plan(), &[], Duration::ZERO, &Config::default())
            .await
            .unwrap();

        assert_eq!(output.status, GoalStatus::Completed);
        assert!(output.tasks.iter().all(|t| t.status == TaskStatus::Completed));
        assert!(output.escalations.is_empty());
    }

    #[tokio::test]
    async fn test_failing_task_blocks_dependents_and_fails_goal() {
        let mut plan = release_plan();
        plan.tasks[0] = TaskSpec::new("build")
            .with_agent("builder")
            .with_instruction(InstructionSpec {
                escalate_on_failure: true,
                ..InstructionSpec::new(10)
            });

        let output = simulate(plan, &["build".to_string()], Duration::ZERO, &Config::default())
            .await
            .unwrap();

        assert_eq!(output.status, GoalStatus::Failed);
        assert_eq!(status_of(&output, "build"), TaskStatus::Failed);
        assert_eq!(status_of(&output, "docs"), TaskStatus::Completed);
        assert_eq!(status_of(&output, "publish"), TaskStatus::Blocked);

        let build = output.tasks.iter().find(|t| t.title == "build").unwrap();
        assert_eq!(build.retry_count, build.max_retries);
        assert!(build.error.as_deref().unwrap().contains("simulated failure"));

        assert_eq!(output.escalations.len(), 1);
        assert_eq!(output.escalations[0].reason, EscalationReason::ValidationFailed);
        assert_eq!(output.escalations[0].agent_id, "builder");
    }

    #[tokio::test]
    async fn test_unknown_fail_key_is_rejected() {
        let result = simulate(
            release_plan(),
            &["deploy".to_string()],
            Duration::ZERO,
            &Config::default(),
        )
        .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_human_output_mentions_goal_status() {
        let output = SimulationOutput {
            goal_id: Uuid::new_v4(),
            description: "release".to_string(),
            status: GoalStatus::Completed,
            tasks: vec![],
            escalations: vec![],
        };
        let human = output.to_human();
        assert!(human.contains("Goal 'release' finished as completed"));
        assert!(human.contains("No escalations raised."));
    }
}
