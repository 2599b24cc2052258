//! `taskwarden validate`: check a plan without running it.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use comfy_table::Cell;
use serde::Serialize;
use uuid::Uuid;

use crate::cli::output::table::TableFormatter;
use crate::cli::output::{output, CommandOutput};
use crate::domain::errors::DomainResult;
use crate::domain::models::{Config, GoalPlan};
use crate::services::{DependencyResolver, PriorityCalculator, ScoreInputs};

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the goal plan (YAML)
    pub plan: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct PlannedTaskOutput {
    pub position: usize,
    pub key: String,
    pub depends_on: Vec<String>,
    pub priority: i32,
    pub complexity: String,
    pub max_retries: u32,
    /// Score with every task pending and every agent available
    pub score: f64,
}

#[derive(Debug, Serialize)]
pub struct ValidateOutput {
    pub description: String,
    pub tasks: Vec<PlannedTaskOutput>,
}

impl CommandOutput for ValidateOutput {
    fn to_human(&self) -> String {
        let formatter = TableFormatter::new();
        let mut table = formatter.table(&["#", "Task", "Depends on", "Priority", "Complexity", "Score"]);
        for task in &self.tasks {
            let depends_on = if task.depends_on.is_empty() {
                "-".to_string()
            } else {
                task.depends_on.join(", ")
            };
            table.add_row(vec![
                Cell::new(task.position),
                Cell::new(&task.key),
                Cell::new(depends_on),
                Cell::new(task.priority),
                Cell::new(&task.complexity),
                Cell::new(format!("{:.3}", task.score)),
            ]);
        }
        format!(
            "Plan '{}' is valid: {} task(s) in execution order\n{}",
            self.description,
            self.tasks.len(),
            table
        )
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Validate `plan` and list its tasks in topological order with their
/// initial scores.
pub fn analyze(plan: &GoalPlan, config: &Config) -> DomainResult<ValidateOutput> {
    let tasks = plan.build_tasks(Uuid::nil(), config.scheduler.default_max_retries)?;
    let resolver = DependencyResolver::new();
    let ordered = resolver.topological_sort(&tasks)?;

    let keys: HashMap<Uuid, &str> = tasks.iter().map(|t| (t.id, t.title.as_str())).collect();
    let dependents = resolver.outstanding_dependents(&tasks);
    let calculator = PriorityCalculator::new(&config.scoring);
    let now = Utc::now();

    let rows = ordered
        .iter()
        .enumerate()
        .map(|(i, task)| {
            let inputs = ScoreInputs {
                outstanding_dependents: dependents.get(&task.id).copied().unwrap_or(0),
                agent_available: true,
                now,
            };
            PlannedTaskOutput {
                position: i + 1,
                key: task.title.clone(),
                depends_on: task
                    .dependencies
                    .iter()
                    .filter_map(|d| keys.get(d).map(|k| (*k).to_string()))
                    .collect(),
                priority: task.priority,
                complexity: task.complexity.as_str().to_string(),
                max_retries: task.max_retries,
                score: calculator.score(task, &inputs),
            }
        })
        .collect();

    Ok(ValidateOutput {
        description: plan.description.clone(),
        tasks: rows,
    })
}

pub async fn execute(args: ValidateArgs, config: &Config, json_mode: bool) -> Result<()> {
    let plan = GoalPlan::from_file(&args.plan)
        .with_context(|| format!("Failed to load plan {}", args.plan.display()))?;
    let result = analyze(&plan, config)
        .with_context(|| format!("Plan {} is invalid", args.plan.display()))?;
    output(&result, json_mode);
    Ok(())
}
