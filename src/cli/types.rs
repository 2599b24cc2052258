//! CLI type definitions
//!
//! Clap command structures that define the CLI interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use super::commands::{simulate::SimulateArgs, validate::ValidateArgs};

#[derive(Parser, Debug)]
#[command(name = "taskwarden")]
#[command(about = "Task-graph scheduler with instruction compliance and escalation", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Config file to use instead of .taskwarden/
    #[arg(short, long, global = true, env = "TASKWARDEN_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check a goal plan for errors and cycles and show its execution order
    Validate(ValidateArgs),

    /// Run a goal plan against a simulated executor
    Simulate(SimulateArgs),
}
