//! Taskwarden CLI entry point.

use anyhow::Context;
use clap::Parser;

use taskwarden::cli::{Cli, Commands};
use taskwarden::domain::models::Config;
use taskwarden::infrastructure::logging::{LogConfig, LogGuard};
use taskwarden::ConfigLoader;

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
    .context("Failed to load configuration")
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => taskwarden::cli::handle_error(err, cli.json),
    };

    // Held until exit so buffered file logs are flushed
    let _logger = match LogGuard::install(&LogConfig::from(&config.logging)) {
        Ok(logger) => logger,
        Err(err) => taskwarden::cli::handle_error(err, cli.json),
    };

    let result = match cli.command {
        Commands::Validate(args) => {
            taskwarden::cli::commands::validate::execute(args, &config, cli.json).await
        }
        Commands::Simulate(args) => {
            taskwarden::cli::commands::simulate::execute(args, &config, cli.json).await
        }
    };

    if let Err(err) = result {
        taskwarden::cli::handle_error(err, cli.json);
    }
}
