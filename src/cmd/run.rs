use anyhow::{Context, Result};
use console::style;
use std::path::Path;
use std::sync::Arc;

use migration_harness::agent::ClaudeAgent;
use migration_harness::orchestrator::Orchestrator;

use super::print_progress;

pub async fn cmd_run(config_path: &Path) -> Result<()> {
    let agent = Arc::new(ClaudeAgent::from_env());
    let orchestrator = Orchestrator::from_config_file(config_path, agent)?;

    println!(
        "{} {}",
        style("Starting migration pipeline for").bold(),
        style(&orchestrator.config().project_name).cyan()
    );

    let outcome = orchestrator.run().await;

    if let Some(record) = orchestrator.status()? {
        print_progress(&record);
    }

    outcome.context("Pipeline failed")?;
    println!("{}", style("Pipeline completed successfully!").green().bold());
    Ok(())
}
