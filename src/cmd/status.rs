use anyhow::Result;
use console::style;
use std::path::Path;

use migration_harness::config::Config;
use migration_harness::phase::Phase;
use migration_harness::state::{PhaseState, ProgressLog, ProgressRecord};

pub fn cmd_status(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)?;
    let progress = ProgressLog::open(&config.work_dir);

    match progress.read()? {
        None => println!("Pipeline not yet started"),
        Some(record) => print_progress(&record),
    }
    Ok(())
}

pub fn print_progress(record: &ProgressRecord) {
    println!();
    println!("{}", style("Migration Pipeline Status").bold().cyan());
    println!("=========================");
    println!("Project: {}", record.project);
    println!("Started: {}", record.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!();

    for phase in Phase::ALL {
        let entry = record.phase(phase);
        let status = entry.and_then(|e| e.status);
        let label = style(format!(
            "{:<12}",
            status.map(|s| s.as_str()).unwrap_or("pending")
        ));
        let state = match status {
            Some(PhaseState::Completed) => label.green(),
            Some(PhaseState::Failed) => label.red().bold(),
            Some(PhaseState::InProgress) => label.yellow(),
            None => label.dim(),
        };
        let note = entry
            .and_then(|e| e.error.as_deref().or(e.summary.as_deref()))
            .unwrap_or("");
        let sessions = entry.map(|e| e.sessions.len()).unwrap_or(0);

        print!("  {:<12} {}", phase.as_str(), state);
        if sessions > 0 {
            print!(" sessions: {}", sessions);
        }
        if !note.is_empty() {
            print!("  {}", style(note).dim());
        }
        println!();
    }
    println!();
}
