use clap::Parser;
use console::style;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod cmd;

#[derive(Parser)]
#[command(name = "migration-harness")]
#[command(version, about = "Phased REST to GraphQL migration pipeline")]
pub struct Cli {
    /// Path to the migration configuration (JSON)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Show pipeline status and exit
    #[arg(long)]
    pub status: bool,

    #[arg(short, long)]
    pub verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    // Optional .env with CLAUDE_CMD / SKIP_PERMISSIONS / RUST_LOG
    let _ = dotenvy::dotenv();
    init_tracing(cli.verbose);

    let outcome = if cli.status {
        cmd::cmd_status(&cli.config)
    } else {
        cmd::cmd_run(&cli.config).await
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", style("Error:").for_stderr().red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
