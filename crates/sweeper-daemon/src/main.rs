use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sweeper_core::SweeperConfig;
use sweeper_scheduler::{trigger, JobRunner, Neo4jHttpBackend, RunnerSettings};
use tracing::info;

#[derive(Parser)]
#[command(name = "sweeper", about = "Runs file-described recurring graph queries")]
struct Cli {
    /// Config file (defaults to $SWEEPER_CONFIG, then ~/.sweeper/sweeper.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pass on the configured cadence until interrupted
    Run {
        /// Descriptor directory (overrides config)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
    /// Run a single pass and exit
    Once {
        /// Descriptor directory (overrides config)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
    /// Show which descriptors are due without running them
    Check {
        /// Descriptor directory (overrides config)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sweeper_daemon=info,sweeper_scheduler=info".into()),
        )
        .init();

    let cli = Cli::parse();

    // explicit path > SWEEPER_CONFIG env > ~/.sweeper/sweeper.toml
    let config_path = cli.config.or_else(|| std::env::var("SWEEPER_CONFIG").ok());
    let config = SweeperConfig::load(config_path.as_deref()).context("loading configuration")?;
    let settings = RunnerSettings::from_config(&config)?;
    let backend = Arc::new(Neo4jHttpBackend::new(&config.neo4j));
    let runner = JobRunner::new(backend, settings);

    match cli.command {
        Commands::Run { dir } => {
            let dir = dir.unwrap_or_else(|| PathBuf::from(&config.jobs.directory));
            let every = Duration::from_secs(config.jobs.trigger_interval_secs.max(1));

            let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("interrupt received, finishing current pass");
                    let _ = shutdown_tx.send(true);
                }
            });

            trigger::run_periodic(runner, dir, every, shutdown_rx).await;
        }
        Commands::Once { dir } => {
            let dir = dir.unwrap_or_else(|| PathBuf::from(&config.jobs.directory));
            let summary = runner
                .process_all(&dir)
                .await
                .with_context(|| format!("pass over {} failed", dir.display()))?;
            println!(
                "files: {} seen, {} written, {} skipped",
                summary.files_seen, summary.files_written, summary.files_skipped
            );
            println!(
                "queries: {} executed, {} failed, {} not due, {} bad timestamps",
                summary.executed, summary.failed, summary.not_due, summary.bad_timestamps
            );
        }
        Commands::Check { dir } => {
            let dir = dir.unwrap_or_else(|| PathBuf::from(&config.jobs.directory));
            println!("directory: {}", dir.display());
            println!("timezone:  {}", config.jobs.timezone);
            println!("backend:   {}", config.neo4j.endpoint);
            for plan in runner.plan_at(&dir, chrono::Utc::now())? {
                println!("{}", plan.path.display());
                match plan.entries {
                    Ok(entries) => {
                        for entry in entries {
                            let state = match entry.due {
                                Some(true) => "due",
                                Some(false) => "waiting",
                                None => "bad lastExecutionTime",
                            };
                            println!("  {:<40} {state}", entry.query_name);
                        }
                    }
                    Err(e) => println!("  unreadable: {e}"),
                }
            }
        }
    }

    Ok(())
}
