use std::collections::VecDeque;
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use jobfeed_adapters::{load_captured_page, normalize_all};
use jobfeed_core::CanonicalJobRecord;
use jobfeed_sync::{FeedConfig, FeedPipeline};
use jobfeed_widget::{Action, Effect, JobBoard, JobFilter, LoadStatus};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "jobfeed-cli")]
#[command(about = "Fetch, normalize and browse the upstream job feed")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch every page and print the canonical job list.
    Fetch,
    /// Fetch, then print only the jobs matching the filters.
    Search {
        #[arg(long, default_value = "")]
        keyword: String,
        #[arg(long, default_value = "")]
        location: String,
        #[arg(long, default_value = "")]
        department: String,
        #[arg(long, default_value = "")]
        code: String,
    },
    /// Fetch, then print the location and department options.
    Facets,
    /// Normalize a saved page payload without touching the network.
    Normalize { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Fetch) {
        Commands::Fetch => {
            let board = load_board().await?;
            let jobs = board.jobs();
            print_jobs(&jobs.iter().collect::<Vec<_>>())?;
        }
        Commands::Search {
            keyword,
            location,
            department,
            code,
        } => {
            let mut board = load_board().await?;
            board.dispatch(Action::SetFilters(JobFilter {
                keyword,
                location,
                department,
                job_code: code,
            }));
            print_jobs(&board.filtered())?;
        }
        Commands::Facets => {
            let board = load_board().await?;
            let facets = serde_json::json!({
                "locations": board.location_options(),
                "departments": board.department_options(),
            });
            println!("{}", serde_json::to_string_pretty(&facets)?);
        }
        Commands::Normalize { path } => {
            let raw = load_captured_page(&path)?;
            let jobs = normalize_all(&raw);
            print_jobs(&jobs.iter().collect::<Vec<_>>())?;
        }
    }

    Ok(())
}

/// Runs the initial refresh through the board so failures surface the same way the widget shows them.
async fn load_board() -> Result<JobBoard> {
    let pipeline = FeedPipeline::new(FeedConfig::from_env()?)?;
    let mut board = JobBoard::new();
    let mut pending: VecDeque<Effect> = board.dispatch(Action::Refresh).into();

    while let Some(effect) = pending.pop_front() {
        let follow_up = match effect {
            Effect::Fetch { cycle } => {
                let action = match pipeline.run_once().await {
                    Ok(run) => {
                        info!(
                            run_id = %run.summary.run_id,
                            pages = run.summary.pages_requested,
                            jobs = run.summary.jobs,
                            "feed loaded"
                        );
                        Action::FetchSucceeded { cycle, jobs: run.jobs }
                    }
                    Err(err) => Action::FetchFailed {
                        cycle,
                        kind: err.kind(),
                        diagnostic: err.to_string(),
                    },
                };
                board.dispatch(action)
            }
            Effect::Post(message) => {
                eprintln!("host message: {}", message.to_json());
                Vec::new()
            }
        };
        pending.extend(follow_up);
    }

    if let LoadStatus::Failed(failure) = board.status() {
        bail!("{} ({:?}: {})", failure.message, failure.kind, failure.diagnostic);
    }
    Ok(board)
}

fn print_jobs(jobs: &[&CanonicalJobRecord]) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(jobs)?);
    Ok(())
}
