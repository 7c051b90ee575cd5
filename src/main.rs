use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use hs_ladder_tracker::config::AppConfig;
use hs_ladder_tracker::scheduler::Scheduler;
use hs_ladder_tracker::scraper::{Fetcher, HttpTransport};
use hs_ladder_tracker::storage::{PointStore, Repository};
use hs_ladder_tracker::track::Track;
use hs_ladder_tracker::utils;

#[derive(Parser)]
#[command(name = "ladder-tracker", about = "Ranked leaderboard history tracker", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Poll every enabled leaderboard until interrupted (default)
    Run,

    /// Create the tables of every enabled mode
    Migrate,

    /// Show stored points per mode
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "hs_ladder_tracker=info,ladder_tracker=info,warn",
        1 => "hs_ladder_tracker=debug,ladder_tracker=debug,info",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(filter)
        .init();

    let config = AppConfig::load()?;
    let modes = config.modes()?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let repo = Repository::open(&config.storage.db_path)
                .context("Failed to open DuckDB")?;
            let transport = HttpTransport::new(&config.scraper)
                .context("Failed to build HTTP transport")?;
            let fetcher = Fetcher::new(Arc::new(transport), config.scraper.max_retries);

            let mut scheduler = Scheduler::new(fetcher, repo);
            for mode in modes {
                scheduler.add_track(Track::new(
                    mode,
                    config.scheduler.regions.clone(),
                    config.scraper.base_url.clone(),
                ));
            }

            scheduler.initialize().await.context("Startup failed")?;

            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Could not listen for shutdown signal: {}", e);
                    std::future::pending::<()>().await;
                }
            };
            scheduler
                .run(config.interval(), shutdown)
                .await
                .context("Scheduler stopped on a fatal error")?;
            info!("Exiting...");
        }

        Command::Migrate => {
            let repo = Repository::open(&config.storage.db_path)?;
            for mode in &modes {
                repo.create_schema(mode)?;
            }
            println!("Schemas ready for {} modes.", modes.len());
        }

        Command::Stats => {
            let repo = Repository::open(&config.storage.db_path)?;
            println!("─────────────────────────────────────────────────────────");
            println!("  Ladder tracker — {:?}", config.storage.db_path);
            println!("─────────────────────────────────────────────────────────");
            for mode in &modes {
                if !repo.has_table(mode)? {
                    println!("  {:<14} no data", mode.name);
                    continue;
                }
                println!(
                    "  {:<14} points {:>12}  players {:>10}  last {}",
                    mode.name,
                    utils::fmt_number(repo.point_count(mode)?),
                    utils::fmt_number(repo.player_count(mode)?),
                    utils::fmt_timestamp(repo.latest_timestamp(mode)?),
                );
            }
            println!("─────────────────────────────────────────────────────────");
        }
    }

    Ok(())
}
