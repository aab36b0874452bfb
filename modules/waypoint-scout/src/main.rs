use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use waypoint_common::Config;
use waypoint_scout::bootstrap;
use waypoint_scout::cycle::ScrapeJob;
use waypoint_scout::scheduler::ScrapeScheduler;

#[derive(Parser)]
#[command(name = "waypoint-scout", about = "Scrape social posts about the current journey city")]
struct Cli {
    /// Run a single scrape cycle and exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("waypoint=info".parse()?))
        .init();

    let cli = Cli::parse();
    info!("Waypoint scout starting...");

    let config = Config::from_env()?;
    config.log_redacted();

    let cycle = Arc::new(bootstrap::scrape_cycle(&config).await?);

    if cli.once {
        match cycle.run_cycle().await {
            Ok(report) => info!(%report, "Scrape cycle finished"),
            Err(e) => {
                error!(error = %format!("{e:#}"), "Scrape cycle failed");
                return Err(e);
            }
        }
        return Ok(());
    }

    let scheduler = ScrapeScheduler::new(cycle.clone(), cycle);
    let state = scheduler.start().await;
    info!(?state, period = ?scheduler.period(), "Scheduler started");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    scheduler.stop();
    Ok(())
}
