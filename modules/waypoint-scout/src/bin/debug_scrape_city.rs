//! Scrape one city on demand and print the top posts. Posts are not saved.
//!
//! Usage: cargo run --bin debug-scrape-city -- [--city <id>] [--verbose]

use anyhow::{bail, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use waypoint_common::{CityId, Config};
use waypoint_scout::bootstrap;

const TOP_N: usize = 10;

#[derive(Parser)]
#[command(name = "debug-scrape-city", about = "Run the social scrape for one city and print the results")]
struct Cli {
    /// City id to scrape. Defaults to the current city.
    #[arg(long)]
    city: Option<String>,

    /// Debug-level logging.
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { "waypoint=debug" } else { "waypoint=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.parse()?))
        .init();

    let config = Config::from_env()?;
    let cycle = bootstrap::scrape_cycle(&config).await?;
    let engine = cycle.engine();

    let city = match cli.city {
        Some(id) => engine.get_city(&CityId::from(id)).await?,
        None => match engine.compute_journey().await?.current_city {
            Some(city) => city,
            None => bail!("No current city found; pass --city <id>"),
        },
    };

    let settings = cycle.settings().await?;
    println!(
        "Scraping {} ({}) since {} for profiles {:?}",
        city.name,
        city.id,
        city.became_current_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "<never current>".to_string()),
        settings.profiles(),
    );

    let posts = cycle
        .scraper()
        .scrape_city_posts(&city, None, &settings)
        .await;
    println!("Fetched {} posts\n", posts.len());

    for (i, post) in posts.iter().take(TOP_N).enumerate() {
        let caption: String = post
            .caption
            .as_deref()
            .unwrap_or_default()
            .chars()
            .take(80)
            .collect();
        println!(
            "{:>2}. [{}] @{} likes={} {}",
            i + 1,
            post.platform,
            post.username.as_deref().unwrap_or("?"),
            post.like_count,
            post.created_at.to_rfc3339(),
        );
        println!("    {}", caption.replace('\n', " "));
        if let Some(url) = &post.url {
            println!("    {url}");
        }
    }
    Ok(())
}
