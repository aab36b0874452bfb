// Wiring shared by the scout binaries.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use apify_client::ApifyClient;
use waypoint_common::Config;
use waypoint_journey::JourneyEngine;
use waypoint_store::{JourneyRepo, PgDocumentStore};

use crate::cycle::ScrapeCycle;
use crate::fetchers::platform_fetchers;
use crate::orchestrator::SocialScraper;

/// Postgres when `DATABASE_URL` is set, otherwise an in-memory store that
/// is lost on exit.
pub async fn open_repo(config: &Config) -> Result<JourneyRepo> {
    match &config.database_url {
        Some(url) => {
            let store = PgDocumentStore::connect(url)
                .await
                .context("Failed to connect to Postgres")?;
            store.migrate().await.context("Failed to run migrations")?;
            info!("Connected to Postgres document store");
            Ok(JourneyRepo::new(Arc::new(store)))
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory store (data is lost on exit)");
            Ok(JourneyRepo::in_memory())
        }
    }
}

/// Scraper over all platforms, or one with no fetchers when there is no
/// Apify key.
pub fn social_scraper(config: &Config) -> SocialScraper {
    let fetchers = match &config.apify_api_key {
        Some(key) => platform_fetchers(config, Arc::new(ApifyClient::new(key.clone()))),
        None => {
            warn!("APIFY_API_KEY not set, social scraping disabled");
            Vec::new()
        }
    };
    SocialScraper::new(fetchers)
        .with_fetch_timeout(config.fetch_timeout)
        .with_max_concurrent(config.max_concurrent_fetches)
}

/// Store the environment defaults as settings when none exist yet, so
/// there is a document to edit.
pub async fn seed_settings(repo: &JourneyRepo, config: &Config) -> Result<()> {
    if repo.get_settings().await?.is_none() {
        repo.put_settings(&config.default_settings()).await?;
        info!("Seeded scrape settings from environment defaults");
    }
    Ok(())
}

/// Everything a scrape cycle needs, built from config.
pub async fn scrape_cycle(config: &Config) -> Result<ScrapeCycle> {
    let repo = open_repo(config).await?;
    seed_settings(&repo, config).await?;
    let engine = Arc::new(JourneyEngine::new(repo));
    Ok(ScrapeCycle::new(
        engine,
        Arc::new(social_scraper(config)),
        config.default_settings(),
        config.post_retention,
    ))
}
