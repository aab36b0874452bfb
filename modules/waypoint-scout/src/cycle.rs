use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

use waypoint_common::{CityId, PostRetention, ScrapeSettings};
use waypoint_journey::JourneyEngine;

use crate::orchestrator::SocialScraper;
use crate::scheduler::IntervalSource;

/// One unit of scheduled work.
#[async_trait]
pub trait ScrapeJob: Send + Sync {
    async fn run_cycle(&self) -> Result<CycleReport>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleReport {
    NoCurrentCity,
    NoPosts { city_id: CityId },
    Saved { city_id: CityId, posts: usize },
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleReport::NoCurrentCity => write!(f, "no current city"),
            CycleReport::NoPosts { city_id } => write!(f, "no posts for city {city_id}"),
            CycleReport::Saved { city_id, posts } => {
                write!(f, "saved {posts} posts for city {city_id}")
            }
        }
    }
}

/// Resolve the current city, scrape it, persist what came back.
pub struct ScrapeCycle {
    engine: Arc<JourneyEngine>,
    scraper: Arc<SocialScraper>,
    defaults: ScrapeSettings,
    retention: PostRetention,
}

impl ScrapeCycle {
    pub fn new(
        engine: Arc<JourneyEngine>,
        scraper: Arc<SocialScraper>,
        defaults: ScrapeSettings,
        retention: PostRetention,
    ) -> Self {
        Self {
            engine,
            scraper,
            defaults,
            retention,
        }
    }

    pub fn engine(&self) -> &Arc<JourneyEngine> {
        &self.engine
    }

    pub fn scraper(&self) -> &Arc<SocialScraper> {
        &self.scraper
    }

    /// Stored settings with gaps filled from the environment defaults.
    pub async fn settings(&self) -> Result<ScrapeSettings> {
        let stored = self
            .engine
            .repo()
            .get_settings()
            .await
            .context("Failed to load scrape settings")?;
        Ok(match stored {
            Some(settings) => settings.or_defaults(&self.defaults),
            None => self.defaults.clone(),
        })
    }
}

#[async_trait]
impl ScrapeJob for ScrapeCycle {
    async fn run_cycle(&self) -> Result<CycleReport> {
        // The city (and its becameCurrentAt) is read once; a move made
        // mid-cycle takes effect on the next one.
        let journey = self
            .engine
            .compute_journey()
            .await
            .context("Failed to resolve current city")?;
        let Some(city) = journey.current_city else {
            info!("No current city, skipping scrape");
            return Ok(CycleReport::NoCurrentCity);
        };

        let settings = self.settings().await?;
        let posts = self.scraper.scrape_city_posts(&city, None, &settings).await;
        if posts.is_empty() {
            info!(city = city.name.as_str(), "No posts captured");
            return Ok(CycleReport::NoPosts { city_id: city.id });
        }

        let saved = self
            .engine
            .repo()
            .save_city_posts(&city.id, &posts, self.retention)
            .await
            .with_context(|| format!("Failed to save posts for city {}", city.id))?;
        info!(city = city.name.as_str(), saved, retention = ?self.retention, "Posts saved");

        Ok(CycleReport::Saved {
            city_id: city.id,
            posts: saved,
        })
    }
}

#[async_trait]
impl IntervalSource for ScrapeCycle {
    async fn interval_minutes(&self) -> Result<i64> {
        Ok(self.settings().await?.scrape_interval_minutes)
    }
}
