use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::types::{split_csv, PostRetention, ScrapeSettings, DEFAULT_SCRAPE_INTERVAL_MINUTES};

const DEFAULT_INSTAGRAM_ACTOR: &str = "apify~instagram-scraper";
const DEFAULT_TIKTOK_ACTOR: &str = "clockworks~tiktok-scraper";
const DEFAULT_TWITTER_ACTOR: &str = "apidojo~tweet-scraper";

/// Application configuration loaded from environment variables.
/// Runtime-editable scrape settings live in the store; the values here
/// only seed them.
#[derive(Debug, Clone)]
pub struct Config {
    // Storage
    pub database_url: Option<String>,

    // Scraping
    pub apify_api_key: Option<String>,
    pub instagram_actor: String,
    pub tiktok_actor: String,
    pub twitter_actor: String,
    pub fetch_timeout: Duration,
    pub max_concurrent_fetches: usize,
    pub post_retention: PostRetention,

    // Settings defaults
    pub social_profiles: Vec<String>,
    pub social_keywords: Vec<String>,
    pub scrape_interval_minutes: i64,
}

impl Config {
    /// Load configuration from `.env` and the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let fetch_timeout_secs: u64 = parse_env("FETCH_TIMEOUT_SECS", 20)?;

        Ok(Self {
            database_url: optional_env("DATABASE_URL"),
            apify_api_key: optional_env("APIFY_API_KEY"),
            instagram_actor: optional_env("APIFY_INSTAGRAM_ACTOR")
                .unwrap_or_else(|| DEFAULT_INSTAGRAM_ACTOR.to_string()),
            tiktok_actor: optional_env("APIFY_TIKTOK_ACTOR")
                .unwrap_or_else(|| DEFAULT_TIKTOK_ACTOR.to_string()),
            twitter_actor: optional_env("APIFY_TWITTER_ACTOR")
                .unwrap_or_else(|| DEFAULT_TWITTER_ACTOR.to_string()),
            fetch_timeout: Duration::from_secs(fetch_timeout_secs.clamp(10, 30)),
            max_concurrent_fetches: parse_env::<usize>("MAX_CONCURRENT_FETCHES", 10)?.max(1),
            post_retention: match optional_env("POST_RETENTION") {
                Some(v) => v.parse().map_err(anyhow::Error::msg)?,
                None => PostRetention::default(),
            },
            social_profiles: optional_env("SOCIAL_PROFILES")
                .map(|v| split_csv(&v))
                .unwrap_or_default(),
            social_keywords: optional_env("SOCIAL_KEYWORDS")
                .map(|v| split_csv(&v))
                .unwrap_or_default(),
            scrape_interval_minutes: parse_env(
                "SOCIAL_SCRAPE_INTERVAL_MIN",
                DEFAULT_SCRAPE_INTERVAL_MINUTES,
            )?,
        })
    }

    /// Settings used when none are stored, and to fill gaps in stored ones.
    pub fn default_settings(&self) -> ScrapeSettings {
        ScrapeSettings {
            scrape_interval_minutes: self.scrape_interval_minutes,
            profiles: self.social_profiles.clone(),
            extra_keywords: self.social_keywords.clone(),
            ..Default::default()
        }
    }

    /// Log which keys are set without leaking secrets.
    pub fn log_redacted(&self) {
        fn preview_opt(val: &Option<String>) -> String {
            match val {
                Some(v) if !v.is_empty() => {
                    let n = v.len().min(5);
                    format!("{}...({} chars)", &v[..n], v.len())
                }
                _ => "<not set>".to_string(),
            }
        }

        tracing::info!("Config loaded:");
        tracing::info!("  DATABASE_URL: {}", preview_opt(&self.database_url));
        tracing::info!("  APIFY_API_KEY: {}", preview_opt(&self.apify_api_key));
        tracing::info!(
            instagram = %self.instagram_actor,
            tiktok = %self.tiktok_actor,
            twitter = %self.twitter_actor,
            "  Apify actors"
        );
        tracing::info!(
            timeout_secs = self.fetch_timeout.as_secs(),
            max_concurrent = self.max_concurrent_fetches,
            retention = ?self.post_retention,
            "  Fetch limits"
        );
        tracing::info!(
            profiles = ?self.social_profiles,
            keywords = ?self.social_keywords,
            interval_minutes = self.scrape_interval_minutes,
            "  Settings defaults"
        );
    }
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(v) => v
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a number, got {v:?}")),
        None => Ok(default),
    }
}
