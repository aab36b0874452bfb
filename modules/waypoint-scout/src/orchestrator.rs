use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use waypoint_common::{City, Platform, Post, ScrapeSettings};

use crate::fetchers::{FetchError, FetchOutcome, FetchQuery, PlatformFetcher};

/// Most posts kept from one scrape.
pub const MAX_POSTS: usize = 100;

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_MAX_CONCURRENT: usize = 10;

/// Fans a city scrape out over every (profile, platform) pair, then merges
/// the results into one ranked, keyword-filtered list.
pub struct SocialScraper {
    fetchers: Vec<Arc<dyn PlatformFetcher>>,
    fetch_timeout: Duration,
    max_concurrent: usize,
}

impl SocialScraper {
    pub fn new(fetchers: Vec<Arc<dyn PlatformFetcher>>) -> Self {
        Self {
            fetchers,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n.max(1);
        self
    }

    pub fn platforms(&self) -> Vec<Platform> {
        self.fetchers.iter().map(|f| f.platform()).collect()
    }

    /// Posts about `city` since it became current.
    ///
    /// `profiles` overrides the handles in `settings` when non-empty.
    /// Returns nothing (without calling out) when no profiles are configured
    /// or the city has never been current. Upstream failures and timeouts
    /// only shrink the result.
    pub async fn scrape_city_posts(
        &self,
        city: &City,
        profiles: Option<&[String]>,
        settings: &ScrapeSettings,
    ) -> Vec<Post> {
        let profiles: Vec<String> = match profiles {
            Some(p) if !p.is_empty() => p
                .iter()
                .map(|h| h.trim().trim_start_matches('@').to_string())
                .filter(|h| !h.is_empty())
                .collect(),
            _ => settings.profiles(),
        };
        if profiles.is_empty() {
            info!(city = city.name.as_str(), "No social profiles configured, skipping scrape");
            return Vec::new();
        }
        let Some(since) = city.became_current_at else {
            info!(city = city.name.as_str(), "City has never been current, skipping scrape");
            return Vec::new();
        };

        let terms = keyword_terms(city, &settings.extra_keywords);
        if terms.is_empty() {
            warn!(city_id = %city.id, "City has no keywords to match, skipping scrape");
            return Vec::new();
        }
        let tasks: Vec<(String, Arc<dyn PlatformFetcher>)> = profiles
            .iter()
            .flat_map(|handle| self.fetchers.iter().map(move |f| (handle.clone(), f.clone())))
            .collect();

        info!(
            city = city.name.as_str(),
            %since,
            profiles = profiles.len(),
            tasks = tasks.len(),
            "Scraping social posts"
        );

        let fetch_timeout = self.fetch_timeout;
        // `buffered` yields in task order, so dedup below is deterministic
        // no matter which call finishes first.
        let futs: Vec<_> = tasks
            .into_iter()
            .map(|(handle, fetcher)| {
                let query = FetchQuery::new(Some(handle.clone()), terms.clone());
                async move {
                    let platform = fetcher.platform();
                    let outcome = run_isolated(fetcher, query, since, fetch_timeout).await;
                    (platform, handle, outcome)
                }
            })
            .collect();
        let outcomes: Vec<(Platform, String, FetchOutcome)> = stream::iter(futs)
            .buffered(self.max_concurrent)
            .collect()
            .await;

        let mut fetched = Vec::new();
        let mut failures = 0usize;
        for (platform, handle, outcome) in outcomes {
            if let FetchOutcome::Failed(e) = &outcome {
                failures += 1;
                warn!(platform = %platform, handle = handle.as_str(), error = %e, "Fetch failed");
            }
            fetched.extend(outcome.into_posts());
        }

        let fetched_count = fetched.len();
        let posts = finalize_posts(fetched, &terms);
        info!(
            city = city.name.as_str(),
            fetched = fetched_count,
            kept = posts.len(),
            failures,
            "Social scrape finished"
        );
        posts
    }
}

/// Run one fetch on its own task under a timeout. A panic or timeout is
/// reported as a failed outcome and leaves sibling fetches alone.
async fn run_isolated(
    fetcher: Arc<dyn PlatformFetcher>,
    query: FetchQuery,
    since: chrono::DateTime<chrono::Utc>,
    fetch_timeout: Duration,
) -> FetchOutcome {
    let handle = tokio::spawn(async move {
        match tokio::time::timeout(fetch_timeout, fetcher.fetch(&query, since)).await {
            Ok(outcome) => outcome,
            Err(_) => FetchOutcome::Failed(FetchError::Timeout(fetch_timeout)),
        }
    });
    match handle.await {
        Ok(outcome) => outcome,
        Err(e) => FetchOutcome::Failed(FetchError::Aborted(e.to_string())),
    }
}

// --- Post pipeline ---

/// City name, region and extra keywords, lowercased and deduplicated.
/// City-specific keywords are included.
pub fn keyword_terms(city: &City, extra: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    [city.name.as_str(), city.region.as_str()]
        .into_iter()
        .chain(city.keywords.iter().map(String::as_str))
        .chain(extra.iter().map(String::as_str))
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Keep the first occurrence of each (platform, externalId).
pub fn dedup_posts(posts: Vec<Post>) -> Vec<Post> {
    let mut seen: HashSet<(Platform, String)> = HashSet::new();
    posts
        .into_iter()
        .filter(|p| seen.insert((p.platform, p.external_id.clone())))
        .collect()
}

/// Most liked first. Stable, so equal counts keep arrival order.
pub fn rank_posts(posts: &mut [Post]) {
    posts.sort_by(|a, b| b.like_count.cmp(&a.like_count));
}

/// Case-insensitive substring match of any term against the post text.
/// With no terms nothing matches.
pub fn matches_keywords(post: &Post, terms: &[String]) -> bool {
    let text = post.searchable_text();
    terms.iter().any(|t| text.contains(t.as_str()))
}

pub fn filter_by_keywords(posts: Vec<Post>, terms: &[String]) -> Vec<Post> {
    posts
        .into_iter()
        .filter(|p| matches_keywords(p, terms))
        .collect()
}

/// Dedup, rank, keyword-filter, cap at `MAX_POSTS`.
pub fn finalize_posts(posts: Vec<Post>, terms: &[String]) -> Vec<Post> {
    let mut posts = dedup_posts(posts);
    rank_posts(&mut posts);
    let mut posts = filter_by_keywords(posts, terms);
    posts.truncate(MAX_POSTS);
    posts
}
