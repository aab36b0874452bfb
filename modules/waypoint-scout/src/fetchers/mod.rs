// Platform fetchers: one actor call per (profile, platform), normalized to
// Post and cut to the since-window before anything else sees them.

pub mod instagram;
pub mod since;
pub mod tiktok;
pub mod twitter;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use apify_client::ApifyError;
use waypoint_common::{Config, Platform, Post};

use crate::traits::ActorRunner;

pub use instagram::InstagramFetcher;
pub use tiktok::TikTokFetcher;
pub use twitter::TwitterFetcher;

/// Upper bound on items requested from any one actor run.
pub const RESULTS_LIMIT: u32 = 100;

/// What to look for on a platform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchQuery {
    /// Profile handle without `@`.
    pub handle: Option<String>,
    /// City name, region and extra keywords.
    pub terms: Vec<String>,
}

impl FetchQuery {
    pub fn new(handle: Option<String>, terms: Vec<String>) -> Self {
        Self { handle, terms }
    }

    /// `handle term term` as one free-text query, without `@`.
    pub fn text(&self) -> String {
        self.handle
            .iter()
            .map(|h| h.trim_start_matches('@'))
            .chain(self.terms.iter().map(String::as_str))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("actor call failed: {0}")]
    Upstream(#[from] ApifyError),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("fetch task aborted: {0}")]
    Aborted(String),
}

/// Result of one fetch. Failures are values so one bad platform never
/// sinks the rest of a scrape.
#[derive(Debug)]
pub enum FetchOutcome {
    Fetched(Vec<Post>),
    Empty,
    Failed(FetchError),
}

impl FetchOutcome {
    pub fn from_posts(posts: Vec<Post>) -> Self {
        if posts.is_empty() {
            FetchOutcome::Empty
        } else {
            FetchOutcome::Fetched(posts)
        }
    }

    pub fn into_posts(self) -> Vec<Post> {
        match self {
            FetchOutcome::Fetched(posts) => posts,
            FetchOutcome::Empty | FetchOutcome::Failed(_) => Vec::new(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, FetchOutcome::Failed(_))
    }
}

/// Fetches recent posts from one platform.
#[async_trait]
pub trait PlatformFetcher: Send + Sync {
    fn platform(&self) -> Platform;

    /// Posts matching `query` created at or after `since`.
    async fn fetch(&self, query: &FetchQuery, since: DateTime<Utc>) -> FetchOutcome;
}

/// One fetcher per platform, all sharing `runner`.
pub fn platform_fetchers(
    config: &Config,
    runner: Arc<dyn ActorRunner>,
) -> Vec<Arc<dyn PlatformFetcher>> {
    vec![
        Arc::new(InstagramFetcher::new(runner.clone(), config.instagram_actor.clone())),
        Arc::new(TikTokFetcher::new(runner.clone(), config.tiktok_actor.clone())),
        Arc::new(TwitterFetcher::new(runner, config.twitter_actor.clone())),
    ]
}

// --- Shared plumbing ---

/// Call an actor and return its dataset.
pub(crate) async fn run_actor<I: Serialize>(
    runner: &dyn ActorRunner,
    actor_id: &str,
    input: &I,
) -> Result<Vec<Value>, ApifyError> {
    let input = serde_json::to_value(input)?;
    let run = runner.call_actor(actor_id, &input).await?;
    runner.dataset_items(&run.default_dataset_id).await
}

pub(crate) fn upstream_failure(platform: Platform, actor_id: &str, err: ApifyError) -> FetchOutcome {
    warn!(
        platform = %platform,
        actor_id,
        quota = err.is_quota(),
        error = %err,
        "Actor call failed, no posts from this platform"
    );
    FetchOutcome::Failed(FetchError::Upstream(err))
}

/// Normalize a dataset, dropping records without a usable timestamp and
/// records older than `since`.
pub(crate) fn normalize_batch<F>(
    platform: Platform,
    items: Vec<Value>,
    since: DateTime<Utc>,
    timestamp: impl Fn(&Map<String, Value>) -> Option<DateTime<Utc>>,
    normalize: F,
) -> Vec<Post>
where
    F: Fn(&Map<String, Value>, DateTime<Utc>) -> Option<Post>,
{
    let fetched = items.len();
    let mut undated = 0usize;
    let mut stale = 0usize;

    let posts: Vec<Post> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(record) => Some(record),
            _ => None,
        })
        .filter_map(|record| {
            let Some(created_at) = timestamp(&record) else {
                undated += 1;
                return None;
            };
            if !since::is_since(created_at, since) {
                stale += 1;
                return None;
            }
            normalize(&record, created_at)
        })
        .collect();

    debug!(
        platform = %platform,
        fetched,
        kept = posts.len(),
        undated,
        stale,
        "Since-filter applied"
    );
    posts
}

// --- Field helpers ---

/// First non-empty string among `keys`.
pub(crate) fn str_field(record: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match record.get(*k) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    })
}

/// Like `str_field`, but numeric ids are accepted too.
pub(crate) fn id_field(record: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match record.get(*k) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// First count among `keys`; negatives and garbage read as absent.
pub(crate) fn count_field(record: &Map<String, Value>, keys: &[&str]) -> u64 {
    keys.iter()
        .find_map(|k| match record.get(*k) {
            Some(Value::Number(n)) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
            Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
            _ => None,
        })
        .unwrap_or(0)
}

/// Nested string, e.g. `authorMeta.name`.
pub(crate) fn nested_str(record: &Map<String, Value>, parent: &str, key: &str) -> Option<String> {
    record
        .get(parent)
        .and_then(Value::as_object)
        .and_then(|inner| str_field(inner, &[key]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_text_strips_at_and_blanks() {
        let query = FetchQuery::new(
            Some("@exampleuser".into()),
            vec!["Chicago".into(), String::new(), "Illinois".into()],
        );
        assert_eq!(query.text(), "exampleuser Chicago Illinois");
        assert_eq!(FetchQuery::default().text(), "");
    }

    #[test]
    fn field_helpers_tolerate_shapes() {
        let record = json!({
            "id": 12345,
            "likes": "17",
            "neg": -3,
            "author": {"userName": "fan"},
            "blank": "  ",
        });
        let record = record.as_object().unwrap();
        assert_eq!(id_field(record, &["id"]).as_deref(), Some("12345"));
        assert_eq!(count_field(record, &["likes"]), 17);
        assert_eq!(count_field(record, &["neg", "missing"]), 0);
        assert_eq!(nested_str(record, "author", "userName").as_deref(), Some("fan"));
        assert_eq!(str_field(record, &["blank"]), None);
    }

    #[test]
    fn outcome_from_posts() {
        assert!(matches!(FetchOutcome::from_posts(Vec::new()), FetchOutcome::Empty));
        let failed = FetchOutcome::Failed(FetchError::Timeout(Duration::from_secs(20)));
        assert!(failed.is_failed());
        assert!(failed.into_posts().is_empty());
    }
}
