use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::warn;

use apify_client::TweetSearchInput;
use waypoint_common::{Platform, Post};

use super::{
    count_field, id_field, nested_str, normalize_batch, run_actor, since, str_field,
    upstream_failure, FetchOutcome, FetchQuery, PlatformFetcher, RESULTS_LIMIT,
};
use crate::traits::ActorRunner;

/// Timestamp keys seen across tweet-scraper versions, most recent first.
const CREATED_AT_KEYS: [&str; 3] = ["createdAt", "created_at", "timestamp"];

/// X/Twitter search. The handle goes in `mentioning`, the city terms in
/// `searchTerms`, and the since-date in `start`.
pub struct TwitterFetcher {
    runner: Arc<dyn ActorRunner>,
    actor_id: String,
    limit: u32,
}

impl TwitterFetcher {
    pub fn new(runner: Arc<dyn ActorRunner>, actor_id: String) -> Self {
        Self {
            runner,
            actor_id,
            limit: RESULTS_LIMIT,
        }
    }

    fn input(&self, query: &FetchQuery, since: DateTime<Utc>) -> TweetSearchInput {
        TweetSearchInput {
            search_terms: query.terms.clone(),
            mentioning: query
                .handle
                .as_deref()
                .map(|h| h.trim_start_matches('@').to_string()),
            start: Some(since.format("%Y-%m-%d").to_string()),
            sort: "Latest".to_string(),
            max_items: self.limit,
        }
    }
}

#[async_trait]
impl PlatformFetcher for TwitterFetcher {
    fn platform(&self) -> Platform {
        Platform::Twitter
    }

    async fn fetch(&self, query: &FetchQuery, since: DateTime<Utc>) -> FetchOutcome {
        let input = self.input(query, since);
        let items = match run_actor(self.runner.as_ref(), &self.actor_id, &input).await {
            Ok(items) => items,
            Err(e) => return upstream_failure(self.platform(), &self.actor_id, e),
        };
        if items.is_empty() {
            return FetchOutcome::Empty;
        }

        let Some(key) = created_at_key(&items) else {
            warn!(
                actor_id = %self.actor_id,
                count = items.len(),
                "No recognizable timestamp field in tweet batch, dropping it"
            );
            return FetchOutcome::Empty;
        };

        let posts = normalize_batch(
            Platform::Twitter,
            items,
            since,
            |r| r.get(key).and_then(since::parse_timestamp),
            normalize,
        );
        FetchOutcome::from_posts(posts)
    }
}

/// The actor has renamed its timestamp field between versions. Pick the
/// key from the first record and use it for the whole batch.
pub fn created_at_key(items: &[Value]) -> Option<&'static str> {
    let first = items.iter().find_map(Value::as_object)?;
    CREATED_AT_KEYS
        .into_iter()
        .find(|key| first.get(*key).is_some_and(|v| !v.is_null()))
}

fn normalize(record: &Map<String, Value>, created_at: DateTime<Utc>) -> Option<Post> {
    let url = str_field(record, &["url", "twitterUrl"]);
    let external_id = id_field(record, &["id", "id_str"]).or_else(|| url.clone())?;

    Some(Post {
        platform: Platform::Twitter,
        external_id,
        username: nested_str(record, "author", "userName")
            .or_else(|| nested_str(record, "user", "screen_name")),
        caption: str_field(record, &["text", "fullText", "full_text"]),
        url,
        created_at,
        like_count: count_field(record, &["likeCount", "favorite_count"]),
        raw: record.clone(),
    })
}
