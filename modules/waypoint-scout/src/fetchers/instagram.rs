use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use apify_client::InstagramScraperInput;
use waypoint_common::{Platform, Post};

use super::{
    count_field, id_field, normalize_batch, run_actor, since, str_field, upstream_failure,
    FetchOutcome, FetchQuery, PlatformFetcher, RESULTS_LIMIT,
};
use crate::traits::ActorRunner;

/// Instagram via the Apify instagram-scraper actor.
///
/// With a handle, reads the handle's tagged feed (posts other accounts
/// tagged it in). Without one, falls back to a hashtag search over the
/// query terms.
pub struct InstagramFetcher {
    runner: Arc<dyn ActorRunner>,
    actor_id: String,
    limit: u32,
}

impl InstagramFetcher {
    pub fn new(runner: Arc<dyn ActorRunner>, actor_id: String) -> Self {
        Self {
            runner,
            actor_id,
            limit: RESULTS_LIMIT,
        }
    }

    fn input(&self, query: &FetchQuery) -> InstagramScraperInput {
        match query.handle.as_deref() {
            Some(handle) => InstagramScraperInput::tagged_feed(handle.trim_start_matches('@'), self.limit),
            None => InstagramScraperInput::search(&query.terms.join(" "), self.limit),
        }
    }
}

#[async_trait]
impl PlatformFetcher for InstagramFetcher {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    async fn fetch(&self, query: &FetchQuery, since: DateTime<Utc>) -> FetchOutcome {
        let items = match run_actor(self.runner.as_ref(), &self.actor_id, &self.input(query)).await {
            Ok(items) => items,
            Err(e) => return upstream_failure(self.platform(), &self.actor_id, e),
        };
        let posts = normalize_batch(
            Platform::Instagram,
            items,
            since,
            |r| since::timestamp_of(r, &["timestamp", "takenAt"]),
            normalize,
        );
        FetchOutcome::from_posts(posts)
    }
}

fn normalize(record: &Map<String, Value>, created_at: DateTime<Utc>) -> Option<Post> {
    let url = str_field(record, &["url"]).or_else(|| {
        str_field(record, &["shortCode"]).map(|code| format!("https://www.instagram.com/p/{code}/"))
    });
    let external_id = id_field(record, &["id", "shortCode"]).or_else(|| url.clone())?;

    Some(Post {
        platform: Platform::Instagram,
        external_id,
        username: str_field(record, &["ownerUsername"]),
        caption: str_field(record, &["caption"]),
        url,
        created_at,
        like_count: count_field(record, &["likesCount"]),
        raw: record.clone(),
    })
}
