use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use apify_client::TikTokSearchInput;
use waypoint_common::{Platform, Post};

use super::{
    count_field, id_field, nested_str, normalize_batch, run_actor, since, str_field,
    upstream_failure, FetchOutcome, FetchQuery, PlatformFetcher, RESULTS_LIMIT,
};
use crate::traits::ActorRunner;

/// TikTok video search. The handle and terms go out as one query string
/// with the `@` stripped; the actor's search treats `@` literally.
pub struct TikTokFetcher {
    runner: Arc<dyn ActorRunner>,
    actor_id: String,
    limit: u32,
}

impl TikTokFetcher {
    pub fn new(runner: Arc<dyn ActorRunner>, actor_id: String) -> Self {
        Self {
            runner,
            actor_id,
            limit: RESULTS_LIMIT,
        }
    }
}

#[async_trait]
impl PlatformFetcher for TikTokFetcher {
    fn platform(&self) -> Platform {
        Platform::TikTok
    }

    async fn fetch(&self, query: &FetchQuery, since: DateTime<Utc>) -> FetchOutcome {
        let input = TikTokSearchInput::videos(query.text(), self.limit);
        let items = match run_actor(self.runner.as_ref(), &self.actor_id, &input).await {
            Ok(items) => items,
            Err(e) => return upstream_failure(self.platform(), &self.actor_id, e),
        };
        let posts = normalize_batch(
            Platform::TikTok,
            items,
            since,
            |r| since::timestamp_of(r, &["createTimeISO", "createTime"]),
            normalize,
        );
        FetchOutcome::from_posts(posts)
    }
}

fn normalize(record: &Map<String, Value>, created_at: DateTime<Utc>) -> Option<Post> {
    let url = str_field(record, &["webVideoUrl", "url"]);
    let external_id = id_field(record, &["id"]).or_else(|| url.clone())?;

    Some(Post {
        platform: Platform::TikTok,
        external_id,
        username: nested_str(record, "authorMeta", "name"),
        caption: str_field(record, &["text", "desc"]),
        url,
        created_at,
        like_count: count_field(record, &["diggCount", "likes"]),
        raw: record.clone(),
    })
}
